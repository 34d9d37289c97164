//! Durable pub/sub over AMQP (RabbitMQ).
//!
//! Direct-exchange semantics: one exchange and one queue per pipeline,
//! routing key defaulting to the queue name. Declaration failures are fatal
//! at startup; a broken consume stream exits the process and leaves the
//! restart to the operator's supervision, which keeps the storage
//! consumer's compensation logic simple.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(lapin::Error),
    #[error("declare of {0} failed: {1}")]
    Declare(String, lapin::Error),
    #[error("consume on {0} failed: {1}")]
    Consume(String, lapin::Error),
}

/// Per-message consumer callback.
///
/// Returning `Ok` acknowledges the delivery; returning `Err` leaves it
/// unacknowledged so the broker redelivers it (on reconnect or restart).
#[async_trait]
pub trait BrokerConsumer: Send + Sync + 'static {
    async fn handle(&self, payload: &[u8]) -> Result<(), ()>;
}

/// Publisher side of one declared exchange/queue pair, as the transmit core
/// sees it.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// True iff the broker accepted the frame.
    async fn publish(&self, payload: &[u8]) -> bool;
}

/// [`MessagePublisher`] bound to a declared exchange and routing key.
pub struct BrokerPublisher {
    broker: Arc<Broker>,
    exchange: String,
    routing_key: String,
}

impl BrokerPublisher {
    pub fn new(broker: Arc<Broker>, exchange: &str, routing_key: &str) -> Self {
        Self {
            broker,
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
        }
    }
}

#[async_trait]
impl MessagePublisher for BrokerPublisher {
    async fn publish(&self, payload: &[u8]) -> bool {
        self.broker
            .publish(&self.exchange, &self.routing_key, payload)
            .await
    }
}

/// Connection plus channel handle; thread-safe, one per process.
pub struct Broker {
    channel: Channel,
    // The channel dies with the connection; keep it alive alongside.
    _connection: Connection,
}

impl Broker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(BrokerError::Connect)?;
        let channel = connection
            .create_channel()
            .await
            .map_err(BrokerError::Connect)?;
        info!("broker connected");
        Ok(Self {
            channel,
            _connection: connection,
        })
    }

    /// Declare the direct exchange, the durable queue and their binding.
    ///
    /// `routing_key = None` binds by the queue's own name. Callers treat a
    /// declare failure as fatal to the process.
    pub async fn declare(
        &self,
        exchange: &str,
        queue: &str,
        routing_key: Option<&str>,
    ) -> Result<(), BrokerError> {
        let routing_key = routing_key.unwrap_or(queue);

        self.channel
            .exchange_declare(
                exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(exchange.to_string(), e))?;

        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(queue.to_string(), e))?;

        self.channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Declare(format!("{exchange}->{queue}"), e))?;

        info!(exchange, queue, routing_key, "broker components declared");
        Ok(())
    }

    /// Publish a payload; true iff the broker accepted the frame. Durability
    /// past acceptance is the broker's responsibility.
    pub async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> bool {
        match self
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await
        {
            Ok(_confirm) => true,
            Err(e) => {
                error!(exchange, routing_key, error = %e, "publish failed");
                false
            }
        }
    }

    /// Drain `queue` on a background task, one delivery at a time.
    ///
    /// Handler success acks; handler failure leaves the delivery for
    /// redelivery. A consume-stream error is unrecoverable here by design:
    /// it is logged and the process exits for supervision to restart.
    pub async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn BrokerConsumer>,
    ) -> Result<(), BrokerError> {
        let mut consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(queue.to_string(), e))?;

        let queue = queue.to_string();
        tokio::spawn(async move {
            info!(queue, "consumer loop started");
            while let Some(delivery) = consumer.next().await {
                let delivery = match delivery {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        error!(queue, error = %e, "consume stream failed; exiting for supervised restart");
                        std::process::exit(1);
                    }
                };
                match handler.handle(&delivery.data).await {
                    Ok(()) => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!(queue, error = %e, "ack failed; exiting for supervised restart");
                            std::process::exit(1);
                        }
                    }
                    Err(()) => {
                        // Unacked on purpose: the broker will redeliver.
                        warn!(queue, "handler failed; leaving delivery unacked");
                    }
                }
            }
            error!(queue, "consume stream ended; exiting for supervised restart");
            std::process::exit(1);
        });

        Ok(())
    }
}
