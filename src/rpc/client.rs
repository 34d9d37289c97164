//! Typed clients over the service fabric.
//!
//! Each call picks the least-busy replica from the manager, dispatches with
//! no lock held, and reports completion so the balancer sees the call
//! finish. The cores depend on the [`UserDirectory`] and [`BlobPort`]
//! traits rather than the concrete clients, which keeps the business logic
//! testable without a running fabric.

use super::types::{
    FileInfo, FileUploadData, GetMultiFileReq, GetMultiFileRsp, GetMultiUserInfoReq,
    GetMultiUserInfoRsp, GetSingleFileReq, GetSingleFileRsp, GetUserInfoReq, GetUserInfoRsp,
    PutSingleFileReq, PutSingleFileRsp, UserInfo,
};
use crate::error::{ServiceError, ServiceResult};
use crate::fabric::ServiceManager;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Sender/profile resolution as the transmit and storage services see it.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_info(&self, request_id: &str, user_id: &str) -> ServiceResult<UserInfo>;
    async fn multi_user_info(
        &self,
        request_id: &str,
        user_ids: &[String],
    ) -> ServiceResult<HashMap<String, UserInfo>>;
}

/// Blob storage as the user and storage services see it.
#[async_trait]
pub trait BlobPort: Send + Sync {
    /// Store a blob; returns the fresh `file_id`.
    async fn put(
        &self,
        request_id: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> ServiceResult<FileInfo>;
    async fn get(&self, request_id: &str, file_id: &str) -> ServiceResult<Vec<u8>>;
    /// Batched read; the file service fails the whole call on any miss.
    async fn get_multi(
        &self,
        request_id: &str,
        file_ids: &[String],
    ) -> ServiceResult<HashMap<String, Vec<u8>>>;
}

/// Client for the user service.
pub struct UserClient {
    manager: Arc<ServiceManager>,
    service_name: String,
}

impl UserClient {
    pub fn new(manager: Arc<ServiceManager>, service_name: &str) -> Self {
        Self {
            manager,
            service_name: service_name.to_string(),
        }
    }
}

#[async_trait]
impl UserDirectory for UserClient {
    async fn user_info(&self, request_id: &str, user_id: &str) -> ServiceResult<UserInfo> {
        let conn = self
            .manager
            .pick(&self.service_name)
            .ok_or_else(|| ServiceError::Dependency("获取user服务失败".to_string()))?;
        let req = GetUserInfoReq {
            request_id: request_id.to_string(),
            user_id: user_id.to_string(),
        };
        let result = conn.post_json::<_, GetUserInfoRsp>("GetUserInfo", &req).await;
        self.manager.complete(&self.service_name, &conn);

        let rsp = result.map_err(|e| {
            error!(request_id, user_id, error = %e, "GetUserInfo call failed");
            ServiceError::Dependency("user服务调用失败".to_string())
        })?;
        if !rsp.success {
            return Err(ServiceError::Dependency("user服务调用失败".to_string()));
        }
        rsp.user_info
            .ok_or_else(|| ServiceError::Dependency("user服务调用失败".to_string()))
    }

    async fn multi_user_info(
        &self,
        request_id: &str,
        user_ids: &[String],
    ) -> ServiceResult<HashMap<String, UserInfo>> {
        let conn = self
            .manager
            .pick(&self.service_name)
            .ok_or_else(|| ServiceError::Dependency("获取user服务失败".to_string()))?;
        let req = GetMultiUserInfoReq {
            request_id: request_id.to_string(),
            users_id: user_ids.to_vec(),
        };
        let result = conn
            .post_json::<_, GetMultiUserInfoRsp>("GetMultiUserInfo", &req)
            .await;
        self.manager.complete(&self.service_name, &conn);

        let rsp = result.map_err(|e| {
            error!(request_id, error = %e, "GetMultiUserInfo call failed");
            ServiceError::Dependency("获取用户信息失败".to_string())
        })?;
        if !rsp.success {
            return Err(ServiceError::Dependency("获取用户信息失败".to_string()));
        }
        Ok(rsp.users_info)
    }
}

/// Client for the file service.
pub struct FileClient {
    manager: Arc<ServiceManager>,
    service_name: String,
}

impl FileClient {
    pub fn new(manager: Arc<ServiceManager>, service_name: &str) -> Self {
        Self {
            manager,
            service_name: service_name.to_string(),
        }
    }

    fn pick(&self) -> ServiceResult<crate::fabric::RpcChannel> {
        self.manager
            .pick(&self.service_name)
            .ok_or_else(|| ServiceError::Dependency("获取file服务失败".to_string()))
    }
}

#[async_trait]
impl BlobPort for FileClient {
    async fn put(
        &self,
        request_id: &str,
        file_name: &str,
        content: Vec<u8>,
    ) -> ServiceResult<FileInfo> {
        let conn = self.pick()?;
        let req = PutSingleFileReq {
            request_id: request_id.to_string(),
            file_data: FileUploadData {
                file_name: file_name.to_string(),
                file_size: content.len() as u64,
                content,
            },
        };
        let result = conn
            .post_json::<_, PutSingleFileRsp>("PutSingleFile", &req)
            .await;
        self.manager.complete(&self.service_name, &conn);

        let rsp = result.map_err(|e| {
            error!(request_id, error = %e, "PutSingleFile call failed");
            ServiceError::Dependency("文件上传失败".to_string())
        })?;
        if !rsp.success {
            return Err(ServiceError::Dependency("文件上传失败".to_string()));
        }
        rsp.file_info
            .ok_or_else(|| ServiceError::Dependency("文件上传失败".to_string()))
    }

    async fn get(&self, request_id: &str, file_id: &str) -> ServiceResult<Vec<u8>> {
        let conn = self.pick()?;
        let req = GetSingleFileReq {
            request_id: request_id.to_string(),
            file_id: file_id.to_string(),
        };
        let result = conn
            .post_json::<_, GetSingleFileRsp>("GetSingleFile", &req)
            .await;
        self.manager.complete(&self.service_name, &conn);

        let rsp = result.map_err(|e| {
            error!(request_id, file_id, error = %e, "GetSingleFile call failed");
            ServiceError::Dependency("获取文件内容失败".to_string())
        })?;
        if !rsp.success {
            return Err(ServiceError::Dependency("获取文件内容失败".to_string()));
        }
        rsp.file_data
            .map(|d| d.content)
            .ok_or_else(|| ServiceError::Dependency("获取文件内容失败".to_string()))
    }

    async fn get_multi(
        &self,
        request_id: &str,
        file_ids: &[String],
    ) -> ServiceResult<HashMap<String, Vec<u8>>> {
        if file_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.pick()?;
        let req = GetMultiFileReq {
            request_id: request_id.to_string(),
            file_id_list: file_ids.to_vec(),
        };
        let result = conn
            .post_json::<_, GetMultiFileRsp>("GetMultiFile", &req)
            .await;
        self.manager.complete(&self.service_name, &conn);

        let rsp = result.map_err(|e| {
            error!(request_id, error = %e, "GetMultiFile call failed");
            ServiceError::Dependency("获取文件内容失败".to_string())
        })?;
        if !rsp.success {
            return Err(ServiceError::Dependency("获取文件内容失败".to_string()));
        }
        Ok(rsp
            .file_data
            .into_iter()
            .map(|(id, data)| (id, data.content))
            .collect())
    }
}
