//! The business cores and their HTTP RPC surfaces.

pub mod file;
pub mod speech;
pub mod storage;
pub mod transmit;
pub mod user;

pub use file::FileService;
pub use speech::SpeechService;
pub use storage::StorageService;
pub use transmit::TransmitService;
pub use user::UserService;
