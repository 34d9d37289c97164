//! Request/response types for every service operation.
//!
//! These are the JSON bodies carried over the HTTP RPC surface and, for
//! [`MessageInfo`], the broker payload. `request_id` is an opaque string
//! echoed in every response for cross-service correlation; binary payloads
//! travel as base64 strings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Base64 (standard alphabet) serde adapter for binary fields.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Core envelope types
// ============================================================================

/// Discriminator stored in the relational `message_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text = 0,
    Image = 1,
    File = 2,
    Speech = 3,
}

impl MessageKind {
    pub fn as_i64(self) -> i64 {
        self as i64
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Text),
            1 => Some(Self::Image),
            2 => Some(Self::File),
            3 => Some(Self::Speech),
            _ => None,
        }
    }
}

/// The tagged payload union of a message.
///
/// Before persistence the file-carrying variants hold raw bytes and an empty
/// `file_id`; the storage consumer offloads the bytes to the file service
/// and keeps only the id. Read paths fill both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text {
        content: String,
    },
    Image {
        #[serde(default)]
        file_id: String,
        #[serde(default, with = "base64_bytes")]
        content: Vec<u8>,
    },
    File {
        #[serde(default)]
        file_id: String,
        file_name: String,
        file_size: u64,
        #[serde(default, with = "base64_bytes")]
        content: Vec<u8>,
    },
    Speech {
        #[serde(default)]
        file_id: String,
        #[serde(default, with = "base64_bytes")]
        content: Vec<u8>,
    },
}

impl MessageContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Text { .. } => MessageKind::Text,
            Self::Image { .. } => MessageKind::Image,
            Self::File { .. } => MessageKind::File,
            Self::Speech { .. } => MessageKind::Speech,
        }
    }
}

/// A user profile as carried between services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, with = "base64_bytes")]
    pub avatar: Vec<u8>,
}

/// The canonical, fully-resolved message envelope.
///
/// The bytes published to the broker are exactly the bytes returned to the
/// transmit caller, so downstream delivery and durable storage see an
/// identical payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageInfo {
    pub message_id: String,
    pub chat_session_id: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub sender: UserInfo,
    pub message: MessageContent,
}

impl MessageInfo {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("envelope serialization cannot fail")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// File service
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileUploadData {
    #[serde(default)]
    pub file_name: String,
    #[serde(default, with = "base64_bytes")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDownloadData {
    pub file_id: String,
    #[serde(default, with = "base64_bytes")]
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub file_id: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSingleFileReq {
    pub request_id: String,
    pub file_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetSingleFileRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    pub file_data: Option<FileDownloadData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMultiFileReq {
    pub request_id: String,
    pub file_id_list: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMultiFileRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub file_data: HashMap<String, FileDownloadData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutSingleFileReq {
    pub request_id: String,
    pub file_data: FileUploadData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutSingleFileRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    pub file_info: Option<FileInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutMultiFileReq {
    pub request_id: String,
    pub file_data: Vec<FileUploadData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutMultiFileRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub file_info: Vec<FileInfo>,
}

// ============================================================================
// User service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRegisterReq {
    pub request_id: String,
    pub nickname: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRegisterRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLoginReq {
    pub request_id: String,
    pub nickname: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserLoginRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub login_session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailVerifyCodeReq {
    pub request_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailVerifyCodeRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub verify_code_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRegisterReq {
    pub request_id: String,
    pub email: String,
    pub verify_code_id: String,
    pub verify_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRegisterRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailLoginReq {
    pub request_id: String,
    pub email: String,
    pub verify_code_id: String,
    pub verify_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailLoginRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub login_session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetUserInfoReq {
    pub request_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetUserInfoRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    pub user_info: Option<UserInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMultiUserInfoReq {
    pub request_id: String,
    pub users_id: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMultiUserInfoRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub users_info: HashMap<String, UserInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserAvatarReq {
    pub request_id: String,
    pub user_id: String,
    /// Login session this write is performed under.
    pub session_id: String,
    #[serde(default, with = "base64_bytes")]
    pub avatar: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetUserAvatarRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserNicknameReq {
    pub request_id: String,
    pub user_id: String,
    pub session_id: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetUserNicknameRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserDescriptionReq {
    pub request_id: String,
    pub user_id: String,
    pub session_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetUserDescriptionRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUserEmailReq {
    pub request_id: String,
    pub user_id: String,
    pub session_id: String,
    pub email: String,
    pub email_verify_code_id: String,
    pub email_verify_code: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetUserEmailRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSearchReq {
    pub request_id: String,
    pub search_key: String,
    /// Ids to exclude from the result, e.g. existing friends and self.
    #[serde(default)]
    pub exclude_users_id: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSearchRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub users_info: Vec<UserInfo>,
}

// ============================================================================
// Transmit service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMessageReq {
    pub request_id: String,
    pub user_id: String,
    pub chat_session_id: String,
    pub message: MessageContent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetTransmitTargetRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    pub message: Option<MessageInfo>,
    #[serde(default)]
    pub target_id_list: Vec<String>,
}

// ============================================================================
// Storage (history) service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHistoryMsgReq {
    pub request_id: String,
    pub chat_session_id: String,
    pub start_time: i64,
    pub over_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetHistoryMsgRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub msg_list: Vec<MessageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRecentMsgReq {
    pub request_id: String,
    pub chat_session_id: String,
    pub msg_count: i64,
    /// Upper time bound; 0 means "now".
    #[serde(default)]
    pub cur_time: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetRecentMsgRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub msg_list: Vec<MessageInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgSearchReq {
    pub request_id: String,
    pub chat_session_id: String,
    pub search_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MsgSearchRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub msg_list: Vec<MessageInfo>,
}

// ============================================================================
// Speech service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRecognitionReq {
    pub request_id: String,
    #[serde(default, with = "base64_bytes")]
    pub speech_content: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechRecognitionRsp {
    pub request_id: String,
    pub success: bool,
    #[serde(default)]
    pub errmsg: String,
    #[serde(default)]
    pub recognition_result: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_kind_roundtrips_through_discriminator() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::File,
            MessageKind::Speech,
        ] {
            assert_eq!(MessageKind::from_i64(kind.as_i64()), Some(kind));
        }
        assert_eq!(MessageKind::from_i64(9), None);
    }

    #[test]
    fn envelope_bytes_roundtrip() {
        let envelope = MessageInfo {
            message_id: "0123456789abcdef".to_string(),
            chat_session_id: "s1".to_string(),
            timestamp: 1_700_000_000,
            sender: UserInfo {
                user_id: "u1".to_string(),
                nickname: "alice".to_string(),
                ..Default::default()
            },
            message: MessageContent::Text {
                content: "吃的盖浇饭！".to_string(),
            },
        };
        let bytes = envelope.to_bytes();
        let back = MessageInfo::from_bytes(&bytes).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn file_content_travels_as_base64() {
        let content = MessageContent::File {
            file_id: String::new(),
            file_name: "notes.txt".to_string(),
            file_size: 3,
            content: vec![0xde, 0xad, 0xbe],
        };
        let json = serde_json::to_value(&content).unwrap();
        assert_eq!(json["type"], "file");
        assert_eq!(json["content"], "3q2+");
        let back: MessageContent = serde_json::from_value(json).unwrap();
        assert_eq!(back, content);
    }

    #[test]
    fn envelope_parse_rejects_garbage() {
        assert!(MessageInfo::from_bytes(b"not json").is_err());
        assert!(MessageInfo::from_bytes(b"{\"message_id\":1}").is_err());
    }
}
