//! Admin wire format.
//!
//! Every message is one JSON document in a 4-byte big-endian length-prefixed
//! frame. A request names one method and carries one argument:
//!
//! ```text
//! {"method": "NewUser", "arg": {"username": "bob", "password": "..."}}
//! {"success": false, "message": "Username already exists"}
//! ```

use bytes::{Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LengthDelimitedCodec;

use crate::app::{EstuaryError, Result};

/// Largest accepted frame.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewName {
    pub user_id: String,
    pub new_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPassword {
    pub user_id: String,
    pub new_password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "arg")]
pub enum AdminRequest {
    NewUser(Credentials),
    /// User id
    DeleteUser(String),
    /// Maximum number of users returned
    GetUsers(usize),
    ChangeUserName(NewName),
    ChangeUserPassword(NewPassword),
    /// Username
    #[serde(rename = "GetUserID")]
    GetUserId(String),
}

impl AdminRequest {
    pub fn method(&self) -> &'static str {
        match self {
            AdminRequest::NewUser(_) => "NewUser",
            AdminRequest::DeleteUser(_) => "DeleteUser",
            AdminRequest::GetUsers(_) => "GetUsers",
            AdminRequest::ChangeUserName(_) => "ChangeUserName",
            AdminRequest::ChangeUserPassword(_) => "ChangeUserPassword",
            AdminRequest::GetUserId(_) => "GetUserID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl AdminResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: None,
            result: None,
        }
    }

    pub fn with_result<T: Serialize>(value: &T) -> Result<Self> {
        let result = serde_json::to_value(value)
            .map_err(|e| EstuaryError::Protocol(format!("cannot encode result: {}", e)))?;
        Ok(Self {
            success: true,
            message: None,
            result: Some(result),
        })
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            result: None,
        }
    }

    /// The decoded result of a successful response, or the failure message
    /// as an error.
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if !self.success {
            return Err(EstuaryError::Other(
                self.message.unwrap_or_else(|| "request failed".into()),
            ));
        }
        serde_json::from_value(self.result.unwrap_or(serde_json::Value::Null))
            .map_err(|e| EstuaryError::Protocol(format!("unexpected result: {}", e)))
    }
}

pub fn encode<T: Serialize>(message: &T) -> Result<Bytes> {
    serde_json::to_vec(message)
        .map(Bytes::from)
        .map_err(|e| EstuaryError::Protocol(format!("encode failed: {}", e)))
}

pub fn decode<T: DeserializeOwned>(frame: &BytesMut) -> Result<T> {
    serde_json::from_slice(frame).map_err(|e| EstuaryError::Protocol(format!("decode failed: {}", e)))
}
