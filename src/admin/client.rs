use std::path::Path;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::protocol::{self, AdminRequest, AdminResponse, Credentials, NewName, NewPassword};
use crate::app::{EstuaryError, Result};
use crate::services::UserSummary;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the admin socket. One connection carries any number of
/// sequential requests.
pub struct AdminClient {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
    timeout: Duration,
}

impl AdminClient {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        Self::connect_with_timeout(socket_path, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(socket_path: &Path, timeout: Duration) -> Result<Self> {
        if !socket_path.exists() {
            return Err(EstuaryError::Protocol(format!(
                "admin socket {} not found; is the service running?",
                socket_path.display()
            )));
        }

        let stream = tokio::time::timeout(timeout, UnixStream::connect(socket_path))
            .await
            .map_err(|_| EstuaryError::Protocol("timed out connecting to admin socket".into()))??;

        Ok(Self {
            framed: Framed::new(stream, protocol::codec()),
            timeout,
        })
    }

    /// Send one request and wait for its response.
    pub async fn call(&mut self, request: &AdminRequest) -> Result<AdminResponse> {
        let frame = protocol::encode(request)?;

        tokio::time::timeout(self.timeout, self.framed.send(frame))
            .await
            .map_err(|_| EstuaryError::Protocol(format!("{} timed out", request.method())))??;

        let response = tokio::time::timeout(self.timeout, self.framed.next())
            .await
            .map_err(|_| EstuaryError::Protocol(format!("{} timed out", request.method())))?
            .ok_or_else(|| EstuaryError::Protocol("connection closed".into()))??;

        protocol::decode(&response)
    }

    pub async fn new_user(&mut self, username: &str, password: &str) -> Result<UserSummary> {
        self.call(&AdminRequest::NewUser(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        }))
        .await?
        .into_result()
    }

    pub async fn delete_user(&mut self, user_id: &str) -> Result<()> {
        self.call(&AdminRequest::DeleteUser(user_id.to_string()))
            .await?
            .into_result()
    }

    pub async fn users(&mut self, limit: usize) -> Result<Vec<UserSummary>> {
        self.call(&AdminRequest::GetUsers(limit)).await?.into_result()
    }

    pub async fn rename_user(&mut self, user_id: &str, new_name: &str) -> Result<()> {
        self.call(&AdminRequest::ChangeUserName(NewName {
            user_id: user_id.to_string(),
            new_name: new_name.to_string(),
        }))
        .await?
        .into_result()
    }

    pub async fn set_password(&mut self, user_id: &str, new_password: &str) -> Result<()> {
        self.call(&AdminRequest::ChangeUserPassword(NewPassword {
            user_id: user_id.to_string(),
            new_password: new_password.to_string(),
        }))
        .await?
        .into_result()
    }

    pub async fn user_id(&mut self, username: &str) -> Result<String> {
        self.call(&AdminRequest::GetUserId(username.to_string()))
            .await?
            .into_result()
    }
}
