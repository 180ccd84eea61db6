use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::protocol::{self, AdminRequest, AdminResponse};
use crate::app::{EstuaryError, Result};
use crate::config::AdminConfig;
use crate::services::UserService;

/// Socket file mode (owner read/write only).
const SOCKET_MODE: u32 = 0o600;

/// Mode for a socket directory this server creates.
const DIRECTORY_MODE: u32 = 0o700;

pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Local user-management endpoint.
///
/// `start` binds the socket (replacing a stale one) and spawns the accept
/// loop; `stop` closes the listener, waits for open connections to finish
/// and removes the socket file.
pub struct AdminServer {
    socket_path: PathBuf,
    max_connections: usize,
    users: UserService,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AdminServer {
    pub fn new(users: UserService, config: &AdminConfig) -> Self {
        Self {
            socket_path: config.socket_path.clone(),
            max_connections: config.max_connections.max(1),
            users,
            cancel: CancellationToken::new(),
            handle: Mutex::new(None),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn start(&self) -> Result<()> {
        let mut handle = self
            .handle
            .lock()
            .map_err(|_| EstuaryError::Other("admin server lock poisoned".into()))?;
        if handle.is_some() || self.cancel.is_cancelled() {
            return Err(EstuaryError::Other("admin server already started".into()));
        }

        if let Some(parent) = self.socket_path.parent() {
            ensure_directory(parent)?;
        }
        cleanup_socket(&self.socket_path)?;

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!(
                    "failed to bind admin socket to {}: {}",
                    self.socket_path.display(),
                    e
                ),
            )
        })?;
        set_socket_permissions(&self.socket_path)?;

        info!(
            socket = %self.socket_path.display(),
            max_connections = self.max_connections,
            "Admin channel listening"
        );

        *handle = Some(tokio::spawn(accept_loop(
            listener,
            self.users.clone(),
            Arc::new(Semaphore::new(self.max_connections)),
            self.cancel.clone(),
        )));
        Ok(())
    }

    pub async fn stop(&self) {
        self.cancel.cancel();

        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };

        if let Some(mut handle) = handle {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle).await.is_err() {
                warn!("Admin connections did not close in time, aborting");
                handle.abort();
            }

            match std::fs::remove_file(&self.socket_path) {
                Ok(()) => debug!(socket = %self.socket_path.display(), "Removed admin socket"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(socket = %self.socket_path.display(), error = %e, "Failed to remove admin socket"),
            }
            info!("Admin channel stopped");
        }
    }
}

async fn accept_loop(
    listener: UnixListener,
    users: UserService,
    connection_sem: Arc<Semaphore>,
    cancel: CancellationToken,
) {
    let mut connections = JoinSet::new();

    loop {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = connection_sem.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let stream = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => stream,
                Err(e) => {
                    warn!(error = %e, "Admin accept failed");
                    continue;
                }
            },
        };

        let users = users.clone();
        let cancel = cancel.clone();
        connections.spawn(async move {
            let _permit = permit;
            if let Err(e) = serve_connection(stream, users, cancel).await {
                debug!(error = %e, "Admin connection closed with error");
            }
        });

        // reap finished connections so the set does not grow
        while connections.try_join_next().is_some() {}
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: UnixStream,
    users: UserService,
    cancel: CancellationToken,
) -> Result<()> {
    let mut framed = Framed::new(stream, protocol::codec());

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = framed.next() => frame,
        };
        let Some(frame) = frame else {
            return Ok(());
        };

        let response = match protocol::decode::<AdminRequest>(&frame?) {
            Ok(request) => dispatch(&users, request),
            Err(e) => AdminResponse::failure(e.to_string()),
        };
        framed.send(protocol::encode(&response)?).await?;
    }
}

/// Run one request against the user service.
pub fn dispatch(users: &UserService, request: AdminRequest) -> AdminResponse {
    let method = request.method();
    debug!(method, "Admin request");

    let outcome = match request {
        AdminRequest::NewUser(credentials) => users
            .new_user(&credentials.username, &credentials.password)
            .and_then(|user| AdminResponse::with_result(&crate::services::UserSummary::from(user))),
        AdminRequest::DeleteUser(user_id) => users.delete(&user_id).map(|_| AdminResponse::ok()),
        AdminRequest::GetUsers(limit) => users
            .list(limit)
            .and_then(|list| AdminResponse::with_result(&list)),
        AdminRequest::ChangeUserName(change) => users
            .rename(&change.user_id, &change.new_name)
            .map(|_| AdminResponse::ok()),
        AdminRequest::ChangeUserPassword(change) => users
            .change_password(&change.user_id, &change.new_password)
            .map(|_| AdminResponse::ok()),
        AdminRequest::GetUserId(username) => users
            .id_of(&username)
            .and_then(|id| AdminResponse::with_result(&id)),
    };

    outcome.unwrap_or_else(|e| {
        warn!(method, error = %e, "Admin request failed");
        AdminResponse::failure(failure_message(&e))
    })
}

/// Conflicts carry their wire text as-is; everything else uses the error display.
fn failure_message(err: &EstuaryError) -> String {
    match err {
        EstuaryError::Conflict(message) => message.clone(),
        other => other.to_string(),
    }
}

/// Create the socket directory if missing. An existing directory keeps its
/// permissions; a symlink or non-directory is refused.
fn ensure_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }

    match std::fs::symlink_metadata(path) {
        Ok(metadata) => {
            if metadata.file_type().is_symlink() {
                return Err(EstuaryError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("{} is a symlink, refusing to use as socket directory", path.display()),
                )));
            }
            if !metadata.is_dir() {
                return Err(EstuaryError::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists but is not a directory", path.display()),
                )));
            }
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            std::fs::create_dir_all(path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(path, std::fs::Permissions::from_mode(DIRECTORY_MODE))?;
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Remove a socket left behind by a previous run. Anything other than a
/// socket at that path is an error.
fn cleanup_socket(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if !metadata.file_type().is_socket() {
            return Err(EstuaryError::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("path {} exists but is not a socket", path.display()),
            )));
        }
    }

    std::fs::remove_file(path)?;
    debug!(path = %path.display(), "Removed stale socket file");
    Ok(())
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::admin::AdminClient;
    use crate::store::{SharedStore, SqliteStore};

    fn users() -> UserService {
        let store: SharedStore = Arc::new(SqliteStore::in_memory().unwrap());
        UserService::new(store)
    }

    fn config(dir: &Path) -> AdminConfig {
        AdminConfig {
            socket_path: dir.join("run").join("admin.sock"),
            max_connections: 2,
        }
    }

    #[test]
    fn test_dispatch_duplicate_user_message() {
        let users = users();
        let request = AdminRequest::NewUser(protocol::Credentials {
            username: "bob".into(),
            password: "pw".into(),
        });

        assert!(dispatch(&users, request.clone()).success);
        let second = dispatch(&users, request);
        assert!(!second.success);
        assert_eq!(second.message.as_deref(), Some("Username already exists"));
    }

    #[test]
    fn test_dispatch_missing_user() {
        let response = dispatch(&users(), AdminRequest::DeleteUser("nobody".into()));
        assert!(!response.success);
        assert!(response.message.unwrap().contains("nobody"));
    }

    #[tokio::test]
    async fn test_socket_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let server = AdminServer::new(users(), &config(dir.path()));
        server.start().unwrap();

        let path = server.socket_path().to_path_buf();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SOCKET_MODE);

        let mut client = AdminClient::connect(&path).await.unwrap();
        let id = client.new_user("bob", "pw").await.unwrap().id;
        assert_eq!(client.user_id("bob").await.unwrap(), id);
        drop(client);

        server.stop().await;
        assert!(!path.exists());
        assert!(server.start().is_err());
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());

        let first = AdminServer::new(users(), &config);
        first.start().unwrap();
        // simulate a crash: the socket file stays behind
        first.cancel.cancel();

        let second = AdminServer::new(users(), &config);
        second.start().unwrap();
        let mut client = AdminClient::connect(&config.socket_path).await.unwrap();
        assert!(client.users(10).await.unwrap().is_empty());
        drop(client);

        second.stop().await;
        first.stop().await;
    }

    #[tokio::test]
    async fn test_refuses_non_socket_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.sock");
        std::fs::write(&path, b"not a socket").unwrap();

        let server = AdminServer::new(
            users(),
            &AdminConfig {
                socket_path: path.clone(),
                max_connections: 1,
            },
        );
        assert!(server.start().is_err());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_stop_closes_idle_connections() {
        let dir = tempfile::tempdir().unwrap();
        let server = AdminServer::new(users(), &config(dir.path()));
        server.start().unwrap();

        let _idle = AdminClient::connect(server.socket_path()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), server.stop())
            .await
            .expect("stop should not wait on idle clients");
    }
}
