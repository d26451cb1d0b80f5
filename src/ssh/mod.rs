//! Authenticated SSH sessions with an optional SFTP sub-channel.

pub mod connection;
mod executor;
mod filesystem;
mod handler;

use std::{
    future::Future,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, PoisonError,
    },
    time::Duration,
};

use russh::{
    client::{self, Msg},
    Channel, Disconnect,
};
use russh_sftp::client::SftpSession;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::authorization::{Authorization, AuthorizationError, AuthorizationHandler};

pub use connection::ManagerOptions;
use handler::HostKeyVerifier;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("host key verification failed for {host}: {reason}")]
    HostVerification { host: String, reason: String },
    #[error("authentication rejected for {user}@{host}")]
    AuthenticationRejected { user: String, host: String },
    #[error("timed out after {timeout:?} while {action} {host}")]
    Timeout {
        host: String,
        action: &'static str,
        timeout: Duration,
    },
    #[error("connection {0} has no file-transfer sub-channel")]
    NoFileTransfer(String),
    #[error("connection {0} is closed")]
    Closed(String),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error("could not load private key")]
    Key(#[from] russh_keys::Error),
    #[error("ssh transport failure")]
    Ssh(#[from] russh::Error),
    #[error("file-transfer sub-channel failure")]
    Sftp(#[from] russh_sftp::client::error::Error),
}

impl From<ConnectionError> for io::Error {
    fn from(value: ConnectionError) -> Self {
        let kind = match &value {
            ConnectionError::HostVerification { .. } | ConnectionError::AuthenticationRejected { .. } => {
                io::ErrorKind::PermissionDenied
            }
            ConnectionError::Timeout { .. } => io::ErrorKind::TimedOut,
            ConnectionError::NoFileTransfer(_) | ConnectionError::Closed(_) => io::ErrorKind::NotConnected,
            ConnectionError::Authorization(_) => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, value)
    }
}

/// How to reach a host: a registry name, the credentials, and whether the
/// remote working directory is deleted when the connection is torn down.
#[derive(Debug, Clone)]
pub struct ConnectionConfiguration {
    name: String,
    authorization: Authorization,
    delete_working_directory: bool,
}

impl ConnectionConfiguration {
    pub fn new(name: impl Into<String>, authorization: Authorization) -> ConnectionConfiguration {
        ConnectionConfiguration {
            name: name.into(),
            authorization,
            delete_working_directory: false,
        }
    }

    pub fn from_handler(name: impl Into<String>, handler: &dyn AuthorizationHandler) -> ConnectionConfiguration {
        Self::new(name, handler.authorization())
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn set_authorization(&mut self, handler: &dyn AuthorizationHandler) -> &mut Self {
        self.authorization = handler.authorization();
        self
    }

    pub fn delete_working_directory(&mut self, delete: bool) -> &mut Self {
        self.delete_working_directory = delete;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn authorization(&self) -> &Authorization {
        &self.authorization
    }

    pub fn deletes_working_directory(&self) -> bool {
        self.delete_working_directory
    }

    /// True when both configurations reach the same account on the same host.
    pub(crate) fn same_target(&self, other: &ConnectionConfiguration) -> bool {
        let (a, b) = (&self.authorization, &other.authorization);
        a.hostname == b.hostname && a.username == b.username && a.port == b.port
    }
}

/// One authenticated session to a host.
///
/// The session and its SFTP sub-channel are shared by everything holding the
/// `Arc<Connection>`; callers running overlapping commands take
/// [`Connection::lock_usage`] first.
pub struct Connection {
    configuration: ConnectionConfiguration,
    handle_mutex: Mutex<client::Handle<HostKeyVerifier>>,
    sftp_session: RwLock<Option<Arc<SftpSession>>>,
    open: AtomicBool,
    usage_mutex: Mutex<()>,
    working_directory: StdMutex<Option<String>>,
    /// Bounds every request that waits on the remote side.
    network_timeout: Duration,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.configuration.name)
            .field("host", &self.configuration.authorization.hostname)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Connection {
    pub fn configuration(&self) -> &ConnectionConfiguration {
        &self.configuration
    }

    pub fn name(&self) -> &str {
        &self.configuration.name
    }

    pub fn hostname(&self) -> &str {
        &self.configuration.authorization.hostname
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Open and the transport has not gone away underneath us.
    pub async fn is_alive(&self) -> bool {
        self.is_open() && !self.handle_mutex.lock().await.is_closed()
    }

    pub async fn has_file_transfer(&self) -> bool {
        self.sftp_session.read().await.is_some()
    }

    /// Serializes commands that share this connection.
    pub async fn lock_usage(&self) -> MutexGuard<'_, ()> {
        self.usage_mutex.lock().await
    }

    pub(crate) async fn sftp(&self) -> io::Result<Arc<SftpSession>> {
        if !self.is_open() {
            return Err(ConnectionError::Closed(self.name().to_string()).into());
        }
        self.sftp_session
            .read()
            .await
            .clone()
            .ok_or_else(|| ConnectionError::NoFileTransfer(self.name().to_string()).into())
    }

    /// Remembers the remote directory a command staged into, for deletion on teardown.
    pub(crate) fn remember_working_directory(&self, directory: &str) {
        *self.working_directory.lock().unwrap_or_else(PoisonError::into_inner) = Some(directory.to_string());
    }

    pub(crate) fn take_working_directory(&self) -> Option<String> {
        self.working_directory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) async fn open_direct_tcpip(&self, host: &str, port: u16) -> Result<Channel<Msg>, ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed(self.name().to_string()));
        }
        let handle = self.handle_mutex.lock().await;
        self.bounded(
            "forwarding through",
            handle.channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0),
        )
        .await
    }

    pub(crate) async fn open_session_channel(&self) -> Result<Channel<Msg>, ConnectionError> {
        if !self.is_open() {
            return Err(ConnectionError::Closed(self.name().to_string()));
        }
        let handle = self.handle_mutex.lock().await;
        self.bounded("opening a channel on", handle.channel_open_session()).await
    }

    /// Drops the SFTP sub-channel and disconnects the session. Closing twice is a no-op.
    pub async fn close(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(name = %self.name(), host = %self.hostname(), "closing connection");

        drop(self.sftp_session.write().await.take());

        let handle = self.handle_mutex.lock().await;
        if handle.is_closed() {
            return Ok(());
        }
        self.bounded("disconnecting from", handle.disconnect(Disconnect::ByApplication, "", "English"))
            .await
            .map_err(io::Error::from)
    }

    async fn bounded<T>(
        &self,
        action: &'static str,
        request: impl Future<Output = Result<T, russh::Error>>,
    ) -> Result<T, ConnectionError> {
        tokio::time::timeout(self.network_timeout, request)
            .await
            .map_err(|_| ConnectionError::Timeout {
                host: self.hostname().to_string(),
                action,
                timeout: self.network_timeout,
            })?
            .map_err(ConnectionError::from)
    }
}
