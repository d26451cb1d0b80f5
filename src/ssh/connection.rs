use std::{
    path::PathBuf,
    sync::{atomic::AtomicBool, Arc, Mutex as StdMutex},
    time::Duration,
};

use russh::client::{self, Handle};
use russh_sftp::client::SftpSession;
use tokio::{
    sync::{Mutex, RwLock},
    time::timeout,
};

use super::{handler::HostKeyVerifier, Connection, ConnectionConfiguration, ConnectionError};
use crate::authorization::{Authorization, Credential};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Transport options applied to every connection a manager opens.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    pub known_hosts: PathBuf,
    /// When off, hosts missing from `known_hosts` are learned on first
    /// contact. A changed key is rejected either way.
    pub strict_host_key_checking: bool,
    /// Bounds the handshake with authentication, and each later channel request.
    pub connect_timeout: Duration,
    pub keepalive_interval: Option<Duration>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        ManagerOptions {
            known_hosts: home.join(".ssh").join("known_hosts"),
            strict_host_key_checking: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
        }
    }
}

impl ManagerOptions {
    fn client_config(&self) -> Arc<client::Config> {
        Arc::new(client::Config {
            keepalive_interval: self.keepalive_interval,
            keepalive_max: 3,
            ..Default::default()
        })
    }

    fn verifier(&self, authorization: &Authorization) -> HostKeyVerifier {
        HostKeyVerifier::new(
            authorization.hostname.clone(),
            authorization.port,
            self.known_hosts.clone(),
            self.strict_host_key_checking,
        )
    }
}

impl Connection {
    /// Opens a direct session to the host named by the configuration.
    pub(crate) async fn connect(
        configuration: ConnectionConfiguration,
        options: &ManagerOptions,
    ) -> Result<Connection, ConnectionError> {
        let authorization = configuration.authorization();
        authorization.validate()?;

        tracing::debug!(
            name = %configuration.name(),
            host = %authorization.hostname,
            port = authorization.port,
            "opening ssh connection"
        );
        let address = (authorization.hostname.clone(), authorization.port);
        let handle = timeout(
            options.connect_timeout,
            client::connect(options.client_config(), address, options.verifier(authorization)),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            host: authorization.hostname.clone(),
            action: "connecting to",
            timeout: options.connect_timeout,
        })??;

        Self::establish(configuration, handle, options).await
    }

    /// Opens a session to the configured host, tunnelled through `jump`.
    pub(crate) async fn connect_through(
        jump: &Connection,
        configuration: ConnectionConfiguration,
        options: &ManagerOptions,
    ) -> Result<Connection, ConnectionError> {
        let authorization = configuration.authorization();
        authorization.validate()?;

        tracing::debug!(
            name = %configuration.name(),
            via = %jump.name(),
            host = %authorization.hostname,
            "opening forwarded ssh connection"
        );
        let channel = jump
            .open_direct_tcpip(&authorization.hostname, authorization.port)
            .await?;
        let handle = timeout(
            options.connect_timeout,
            client::connect_stream(
                options.client_config(),
                channel.into_stream(),
                options.verifier(authorization),
            ),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            host: authorization.hostname.clone(),
            action: "forwarding to",
            timeout: options.connect_timeout,
        })??;

        Self::establish(configuration, handle, options).await
    }

    async fn establish(
        configuration: ConnectionConfiguration,
        mut handle: Handle<HostKeyVerifier>,
        options: &ManagerOptions,
    ) -> Result<Connection, ConnectionError> {
        timeout(options.connect_timeout, authenticate(&mut handle, configuration.authorization()))
            .await
            .map_err(|_| ConnectionError::Timeout {
                host: configuration.authorization().hostname.clone(),
                action: "authenticating to",
                timeout: options.connect_timeout,
            })??;

        let sftp_session = match timeout(options.connect_timeout, open_sftp(&handle)).await {
            Ok(Ok(session)) => Some(Arc::new(session)),
            Ok(Err(err)) => {
                tracing::warn!(name = %configuration.name(), "file-transfer sub-channel unavailable: {err}");
                None
            }
            Err(_) => {
                tracing::warn!(name = %configuration.name(), "file-transfer sub-channel timed out");
                None
            }
        };

        tracing::info!(
            name = %configuration.name(),
            host = %configuration.authorization().hostname,
            "connection established"
        );
        Ok(Connection {
            configuration,
            handle_mutex: Mutex::new(handle),
            sftp_session: RwLock::new(sftp_session),
            open: AtomicBool::new(true),
            usage_mutex: Mutex::new(()),
            working_directory: StdMutex::new(None),
            network_timeout: options.connect_timeout,
        })
    }
}

async fn authenticate(handle: &mut Handle<HostKeyVerifier>, authorization: &Authorization) -> Result<(), ConnectionError> {
    let username = authorization.username.clone();
    let accepted = match &authorization.credential {
        Credential::Password(password) => handle.authenticate_password(username, password).await?,
        Credential::KeyFile(path) => {
            let key_pair = russh_keys::load_secret_key(path, None)?;
            handle.authenticate_publickey(username, Arc::new(key_pair)).await?
        }
        Credential::None => handle.authenticate_none(username).await?,
    };

    if !accepted {
        return Err(ConnectionError::AuthenticationRejected {
            user: authorization.username.clone(),
            host: authorization.hostname.clone(),
        });
    }
    Ok(())
}

async fn open_sftp(handle: &Handle<HostKeyVerifier>) -> Result<SftpSession, ConnectionError> {
    let channel = handle.channel_open_session().await?;
    channel.request_subsystem(true, "sftp").await?;
    Ok(SftpSession::new(channel.into_stream()).await?)
}
