//! Registry of named connections.

use std::{
    io,
    ops::Deref,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    filesystem::Filesystem,
    ssh::{Connection, ConnectionConfiguration, ManagerOptions},
};

/// Opens, pools and tears down [`Connection`]s by name.
///
/// Cloning is cheap and every clone sees the same registry. Lookups run
/// concurrently; anything that adds or removes an entry is serialized.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

#[derive(Default)]
struct ManagerInner {
    connections: DashMap<String, Arc<Connection>>,
    options: RwLock<ManagerOptions>,
    mutation_lock: Mutex<()>,
}

impl ConnectionManager {
    pub fn new() -> ConnectionManager {
        Self::default()
    }

    pub fn with_options(options: ManagerOptions) -> ConnectionManager {
        ConnectionManager {
            inner: Arc::new(ManagerInner {
                options: RwLock::new(options),
                ..Default::default()
            }),
        }
    }

    pub fn options(&self) -> ManagerOptions {
        self.inner.options.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn update_options(&self, update: impl FnOnce(&mut ManagerOptions)) {
        update(&mut self.inner.options.write().unwrap_or_else(PoisonError::into_inner));
    }

    /// Applies to every connection opened afterwards.
    pub fn set_known_hosts(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.update_options(|options| options.known_hosts = path);
    }

    pub fn known_hosts(&self) -> PathBuf {
        self.options().known_hosts
    }

    pub fn set_strict_host_key_checking(&self, strict: bool) {
        self.update_options(|options| options.strict_host_key_checking = strict);
    }

    pub fn set_connect_timeout(&self, timeout: Duration) {
        self.update_options(|options| options.connect_timeout = timeout);
    }

    /// Returns the registered connection when it is open and points at the
    /// same host and user, otherwise opens a new one and replaces the entry.
    pub async fn open_connection(&self, configuration: ConnectionConfiguration) -> io::Result<Arc<Connection>> {
        let _guard = self.inner.mutation_lock.lock().await;
        if let Some(existing) = self.reusable(&configuration).await {
            return Ok(existing);
        }

        let options = self.options();
        let connection = Arc::new(Connection::connect(configuration, &options).await?);
        self.register(connection.clone());
        Ok(connection)
    }

    /// Opens a connection to the configured host tunnelled through `first`,
    /// which stays open and registered.
    pub async fn open_forwarding_connection(
        &self,
        first: &Connection,
        configuration: ConnectionConfiguration,
    ) -> io::Result<Arc<Connection>> {
        let _guard = self.inner.mutation_lock.lock().await;
        if let Some(existing) = self.reusable(&configuration).await {
            return Ok(existing);
        }

        let options = self.options();
        let connection = Arc::new(Connection::connect_through(first, configuration, &options).await?);
        self.register(connection.clone());
        Ok(connection)
    }

    /// Opens a connection that is removed when the returned guard is released
    /// or dropped. An empty name is replaced by a generated one.
    pub async fn open_scoped(&self, configuration: ConnectionConfiguration) -> io::Result<ScopedConnection> {
        let connection = self.open_connection(scoped_name(configuration)).await?;
        Ok(self.scope(connection))
    }

    /// Like [`open_scoped`](Self::open_scoped), tunnelled through `first`.
    pub async fn open_scoped_forwarding(
        &self,
        first: &Connection,
        configuration: ConnectionConfiguration,
    ) -> io::Result<ScopedConnection> {
        let connection = self
            .open_forwarding_connection(first, scoped_name(configuration))
            .await?;
        Ok(self.scope(connection))
    }

    fn scope(&self, connection: Arc<Connection>) -> ScopedConnection {
        ScopedConnection {
            manager: self.clone(),
            connection,
            released: false,
        }
    }

    pub fn get_connection(&self, name: &str) -> Option<Arc<Connection>> {
        self.inner.connections.get(name).map(|entry| entry.value().clone())
    }

    pub fn is_connection_open(&self, name: &str) -> bool {
        self.get_connection(name).is_some_and(|connection| connection.is_open())
    }

    /// Registered names, sorted.
    pub fn list_all_connections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.connections.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.connections.is_empty()
    }

    /// Disconnects the session but keeps the entry. Returns whether the name was registered.
    pub async fn close_connection(&self, name: &str) -> bool {
        let Some(connection) = self.get_connection(name) else {
            tracing::debug!(name, "close requested for unknown connection");
            return false;
        };
        close_logged(&connection).await;
        true
    }

    pub async fn close_all_connections(&self) {
        for connection in self.snapshot() {
            close_logged(&connection).await;
        }
    }

    /// Tears the connection down and drops the entry. Returns whether the name was registered.
    pub async fn remove_connection(&self, name: &str) -> bool {
        let removed = {
            let _guard = self.inner.mutation_lock.lock().await;
            self.inner.connections.remove(name)
        };
        match removed {
            Some((_, connection)) => {
                teardown(&connection).await;
                true
            }
            None => false,
        }
    }

    pub async fn remove_all_connections(&self) {
        let drained: Vec<Arc<Connection>> = {
            let _guard = self.inner.mutation_lock.lock().await;
            let connections = self.snapshot();
            self.inner.connections.clear();
            connections
        };
        for connection in drained {
            teardown(&connection).await;
        }
    }

    /// Removes `connection` only while it is still the registered instance for its name.
    async fn remove_instance(&self, connection: &Arc<Connection>) {
        let removed = {
            let _guard = self.inner.mutation_lock.lock().await;
            self.inner
                .connections
                .remove_if(connection.name(), |_, registered| Arc::ptr_eq(registered, connection))
                .is_some()
        };
        if removed {
            teardown(connection).await;
        } else {
            close_logged(connection).await;
        }
    }

    async fn reusable(&self, configuration: &ConnectionConfiguration) -> Option<Arc<Connection>> {
        let existing = self.get_connection(configuration.name())?;
        if existing.configuration().same_target(configuration) && existing.is_alive().await {
            tracing::debug!(name = %configuration.name(), "reusing open connection");
            return Some(existing);
        }

        tracing::info!(name = %configuration.name(), "replacing registered connection");
        self.inner.connections.remove(configuration.name());
        close_logged(&existing).await;
        None
    }

    fn register(&self, connection: Arc<Connection>) {
        self.inner.connections.insert(connection.name().to_string(), connection);
    }

    fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.connections.iter().map(|entry| entry.value().clone()).collect()
    }
}

fn scoped_name(mut configuration: ConnectionConfiguration) -> ConnectionConfiguration {
    if configuration.name().is_empty() {
        configuration.set_name(format!("scoped-{}", uuid::Uuid::new_v4()));
    }
    configuration
}

async fn close_logged(connection: &Connection) {
    if let Err(err) = connection.close().await {
        tracing::warn!(name = %connection.name(), "error while closing connection: {err}");
    }
}

/// Deletes the remote working directory when configured, then closes.
async fn teardown(connection: &Connection) {
    if connection.configuration().deletes_working_directory() && connection.is_open() {
        if let Some(directory) = connection.take_working_directory() {
            tracing::info!(name = %connection.name(), %directory, "deleting remote working directory");
            match connection.remove_dir_recursively(Path::new(&directory)).await {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(name = %connection.name(), %directory, "could not delete remote working directory: {err}")
                }
            }
        }
    }
    close_logged(connection).await;
}

/// A registered connection that is removed from its manager when released.
///
/// Prefer [`ScopedConnection::release`]; dropping the guard schedules the
/// removal on the current tokio runtime instead.
pub struct ScopedConnection {
    manager: ConnectionManager,
    connection: Arc<Connection>,
    released: bool,
}

impl ScopedConnection {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub async fn release(mut self) {
        self.released = true;
        self.manager.remove_instance(&self.connection).await;
    }
}

impl Deref for ScopedConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let manager = self.manager.clone();
        let connection = self.connection.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { manager.remove_instance(&connection).await });
            }
            Err(_) => {
                tracing::warn!(name = %connection.name(), "scoped connection dropped outside a runtime, leaving it registered");
            }
        }
    }
}
