use std::{io, sync::Arc};

use super::{Command, RemoteTransfer, Topology};
use crate::{
    authorization::AuthorizationHandler,
    configuration::CommandConfiguration,
    manager::{ConnectionManager, ScopedConnection},
    ssh::{Connection, ConnectionConfiguration},
};

/// Builds the right [`Command`] for a configuration, opening the
/// connections it needs through a shared [`ConnectionManager`].
///
/// Connection configurations with an empty name are opened as scoped
/// connections and removed again once the command finishes.
#[derive(Clone, Default)]
pub struct CommandFactory {
    manager: ConnectionManager,
}

impl CommandFactory {
    pub fn new(manager: ConnectionManager) -> CommandFactory {
        CommandFactory { manager }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// A remote command when the configuration names a remote working
    /// directory, a local one otherwise.
    ///
    /// A remote configuration without a connection still yields a command,
    /// which finishes with `InfoError` when executed. A connection passed
    /// with a local configuration is not opened.
    pub async fn get_command(
        &self,
        configuration: CommandConfiguration,
        connection: Option<ConnectionConfiguration>,
    ) -> io::Result<Command> {
        if !configuration.is_remote() {
            if let Some(connection) = connection {
                tracing::debug!(id = configuration.id(), name = %connection.name(), "local configuration, connection not opened");
            }
            return Ok(Command::new(configuration, Topology::Local));
        }
        let Some(connection) = connection else {
            tracing::warn!(id = configuration.id(), "remote working directory set but no connection given");
            return Ok(Command::new(configuration, Topology::Local));
        };

        let (connection, scoped) = self.open(connection).await?;
        let mut command = Command::new(configuration, Topology::Remote { connection });
        command.hold_all(scoped);
        Ok(command)
    }

    /// Inputs come from `jump`, the process runs on `target` reached through it.
    pub async fn get_hop_command(
        &self,
        configuration: CommandConfiguration,
        jump: ConnectionConfiguration,
        target: ConnectionConfiguration,
    ) -> io::Result<Command> {
        let (jump, mut scoped) = self.open(jump).await?;
        let (target, target_scoped) = match self.open_through(&jump, target).await {
            Ok(opened) => opened,
            Err(err) => {
                for guard in scoped {
                    guard.release().await;
                }
                return Err(err);
            }
        };
        scoped.extend(target_scoped);

        let mut command = Command::new(configuration, Topology::MultiHop { jump, target });
        command.hold_all(scoped);
        Ok(command)
    }

    /// Copies `source` on the connected host to `destination` on the host
    /// `destination_authorization` points at, using its key.
    pub async fn get_remote_transfer_command(
        &self,
        mut configuration: CommandConfiguration,
        connection: ConnectionConfiguration,
        source: impl Into<String>,
        destination: impl Into<String>,
        destination_authorization: &dyn AuthorizationHandler,
    ) -> io::Result<Command> {
        let transfer = RemoteTransfer::new(source, destination, destination_authorization.authorization());
        configuration.set_executable(transfer.invocation());

        let (connection, scoped) = self.open(connection).await?;
        let mut command = Command::new(configuration, Topology::RemoteTransfer { connection, transfer });
        command.hold_all(scoped);
        Ok(command)
    }

    async fn open(&self, configuration: ConnectionConfiguration) -> io::Result<(Arc<Connection>, Vec<ScopedConnection>)> {
        if configuration.name().is_empty() {
            let scoped = self.manager.open_scoped(configuration).await?;
            return Ok((scoped.connection().clone(), vec![scoped]));
        }
        Ok((self.manager.open_connection(configuration).await?, Vec::new()))
    }

    async fn open_through(
        &self,
        first: &Connection,
        configuration: ConnectionConfiguration,
    ) -> io::Result<(Arc<Connection>, Vec<ScopedConnection>)> {
        if configuration.name().is_empty() {
            let scoped = self.manager.open_scoped_forwarding(first, configuration).await?;
            return Ok((scoped.connection().clone(), vec![scoped]));
        }
        Ok((self.manager.open_forwarding_connection(first, configuration).await?, Vec::new()))
    }
}
