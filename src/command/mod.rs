//! The command state machine.
//!
//! Every command moves through the same stages (validate, stage inputs,
//! launch and monitor, finish) and differs only in where files come from
//! and where the process runs. That difference is the [`Topology`].

mod factory;
mod local;
mod remote;
mod transfer;

use std::{fmt, io, path::Path, sync::Arc};

use tokio::io::AsyncWriteExt;

use crate::{
    authorization::local_hostname,
    configuration::CommandConfiguration,
    executor::{Executor, ProcessConfiguration},
    filesystem::{Filesystem, OpenOptions},
    manager::ScopedConnection,
    ssh::Connection,
    status::CommandStatus,
    update::UpdateHandler,
};

pub use factory::CommandFactory;
pub use transfer::RemoteTransfer;

const STD_OUT_LOG: &str = "standard output";
const STD_ERR_LOG: &str = "standard error";

/// Which variant of command this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Local,
    Remote,
    MultiHop,
    RemoteRemoteFileTransfer,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandKind::Local => "local",
            CommandKind::Remote => "remote",
            CommandKind::MultiHop => "multi-hop",
            CommandKind::RemoteRemoteFileTransfer => "remote-remote file transfer",
        };
        f.write_str(name)
    }
}

pub(crate) enum Topology {
    Local,
    /// Inputs come from the local machine, the process runs on `connection`.
    Remote { connection: Arc<Connection> },
    /// Inputs come from `jump`, the process runs on `target`, reached through `jump`.
    MultiHop {
        jump: Arc<Connection>,
        target: Arc<Connection>,
    },
    /// A single copy run on `connection` toward another host.
    RemoteTransfer {
        connection: Arc<Connection>,
        transfer: RemoteTransfer,
    },
}

impl Topology {
    fn kind(&self) -> CommandKind {
        match self {
            Topology::Local => CommandKind::Local,
            Topology::Remote { .. } => CommandKind::Remote,
            Topology::MultiHop { .. } => CommandKind::MultiHop,
            Topology::RemoteTransfer { .. } => CommandKind::RemoteRemoteFileTransfer,
        }
    }

    /// The connection the process runs on, if any.
    fn execution_connection(&self) -> Option<&Arc<Connection>> {
        match self {
            Topology::Local => None,
            Topology::Remote { connection } | Topology::RemoteTransfer { connection, .. } => Some(connection),
            Topology::MultiHop { target, .. } => Some(target),
        }
    }
}

/// One job run against a [`Topology`], ending in exactly one terminal status.
pub struct Command {
    status: CommandStatus,
    configuration: CommandConfiguration,
    topology: Topology,
    update_handler: Option<Box<dyn UpdateHandler>>,
    std_output: String,
    std_error: String,
    scoped_connections: Vec<ScopedConnection>,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.configuration.id())
            .field("kind", &self.kind())
            .field("status", &self.status)
            .finish()
    }
}

impl Command {
    pub(crate) fn new(configuration: CommandConfiguration, topology: Topology) -> Command {
        Command {
            status: CommandStatus::Processing,
            configuration,
            topology,
            update_handler: None,
            std_output: String::new(),
            std_error: String::new(),
            scoped_connections: Vec::new(),
        }
    }

    pub(crate) fn hold_all(&mut self, scoped: Vec<ScopedConnection>) {
        self.scoped_connections.extend(scoped);
    }

    pub fn kind(&self) -> CommandKind {
        self.topology.kind()
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn configuration(&self) -> &CommandConfiguration {
        &self.configuration
    }

    /// Replaces the configuration and starts over from `Processing`.
    pub fn set_configuration(&mut self, configuration: CommandConfiguration) {
        self.configuration = configuration;
        self.status = CommandStatus::Processing;
        self.std_output.clear();
        self.std_error.clear();
    }

    pub fn set_update_handler(&mut self, handler: Box<dyn UpdateHandler>) {
        self.update_handler = Some(handler);
    }

    /// Standard output captured from every stage that ran.
    pub fn std_output(&self) -> &str {
        &self.std_output
    }

    pub fn std_error(&self) -> &str {
        &self.std_error
    }

    pub fn connection(&self) -> Option<&Arc<Connection>> {
        self.topology.execution_connection()
    }

    /// Whether the run may go on after a stage reported `candidate`.
    pub fn check_status(candidate: CommandStatus) -> bool {
        matches!(candidate, CommandStatus::Success | CommandStatus::Processing)
    }

    /// Runs the command to a terminal status.
    ///
    /// Calling this again after it finished returns the same status without
    /// running anything.
    pub async fn execute(&mut self) -> CommandStatus {
        if self.status.is_terminal() {
            tracing::warn!(id = self.configuration.id(), status = %self.status, "command already finished");
            return self.status;
        }

        let connection = self.topology.execution_connection().cloned();
        let usage = match &connection {
            Some(connection) => Some(connection.lock_usage().await),
            None => None,
        };

        tracing::info!(id = self.configuration.id(), kind = %self.kind(), "executing command");
        self.run().await;
        self.finish().await;
        drop(usage);

        // tunnelled connections go before the connection they run through
        for scoped in self.scoped_connections.drain(..).rev() {
            scoped.release().await;
        }
        tracing::info!(id = self.configuration.id(), status = %self.status, "command finished");
        self.status
    }

    async fn run(&mut self) {
        let candidate = self.validate();
        self.advance(candidate);
        if !Self::check_status(candidate) {
            return;
        }

        let candidate = match &self.topology {
            Topology::Local => self.stage_local_inputs().await,
            Topology::Remote { connection } => {
                let connection = connection.clone();
                self.stage_remote_inputs(None, &connection).await
            }
            Topology::MultiHop { jump, target } => {
                let (jump, target) = (jump.clone(), target.clone());
                self.stage_remote_inputs(Some(&jump), &target).await
            }
            Topology::RemoteTransfer { .. } => CommandStatus::Processing,
        };
        self.advance(candidate);
        if !Self::check_status(candidate) {
            return;
        }

        let candidate = match &self.topology {
            Topology::Local => self.launch_local().await,
            Topology::Remote { connection } | Topology::MultiHop { target: connection, .. } => {
                let connection = connection.clone();
                self.launch_remote(&connection).await
            }
            Topology::RemoteTransfer { connection, transfer } => {
                let (connection, transfer) = (connection.clone(), transfer.clone());
                self.launch_transfer(&connection, &transfer).await
            }
        };
        self.advance(candidate);
    }

    fn validate(&self) -> CommandStatus {
        let remote = self.configuration.is_remote();
        let result = match &self.topology {
            Topology::RemoteTransfer { transfer, .. } => transfer.validate(),
            Topology::Local if remote => Err("remote working directory set but no connection".to_string()),
            Topology::Remote { .. } | Topology::MultiHop { .. } if !remote => {
                Err("remote command without a remote working directory".to_string())
            }
            _ => self.configuration.validate().map_err(|err| err.to_string()),
        };
        match result {
            Ok(()) => CommandStatus::Processing,
            Err(reason) => {
                tracing::warn!(id = self.configuration.id(), "invalid configuration: {reason}");
                CommandStatus::InfoError
            }
        }
    }

    /// Moves toward `candidate`. A terminal status is never changed again.
    fn advance(&mut self, candidate: CommandStatus) {
        if self.status.is_terminal() {
            return;
        }
        if self.status != candidate {
            tracing::debug!(id = self.configuration.id(), from = %self.status, to = %candidate, "status change");
        }
        self.status = candidate;
    }

    /// Runs each `;`-separated stage of the invocation in `working_dir`,
    /// stopping at the first one that fails.
    async fn run_stages(&mut self, executor: &dyn Executor, working_dir: &str, windows: bool) -> CommandStatus {
        let stages = self.configuration.stages();
        if stages.is_empty() {
            return CommandStatus::InfoError;
        }

        for stage in stages {
            let (shell, flag) = if windows { ("cmd", "/C") } else { ("/bin/sh", "-c") };
            let mut process = ProcessConfiguration::new(shell);
            process
                .args([flag, stage.as_str()])
                .working_dir(working_dir)
                .redirect_stdout()
                .redirect_stderr();

            tracing::debug!(id = self.configuration.id(), %stage, working_dir, "launching stage");
            let output = match executor.execute(&process).await {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!(id = self.configuration.id(), %stage, "{err}");
                    self.std_error.push_str(&format!("{err}\n"));
                    return CommandStatus::Failed;
                }
            };
            self.std_output.push_str(&String::from_utf8_lossy(&output.stdout));
            self.std_error.push_str(&String::from_utf8_lossy(&output.stderr));

            if !output.succeeded() {
                tracing::warn!(id = self.configuration.id(), %stage, status_code = ?output.status_code, "stage failed");
                return CommandStatus::Failed;
            }
        }
        CommandStatus::Success
    }

    /// Writes the header and captured streams to the configured capture files in `directory`.
    async fn write_capture_files(&self, filesystem: &dyn Filesystem, directory: &Path, target_host: &str) -> io::Result<()> {
        let captures = [
            (self.configuration.std_out_file(), STD_OUT_LOG, &self.std_output),
            (self.configuration.std_err_file(), STD_ERR_LOG, &self.std_error),
        ];
        for (file_name, log_name, content) in captures {
            let Some(file_name) = file_name else {
                continue;
            };
            let path = directory.join(file_name);
            let mut file = filesystem
                .open_file(&path, &OpenOptions::new().write().create().truncate())
                .await?;
            file.write_all(self.configuration.output_header(log_name, target_host).as_bytes())
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.shutdown().await?;
            tracing::debug!(path = %path.display(), "wrote capture file");
        }
        Ok(())
    }

    async fn finish(&mut self) {
        match &self.topology {
            Topology::Remote { connection } | Topology::MultiHop { target: connection, .. } => {
                clean_remote_working_directory(connection).await;
            }
            Topology::Local | Topology::RemoteTransfer { .. } => {}
        }

        if !self.status.is_terminal() {
            return;
        }
        if let Some(handler) = &self.update_handler {
            let message = format!(
                "Job number {} on {} finished with status {}",
                self.configuration.id(),
                self.target_host(),
                self.status
            );
            // the status is final, a failed post only gets logged
            if let Err(err) = handler.post_update(&message).await {
                tracing::warn!(id = self.configuration.id(), "could not post update: {err}");
            }
        }
    }

    fn target_host(&self) -> String {
        match self.topology.execution_connection() {
            Some(connection) => connection.hostname().to_string(),
            None => local_hostname(),
        }
    }
}

async fn clean_remote_working_directory(connection: &Connection) {
    if !connection.configuration().deletes_working_directory() {
        return;
    }
    let Some(directory) = connection.take_working_directory() else {
        return;
    };
    tracing::info!(name = %connection.name(), %directory, "deleting remote working directory");
    if let Err(err) = connection.remove_dir_recursively(Path::new(&directory)).await {
        tracing::warn!(name = %connection.name(), %directory, "could not delete remote working directory: {err}");
    }
}
