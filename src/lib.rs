//! Runs a configured job on the local machine or on remote hosts reached
//! over SSH, staging its inputs and reporting one terminal status.

pub mod authorization;
pub mod browser;
pub mod command;
pub mod configuration;
pub mod derive_ext;
pub mod executor;
pub mod file_handler;
pub mod filesystem;
pub mod manager;
pub mod native;
pub mod ssh;
pub mod status;
pub mod update;

pub use authorization::{AuthorizationFactory, AuthorizationHandler};
pub use browser::RemoteBrowser;
pub use command::{Command, CommandFactory, CommandKind};
pub use configuration::CommandConfiguration;
pub use file_handler::FileHandler;
pub use manager::{ConnectionManager, ScopedConnection};
pub use ssh::{Connection, ConnectionConfiguration, ConnectionError, ManagerOptions};
pub use status::CommandStatus;
pub use update::UpdateHandler;
