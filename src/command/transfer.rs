use std::{path::Path, sync::Arc};

use super::Command;
use crate::{
    authorization::{Authorization, AuthorizationKind, Credential},
    derive_ext::quote,
    executor::{Executor, ProcessConfiguration},
    filesystem::Filesystem,
    ssh::Connection,
    status::CommandStatus,
};

/// A copy from a path on the intermediate host to a path on another host,
/// authenticated with a key the intermediate host holds.
#[derive(Debug, Clone)]
pub struct RemoteTransfer {
    source: String,
    destination: String,
    destination_authorization: Authorization,
}

impl RemoteTransfer {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        destination_authorization: Authorization,
    ) -> RemoteTransfer {
        RemoteTransfer {
            source: source.into(),
            destination: destination.into(),
            destination_authorization,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        let authorization = &self.destination_authorization;
        if authorization.kind() != AuthorizationKind::KeyPath {
            return Err(format!(
                "remote transfers need a {} authorization, got {}",
                AuthorizationKind::KeyPath,
                authorization.kind()
            ));
        }
        authorization.validate().map_err(|err| err.to_string())?;
        if self.source.is_empty() || self.destination.is_empty() {
            return Err("remote transfers need a source and a destination".to_string());
        }
        Ok(())
    }

    /// The secure copy invocation run on the intermediate host.
    pub fn invocation(&self) -> String {
        let authorization = &self.destination_authorization;
        let mut invocation = String::from("scp -o BatchMode=yes");
        if let Credential::KeyFile(key) = authorization.credential() {
            invocation.push_str(" -i ");
            invocation.push_str(&quote(&key.to_string_lossy()));
        }
        invocation.push_str(&format!(" -P {}", authorization.port()));
        invocation.push(' ');
        invocation.push_str(&quote(&self.source));
        invocation.push(' ');
        invocation.push_str(&quote(&format!(
            "{}@{}:{}",
            authorization.username(),
            authorization.hostname(),
            self.destination
        )));
        invocation
    }
}

impl Command {
    pub(super) async fn launch_transfer(&mut self, connection: &Arc<Connection>, transfer: &RemoteTransfer) -> CommandStatus {
        match connection.exists(Path::new(transfer.source())).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(name = %connection.name(), source = %transfer.source(), "transfer source does not exist");
                return CommandStatus::Failed;
            }
            Err(err) => {
                tracing::warn!(name = %connection.name(), source = %transfer.source(), "cannot inspect transfer source: {err}");
                return CommandStatus::Failed;
            }
        }

        let mut process = ProcessConfiguration::new("/bin/sh");
        process
            .arg("-c")
            .arg(transfer.invocation())
            .redirect_stdout()
            .redirect_stderr();
        tracing::debug!(name = %connection.name(), destination = %transfer.destination(), "running remote transfer");

        let output = match connection.execute(&process).await {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(name = %connection.name(), "could not launch transfer: {err}");
                return CommandStatus::Failed;
            }
        };
        self.std_output.push_str(&String::from_utf8_lossy(&output.stdout));
        self.std_error.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.succeeded() {
            CommandStatus::Success
        } else {
            tracing::warn!(name = %connection.name(), status_code = ?output.status_code, "transfer failed");
            CommandStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RemoteTransfer;
    use crate::authorization::{AuthorizationHandler, KeyPathAuthorization, TextFileAuthorization};

    fn key_authorization() -> KeyPathAuthorization {
        let mut handler = KeyPathAuthorization::new("/home/me/.ssh/id ed25519");
        handler.set_hostname("dest.example.org".into());
        handler.set_username("me".into());
        handler.set_port(2222);
        handler
    }

    #[test]
    fn composes_secure_copy() {
        let transfer = RemoteTransfer::new("/data/out.txt", "/incoming/", key_authorization().authorization());
        let invocation = transfer.invocation();
        assert!(invocation.starts_with("scp -o BatchMode=yes -i '/home/me/.ssh/id ed25519' -P 2222 /data/out.txt "));
        assert!(invocation.contains("me@dest.example.org:/incoming/"));
        assert!(transfer.validate().is_ok());
    }

    #[test]
    fn password_authorization_is_rejected() {
        let mut handler = TextFileAuthorization::new();
        handler.set_hostname("dest".into());
        handler.set_username("me".into());
        let transfer = RemoteTransfer::new("/a", "/b", handler.authorization());
        assert!(transfer.validate().is_err());
    }

    #[test]
    fn key_authorization_needs_host_and_user() {
        let handler = KeyPathAuthorization::new("/key");
        let transfer = RemoteTransfer::new("/a", "/b", handler.authorization());
        assert!(transfer.validate().is_err());
    }
}
