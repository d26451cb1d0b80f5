//! Credential sources used to open connections.
//!
//! Every strategy produces an [`Authorization`]: host, user, port and a
//! [`Credential`]. Strategies are picked by a string key through
//! [`AuthorizationFactory::get_handler`].

mod key_path;
mod local;
mod text_file;

use std::{fmt, path::PathBuf, str::FromStr};

use thiserror::Error;

pub use key_path::KeyPathAuthorization;
pub(crate) use local::local_hostname;
pub use local::LocalAuthorization;
pub use text_file::TextFileAuthorization;

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("unknown authorization kind '{0}'")]
    UnknownKind(String),
    #[error("the {0} authorization needs an option")]
    MissingOption(AuthorizationKind),
    /// The credential file is missing, unreadable or malformed.
    #[error("could not parse credential file {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },
    #[error("authorization has an empty {0}")]
    Incomplete(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorizationKind {
    Local,
    TextFile,
    KeyPath,
}

impl AuthorizationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthorizationKind::Local => "local",
            AuthorizationKind::TextFile => "text",
            AuthorizationKind::KeyPath => "keypath",
        }
    }
}

impl fmt::Display for AuthorizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorizationKind {
    type Err = AuthorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(AuthorizationKind::Local),
            "text" | "text-file" | "textfile" => Ok(AuthorizationKind::TextFile),
            "keypath" | "key-path" => Ok(AuthorizationKind::KeyPath),
            _ => Err(AuthorizationError::UnknownKind(s.to_string())),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// No secret, used for local execution.
    None,
    Password(String),
    /// Path to a private key file.
    KeyFile(PathBuf),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::None => f.write_str("None"),
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
        }
    }
}

/// A resolved credential set, attached to a connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub(crate) kind: AuthorizationKind,
    pub(crate) hostname: String,
    pub(crate) username: String,
    pub(crate) port: u16,
    pub(crate) credential: Credential,
}

impl Authorization {
    pub fn new(kind: AuthorizationKind, credential: Credential) -> Authorization {
        Authorization {
            kind,
            hostname: String::new(),
            username: String::new(),
            port: DEFAULT_SSH_PORT,
            credential,
        }
    }

    pub fn kind(&self) -> AuthorizationKind {
        self.kind
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Host and user must both be set before a connection can be opened.
    pub fn validate(&self) -> Result<(), AuthorizationError> {
        if self.hostname.trim().is_empty() {
            return Err(AuthorizationError::Incomplete("hostname"));
        }
        if self.username.trim().is_empty() {
            return Err(AuthorizationError::Incomplete("username"));
        }
        Ok(())
    }
}

/// A source of credentials. Derived values can be overridden before the
/// resulting [`Authorization`] is attached to a connection configuration.
pub trait AuthorizationHandler: fmt::Debug + Send + Sync {
    fn handle(&self) -> &Authorization;

    fn handle_mut(&mut self) -> &mut Authorization;

    fn kind(&self) -> AuthorizationKind {
        self.handle().kind
    }

    fn hostname(&self) -> &str {
        &self.handle().hostname
    }

    fn username(&self) -> &str {
        &self.handle().username
    }

    fn port(&self) -> u16 {
        self.handle().port
    }

    fn set_hostname(&mut self, hostname: String) {
        self.handle_mut().hostname = hostname;
    }

    fn set_username(&mut self, username: String) {
        self.handle_mut().username = username;
    }

    fn set_port(&mut self, port: u16) {
        self.handle_mut().port = port;
    }

    fn authorization(&self) -> Authorization {
        self.handle().clone()
    }
}

pub struct AuthorizationFactory;

impl AuthorizationFactory {
    /// Builds a strategy for `kind`. The option is the credential file for
    /// `text` and the private key path for `keypath`; `local` ignores it.
    pub fn get_handler(
        kind: &str,
        option: Option<&str>,
    ) -> Result<Box<dyn AuthorizationHandler>, AuthorizationError> {
        let kind: AuthorizationKind = kind.parse()?;
        tracing::debug!(%kind, "creating authorization handler");
        match kind {
            AuthorizationKind::Local => Ok(Box::new(LocalAuthorization::new())),
            AuthorizationKind::TextFile => match option {
                Some(path) => Ok(Box::new(TextFileAuthorization::from_file(path)?)),
                None => Ok(Box::new(TextFileAuthorization::new())),
            },
            AuthorizationKind::KeyPath => {
                let path = option.ok_or(AuthorizationError::MissingOption(kind))?;
                Ok(Box::new(KeyPathAuthorization::new(path)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{AuthorizationError, AuthorizationFactory, AuthorizationKind, Credential};

    #[test]
    fn factory_selects_strategy_by_key() {
        let local = AuthorizationFactory::get_handler("local", None).unwrap();
        assert_eq!(local.kind(), AuthorizationKind::Local);

        let key = AuthorizationFactory::get_handler("keypath", Some("/home/user/.ssh/id_ed25519")).unwrap();
        assert_eq!(key.kind(), AuthorizationKind::KeyPath);
        assert_eq!(
            key.authorization().credential,
            Credential::KeyFile("/home/user/.ssh/id_ed25519".into())
        );

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "user\nsecret\nhost.example.org").unwrap();
        let text = AuthorizationFactory::get_handler("text", file.path().to_str()).unwrap();
        assert_eq!(text.kind(), AuthorizationKind::TextFile);
        assert_eq!(text.hostname(), "host.example.org");
    }

    #[test]
    fn factory_rejects_unknown_kind() {
        let result = AuthorizationFactory::get_handler("kerberos", None);
        assert!(matches!(result, Err(AuthorizationError::UnknownKind(kind)) if kind == "kerberos"));
    }

    #[test]
    fn keypath_needs_a_key() {
        let result = AuthorizationFactory::get_handler("keypath", None);
        assert!(matches!(
            result,
            Err(AuthorizationError::MissingOption(AuthorizationKind::KeyPath))
        ));
    }

    #[test]
    fn setters_override_derived_values() {
        let mut handler = AuthorizationFactory::get_handler("keypath", Some("/tmp/key")).unwrap();
        assert!(handler.authorization().validate().is_err());
        handler.set_hostname("jump.example.org".into());
        handler.set_username("ops".into());
        handler.set_port(2222);
        let authorization = handler.authorization();
        assert!(authorization.validate().is_ok());
        assert_eq!(authorization.port(), 2222);
    }

    #[test]
    fn password_is_redacted_in_debug_output() {
        let formatted = format!("{:?}", Credential::Password("hunter2".into()));
        assert!(!formatted.contains("hunter2"));
    }
}
