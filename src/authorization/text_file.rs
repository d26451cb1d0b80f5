use std::path::{Path, PathBuf};

use super::{Authorization, AuthorizationError, AuthorizationHandler, AuthorizationKind, Credential};

/// Reads `username secret hostname` from a plain text file. Any whitespace,
/// newlines included, separates the three tokens.
#[derive(Debug, Clone)]
pub struct TextFileAuthorization {
    handle: Authorization,
    path: Option<PathBuf>,
}

impl TextFileAuthorization {
    /// An empty handler whose values are all set by the caller.
    pub fn new() -> TextFileAuthorization {
        TextFileAuthorization {
            handle: Authorization::new(AuthorizationKind::TextFile, Credential::None),
            path: None,
        }
    }

    /// Fails with [`AuthorizationError::Parse`] when the file cannot be read
    /// or does not hold exactly three tokens.
    pub fn from_file(path: impl AsRef<Path>) -> Result<TextFileAuthorization, AuthorizationError> {
        let path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&path).map_err(|err| AuthorizationError::Parse {
            path: path.clone(),
            reason: err.to_string(),
        })?;

        let tokens: Vec<&str> = content.split_whitespace().collect();
        let [username, secret, hostname] = tokens.as_slice() else {
            return Err(AuthorizationError::Parse {
                path,
                reason: format!("expected username, secret and hostname, found {} token(s)", tokens.len()),
            });
        };

        let mut handle = Authorization::new(AuthorizationKind::TextFile, Credential::Password(secret.to_string()));
        handle.username = username.to_string();
        handle.hostname = hostname.to_string();
        tracing::debug!(?path, host = %handle.hostname, user = %handle.username, "read credential file");

        Ok(TextFileAuthorization {
            handle,
            path: Some(path),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_password(&mut self, password: String) {
        self.handle.credential = Credential::Password(password);
    }

    pub(crate) fn password(&self) -> Option<&str> {
        match &self.handle.credential {
            Credential::Password(password) => Some(password),
            _ => None,
        }
    }
}

impl Default for TextFileAuthorization {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationHandler for TextFileAuthorization {
    fn handle(&self) -> &Authorization {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut Authorization {
        &mut self.handle
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::authorization::{AuthorizationError, AuthorizationHandler, Credential};

    use super::TextFileAuthorization;

    fn credential_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_tokens_in_order() {
        let file = credential_file("alice s3cret compute.example.org\n");
        let handler = TextFileAuthorization::from_file(file.path()).unwrap();
        assert_eq!(handler.username(), "alice");
        assert_eq!(handler.hostname(), "compute.example.org");
        assert_eq!(handler.password(), Some("s3cret"));
        assert_eq!(
            handler.authorization().credential,
            Credential::Password("s3cret".into())
        );
    }

    #[test]
    fn newlines_separate_tokens_too() {
        let file = credential_file("alice\n  s3cret\r\n\tcompute\n\n");
        let handler = TextFileAuthorization::from_file(file.path()).unwrap();
        assert_eq!(handler.hostname(), "compute");
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let result = TextFileAuthorization::from_file("/nonexistent/creds.txt");
        assert!(matches!(result, Err(AuthorizationError::Parse { .. })));
    }

    #[test]
    fn too_few_tokens_is_a_parse_error() {
        let file = credential_file("alice s3cret");
        let result = TextFileAuthorization::from_file(file.path());
        let Err(AuthorizationError::Parse { reason, .. }) = result else {
            panic!("expected a parse error");
        };
        assert!(reason.ends_with("found 2 token(s)"));
    }

    #[test]
    fn too_many_tokens_is_a_parse_error() {
        let file = credential_file("alice s3cret host extra");
        let result = TextFileAuthorization::from_file(file.path());
        let Err(AuthorizationError::Parse { reason, .. }) = result else {
            panic!("expected a parse error");
        };
        assert!(reason.ends_with("found 4 token(s)"));
    }
}
