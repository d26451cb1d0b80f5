use std::path::{Path, PathBuf};

use super::{Authorization, AuthorizationHandler, AuthorizationKind, Credential};

/// Authenticates with a private key file. Host and user are never derived
/// and must be set by the caller.
#[derive(Debug, Clone)]
pub struct KeyPathAuthorization {
    handle: Authorization,
}

impl KeyPathAuthorization {
    pub fn new(key_path: impl Into<PathBuf>) -> KeyPathAuthorization {
        KeyPathAuthorization {
            handle: Authorization::new(AuthorizationKind::KeyPath, Credential::KeyFile(key_path.into())),
        }
    }

    pub fn key_path(&self) -> &Path {
        match &self.handle.credential {
            Credential::KeyFile(path) => path,
            _ => Path::new(""),
        }
    }
}

impl AuthorizationHandler for KeyPathAuthorization {
    fn handle(&self) -> &Authorization {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut Authorization {
        &mut self.handle
    }
}
