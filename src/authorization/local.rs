use nix::unistd::{gethostname, getuid, User};

use super::{Authorization, AuthorizationHandler, AuthorizationKind, Credential};

/// Takes host and user from the machine the process runs on. Carries no secret.
#[derive(Debug, Clone)]
pub struct LocalAuthorization {
    handle: Authorization,
}

impl LocalAuthorization {
    pub fn new() -> LocalAuthorization {
        let mut handle = Authorization::new(AuthorizationKind::Local, Credential::None);
        handle.hostname = local_hostname();
        handle.username = local_username();
        LocalAuthorization { handle }
    }
}

impl Default for LocalAuthorization {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationHandler for LocalAuthorization {
    fn handle(&self) -> &Authorization {
        &self.handle
    }

    fn handle_mut(&mut self) -> &mut Authorization {
        &mut self.handle
    }
}

pub(crate) fn local_hostname() -> String {
    match gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            tracing::warn!(%err, "could not determine the local host name");
            String::from("localhost")
        }
    }
}

fn local_username() -> String {
    if let Ok(user) = std::env::var("USER") {
        if !user.is_empty() {
            return user;
        }
    }
    match User::from_uid(getuid()) {
        Ok(Some(user)) => user.name,
        Ok(None) => String::new(),
        Err(err) => {
            tracing::warn!(%err, "could not determine the local user name");
            String::new()
        }
    }
}
