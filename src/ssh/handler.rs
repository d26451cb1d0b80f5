use std::path::{Path, PathBuf};

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

use super::ConnectionError;

/// Checks server keys against a `known_hosts` file.
pub(crate) struct HostKeyVerifier {
    host: String,
    port: u16,
    known_hosts: PathBuf,
    strict: bool,
}

impl HostKeyVerifier {
    pub(crate) fn new(host: String, port: u16, known_hosts: PathBuf, strict: bool) -> HostKeyVerifier {
        HostKeyVerifier {
            host,
            port,
            known_hosts,
            strict,
        }
    }
}

#[async_trait]
impl client::Handler for HostKeyVerifier {
    type Error = ConnectionError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        verify_host_key(&self.host, self.port, server_public_key, &self.known_hosts, self.strict)?;
        Ok(true)
    }
}

/// Accepts a key recorded for the host. Unknown hosts are learned only when
/// `strict` is off; a key that differs from the recorded one is always an error.
pub(crate) fn verify_host_key(
    host: &str,
    port: u16,
    key: &PublicKey,
    known_hosts: &Path,
    strict: bool,
) -> Result<(), ConnectionError> {
    let failure = |reason: String| ConnectionError::HostVerification {
        host: host.to_string(),
        reason,
    };

    match russh_keys::check_known_hosts_path(host, port, key, known_hosts) {
        Ok(true) => Ok(()),
        Ok(false) if strict => Err(failure(format!("no entry in {}", known_hosts.display()))),
        Ok(false) => {
            tracing::warn!(host, port, known_hosts = %known_hosts.display(), "learning unknown host key");
            russh_keys::learn_known_hosts_path(host, port, key, known_hosts)
                .map_err(|err| failure(format!("could not record key: {err}")))
        }
        Err(russh_keys::Error::KeyChanged { line }) => Err(failure(format!(
            "key does not match line {line} of {}",
            known_hosts.display()
        ))),
        Err(err) => Err(failure(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use russh_keys::key::KeyPair;

    use super::verify_host_key;
    use crate::ssh::ConnectionError;

    fn public_key() -> russh_keys::key::PublicKey {
        KeyPair::generate_ed25519()
            .expect("key generation failed")
            .clone_public_key()
            .expect("public key unavailable")
    }

    #[test]
    fn strict_mode_rejects_unknown_host() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = dir.path().join("known_hosts");
        let result = verify_host_key("example.org", 22, &public_key(), &known_hosts, true);
        assert!(matches!(result, Err(ConnectionError::HostVerification { .. })));
    }

    #[test]
    fn lenient_mode_learns_then_accepts() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = dir.path().join("known_hosts");
        let key = public_key();

        verify_host_key("example.org", 2222, &key, &known_hosts, false).expect("first contact failed");
        assert!(known_hosts.exists());
        verify_host_key("example.org", 2222, &key, &known_hosts, true).expect("learned key was not accepted");
    }

    #[test]
    fn changed_key_is_rejected_even_when_lenient() {
        let dir = tempfile::tempdir().unwrap();
        let known_hosts = dir.path().join("known_hosts");

        verify_host_key("example.org", 22, &public_key(), &known_hosts, false).unwrap();
        let result = verify_host_key("example.org", 22, &public_key(), &known_hosts, false);
        assert!(matches!(result, Err(ConnectionError::HostVerification { .. })));
    }
}
