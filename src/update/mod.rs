//! Observers told about a command's terminal status.

#[cfg(feature = "update-mail")]
mod email;
#[cfg(feature = "update-http")]
mod http;

use std::io;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "update-mail")]
pub use email::EmailUpdateHandler;
#[cfg(feature = "update-http")]
pub use http::HttpUpdateHandler;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[cfg(feature = "update-http")]
    #[error("http update failed")]
    Http(#[from] reqwest::Error),
    #[cfg(feature = "update-mail")]
    #[error("invalid mail address {address}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[cfg(feature = "update-mail")]
    #[error("could not build mail message")]
    Message(#[from] lettre::error::Error),
    #[cfg(feature = "update-mail")]
    #[error("smtp relay failure")]
    Smtp(#[from] lettre::transport::smtp::Error),
    #[error("the update handler is missing its {0}")]
    Incomplete(&'static str),
}

impl From<UpdateError> for io::Error {
    fn from(value: UpdateError) -> Self {
        match value {
            UpdateError::Incomplete(_) => io::Error::new(io::ErrorKind::InvalidInput, value),
            _ => io::Error::other(value),
        }
    }
}

/// Receives a message when a command finishes.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    /// A single attempt; failures are reported, never retried.
    async fn post_update(&self, message: &str) -> io::Result<()>;
}
