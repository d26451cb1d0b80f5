use std::{io, time::Duration};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};

use super::{UpdateError, UpdateHandler};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts the message as a `text/plain` body to a fixed address.
#[derive(Debug, Clone)]
pub struct HttpUpdateHandler {
    url: String,
    timeout: Duration,
}

impl HttpUpdateHandler {
    pub fn new(url: impl Into<String>) -> HttpUpdateHandler {
        HttpUpdateHandler {
            url: url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, message: &str) -> Result<(), UpdateError> {
        if self.url.is_empty() {
            return Err(UpdateError::Incomplete("url"));
        }
        let client = Client::builder().timeout(self.timeout).build()?;
        let response = client
            .post(&self.url)
            .header(CONTENT_TYPE, "text/plain")
            .body(message.to_string())
            .send()
            .await?;
        response.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl UpdateHandler for HttpUpdateHandler {
    async fn post_update(&self, message: &str) -> io::Result<()> {
        tracing::debug!(url = %self.url, "posting update");
        self.post(message).await.map_err(io::Error::from)
    }
}
