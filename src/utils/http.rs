//! HTTP client utilities.

use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Browser user agent; Google Scholar rejects obvious bot agents outright
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Shared HTTP client with sensible defaults
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Create a new HTTP client with a browser user agent
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_user_agent(BROWSER_USER_AGENT)
    }

    /// Create a new HTTP client with a custom user agent
    pub fn with_user_agent(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Start a GET request
    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url)
    }
}
