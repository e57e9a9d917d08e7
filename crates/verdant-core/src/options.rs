//! Client configuration.
//!
//! Use the builder pattern for convenient configuration:
//!
//! ```
//! use std::time::Duration;
//! use verdant_core::ClientOptions;
//!
//! let options = ClientOptions::builder()
//!     .base_url("https://api.verdant.farm")
//!     .timeout(Duration::from_secs(5))
//!     .secure_cookies(true)
//!     .build();
//! assert!(options.validate().is_ok());
//! ```

use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable holding the access-token signing secret.
pub const JWT_SECRET_ENV: &str = "ACCESS_JWT_SECRET";

/// Secret used when [`JWT_SECRET_ENV`] is not set.
pub const DEFAULT_JWT_SECRET: &str = "verdant-secret";

/// Backend used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Namespace of the real-time metrics channel.
pub const DEFAULT_NAMESPACE: &str = "/cells";

/// Live series capacity.
pub const DEFAULT_BUFFER_CAPACITY: usize = 300;

/// Options shared by the API client, auth relay and real-time channel.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Backend base URL, without trailing slash.
    /// Default: `http://localhost:8000`.
    pub base_url: String,
    /// Per-request HTTP timeout.
    /// Default: 10 seconds.
    pub timeout: Duration,
    /// HS256 secret used to verify access tokens locally.
    pub jwt_secret: String,
    /// Whether session cookies are marked `Secure` (production).
    pub secure_cookies: bool,
    /// Socket.IO namespace carrying `metrics` events.
    pub namespace: String,
    /// Maximum number of live entries kept by the metrics view-model.
    pub buffer_capacity: usize,
    /// How long to wait for a subscription acknowledgment.
    pub ack_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(10),
            jwt_secret: std::env::var(JWT_SECRET_ENV)
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_JWT_SECRET.to_string()),
            secure_cookies: false,
            namespace: DEFAULT_NAMESPACE.to_string(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            ack_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientOptions {
    /// Create a new builder for ClientOptions.
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }

    /// Options pointing at a specific backend.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Base URL with any trailing slash removed.
    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - `base_url` is an http(s) URL
    /// - `timeout` and `ack_timeout` are > 0
    /// - `namespace` starts with `/`
    /// - `buffer_capacity` is > 0
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(self.normalized_base_url())
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidUrl(format!(
                "{}: scheme must be http or https",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::invalid_config("timeout must be > 0"));
        }
        if self.ack_timeout.is_zero() {
            return Err(Error::invalid_config("ack_timeout must be > 0"));
        }
        if !self.namespace.starts_with('/') {
            return Err(Error::invalid_config("namespace must start with '/'"));
        }
        if self.buffer_capacity == 0 {
            return Err(Error::invalid_config("buffer_capacity must be > 0"));
        }
        Ok(())
    }
}

/// Builder for ClientOptions.
#[derive(Debug, Clone, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    /// Set the backend base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.options.base_url = url.into();
        self
    }

    /// Set the HTTP request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    /// Set the access-token secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.options.jwt_secret = secret.into();
        self
    }

    /// Mark session cookies `Secure`.
    #[must_use]
    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.options.secure_cookies = secure;
        self
    }

    /// Set the real-time namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.options.namespace = namespace.into();
        self
    }

    /// Set the live buffer capacity.
    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.buffer_capacity = capacity;
        self
    }

    /// Set the subscription acknowledgment timeout.
    #[must_use]
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.options.ack_timeout = timeout;
        self
    }

    /// Build the options.
    #[must_use]
    pub fn build(self) -> ClientOptions {
        self.options
    }

    /// Build and validate the options.
    pub fn build_validated(self) -> Result<ClientOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ClientOptions::default();
        assert_eq!(options.base_url, "http://localhost:8000");
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.namespace, "/cells");
        assert_eq!(options.buffer_capacity, 300);
        assert!(!options.secure_cookies);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = ClientOptions::builder()
            .base_url("https://api.example.com/")
            .jwt_secret("s3cret")
            .buffer_capacity(50)
            .build();
        assert_eq!(options.normalized_base_url(), "https://api.example.com");
        assert_eq!(options.jwt_secret, "s3cret");
        assert_eq!(options.buffer_capacity, 50);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_scheme = ClientOptions::with_base_url("ftp://example.com");
        assert!(matches!(bad_scheme.validate(), Err(Error::InvalidUrl(_))));

        let not_a_url = ClientOptions::with_base_url("not a url");
        assert!(matches!(not_a_url.validate(), Err(Error::InvalidUrl(_))));

        let zero_capacity = ClientOptions::builder().buffer_capacity(0).build();
        assert!(matches!(
            zero_capacity.validate(),
            Err(Error::InvalidConfig(_))
        ));

        let bad_namespace = ClientOptions::builder().namespace("cells").build_validated();
        assert!(bad_namespace.is_err());

        let zero_timeout = ClientOptions::builder().timeout(Duration::ZERO).build();
        assert!(zero_timeout.validate().is_err());
    }
}
