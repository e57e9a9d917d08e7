//! HTTP client for the Verdant backend REST API.
//!
//! Every request carries `Authorization: Bearer <accessToken>` taken from the
//! session store. A `401` triggers exactly one refresh through the
//! [`AuthRelay`](crate::auth::AuthRelay) followed by one retry.
//!
//! Resource operations live in sibling modules as further `impl ApiClient`
//! blocks: [`warehouses`](crate::warehouses), [`cells`](crate::cells),
//! [`users`](crate::users) and [`history`](crate::history).
//!
//! # Example
//!
//! ```no_run
//! use verdant_core::{ApiClient, ClientOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::in_memory(ClientOptions::default())?;
//! for warehouse in client.list_warehouses().await? {
//!     println!("{} ({} cells)", warehouse.name, warehouse.capacity);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::auth::AuthRelay;
use crate::error::{Error, Result};
use crate::options::ClientOptions;
use crate::session::{ACCESS_TOKEN_COOKIE, MemorySessionStore, SessionStore};
use crate::token::TokenVerifier;

/// HTTP client for the Verdant API.
///
/// Cheap to clone; clones share the connection pool and session store.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    options: Arc<ClientOptions>,
    session: Arc<dyn SessionStore>,
    verifier: TokenVerifier,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client using `session` for token storage.
    pub fn new(options: ClientOptions, session: Arc<dyn SessionStore>) -> Result<Self> {
        options.validate()?;
        let http = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(Error::Request)?;
        Self::with_client(options, session, http)
    }

    /// Create a client with an in-memory session.
    pub fn in_memory(options: ClientOptions) -> Result<Self> {
        Self::new(options, Arc::new(MemorySessionStore::new()))
    }

    /// Create a client with a custom reqwest Client.
    pub fn with_client(
        options: ClientOptions,
        session: Arc<dyn SessionStore>,
        http: Client,
    ) -> Result<Self> {
        options.validate()?;
        let base_url = options.normalized_base_url().to_string();
        let verifier = TokenVerifier::new(options.jwt_secret.as_bytes());
        Ok(Self {
            http,
            base_url,
            options: Arc::new(options),
            session,
            verifier,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn session(&self) -> &Arc<dyn SessionStore> {
        &self.session
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Auth operations sharing this client's session.
    pub fn auth(&self) -> AuthRelay {
        AuthRelay::new(self.clone())
    }

    /// Current access token, if the session holds a live one.
    pub fn access_token(&self) -> Option<String> {
        self.session.value(ACCESS_TOKEN_COOKIE)
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request built by `build`, authenticated with the session's
    /// bearer token.
    ///
    /// On `401` the session is refreshed once and, if that succeeded, the
    /// request is rebuilt and sent once more. The second response is returned
    /// whatever its status.
    pub async fn authenticated_send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let response = self.send_with_bearer(&build).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("Request unauthorized, attempting one token refresh");
        if !self.auth().refresh().await {
            return Ok(response);
        }
        self.send_with_bearer(&build).await
    }

    async fn send_with_bearer<F>(&self, build: &F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut request = build(&self.http);
        if let Some(token) = self.access_token() {
            request = request.bearer_auth(token);
        }
        request.send().await.map_err(|e| Error::NotReachable {
            url: self.base_url.clone(),
            source: e,
        })
    }

    // ======================================================================
    // Internal HTTP helpers
    // ======================================================================

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        fallback: &str,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.authenticated_send(|http| http.get(&url)).await?;
        handle_response(response, fallback).await
    }

    pub(crate) async fn get_json_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &str,
        query: &Q,
        fallback: &str,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self
            .authenticated_send(|http| http.get(&url).query(query))
            .await?;
        handle_response(response, fallback).await
    }

    pub(crate) async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<T> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .authenticated_send(|http| http.post(&url).json(body))
            .await?;
        handle_response(response, fallback).await
    }

    /// POST where only the status matters.
    pub(crate) async fn post_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<()> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self
            .authenticated_send(|http| http.post(&url).json(body))
            .await?;
        check_status(response, fallback).await
    }

    pub(crate) async fn patch_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<()> {
        let url = self.url(path);
        debug!("PATCH {}", url);
        let response = self
            .authenticated_send(|http| http.patch(&url).json(body))
            .await?;
        check_status(response, fallback).await
    }

    pub(crate) async fn put_unit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        fallback: &str,
    ) -> Result<()> {
        let url = self.url(path);
        debug!("PUT {}", url);
        let response = self
            .authenticated_send(|http| http.put(&url).json(body))
            .await?;
        check_status(response, fallback).await
    }

    /// DELETE accepting any 2xx.
    pub(crate) async fn delete(&self, path: &str, fallback: &str) -> Result<()> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        let response = self.authenticated_send(|http| http.delete(&url)).await?;
        check_status(response, fallback).await
    }
}

/// Decode a successful JSON body, or turn the failure into [`Error::Api`].
pub(crate) async fn handle_response<T: DeserializeOwned>(
    response: Response,
    fallback: &str,
) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        response.json().await.map_err(Error::Request)
    } else {
        Err(api_error(response, fallback).await)
    }
}

/// Succeed on any 2xx, ignoring the body.
pub(crate) async fn check_status(response: Response, fallback: &str) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(api_error(response, fallback).await)
    }
}

async fn api_error(response: Response, fallback: &str) -> Error {
    let status = response.status().as_u16();
    let body = response.json::<serde_json::Value>().await.ok();
    let message = body
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| fallback.to_string());
    debug!("API error {}: {}", status, message);
    Error::Api { status, message }
}

/// Backend error text from `detail`, `message` or `error`.
fn error_message(body: &serde_json::Value) -> Option<String> {
    ["detail", "message", "error"].iter().find_map(|key| {
        match body.get(*key)? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }
            _ => None,
        }
    })
}
