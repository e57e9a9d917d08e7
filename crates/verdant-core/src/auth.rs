//! Authentication relay.
//!
//! The backend owns authentication. This module exchanges credentials for
//! tokens, keeps them as session cookies, verifies the access token locally
//! and refreshes it when it no longer verifies.
//!
//! Session lookups never fail loudly: [`AuthRelay::get_auth`] collapses any
//! network or verification problem into an unauthenticated [`AuthState`].

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::Response;
use serde::Deserialize;
use tracing::{debug, info, warn};

use verdant_types::{Claims, Credentials, Registration};

use crate::client::{ApiClient, check_status};
use crate::error::{Error, Result};
use crate::session::{
    ACCESS_TOKEN_COOKIE, CSRF_COOKIE, REFRESH_TOKEN_COOKIE, SessionCookie, extract_cookie,
};
use crate::token::decode_unverified;

/// Outcome of a session lookup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub is_auth: bool,
    pub payload: Option<Claims>,
}

impl AuthState {
    pub fn authenticated(claims: Claims) -> Self {
        Self {
            is_auth: true,
            payload: Some(claims),
        }
    }

    pub fn unauthenticated() -> Self {
        Self::default()
    }

    /// Whether the session belongs to an admin.
    pub fn is_admin(&self) -> bool {
        self.payload.as_ref().is_some_and(Claims::is_admin)
    }
}

/// Successful sign-in.
#[derive(Debug, Clone)]
pub struct LoginSession {
    /// The new access token.
    pub access: String,
    /// Claims decoded from the access token, for display only.
    pub claims: Option<Claims>,
}

/// What the route guard decided for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// Render the page.
    Allow,
    /// Send the user elsewhere.
    Redirect(&'static str),
}

/// Landing page for signed-in users.
pub const DASHBOARD_ROUTE: &str = "/dashboard";
/// Sign-in page.
pub const SIGN_IN_ROUTE: &str = "/auth/sign-in";
/// Logout page, used to bounce non-admins out of admin pages.
pub const LOGOUT_ROUTE: &str = "/auth/logout";

/// Route guard applied to every page.
///
/// - `/auth*` while signed in goes to the dashboard
/// - `/dashboard*` while signed out goes to sign-in
/// - `/admin*` without the admin role goes to logout
pub fn route_decision(path: &str, auth: &AuthState) -> RouteDecision {
    if path.starts_with("/auth") && auth.is_auth {
        return RouteDecision::Redirect(DASHBOARD_ROUTE);
    }
    if path.starts_with("/dashboard") && !auth.is_auth {
        return RouteDecision::Redirect(SIGN_IN_ROUTE);
    }
    if path.starts_with("/admin") && !auth.is_admin() {
        return RouteDecision::Redirect(LOGOUT_ROUTE);
    }
    RouteDecision::Allow
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(alias = "accessToken")]
    access: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(rename = "accessToken", alias = "access")]
    access_token: String,
}

/// Login, refresh and logout against the backend's `/auth` endpoints.
#[derive(Debug, Clone)]
pub struct AuthRelay {
    client: ApiClient,
}

impl AuthRelay {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Exchange credentials for a session.
    ///
    /// Stores the access token from the body and the refresh token from
    /// `Set-Cookie`.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginSession> {
        let url = self.client.url("/auth/login");
        debug!("POST {}", url);
        let response = self
            .client
            .http()
            .post(&url)
            .json(credentials)
            .send()
            .await
            .map_err(|e| Error::NotReachable {
                url: self.client.base_url().to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(Error::api(response.status().as_u16(), "couldn't login"));
        }

        self.store_refresh_cookie(&response)?;
        let body: LoginResponse = response
            .json()
            .await
            .map_err(|_| Error::api(200, "couldn't login"))?;
        self.store_access_token(&body.access)?;

        info!("Signed in as {}", credentials.email);
        Ok(LoginSession {
            claims: decode_unverified(&body.access).ok(),
            access: body.access,
        })
    }

    /// Validate the form locally, then create an owner account.
    pub async fn register(&self, registration: &Registration) -> Result<()> {
        registration.validate()?;

        let url = self.client.url("/auth/register");
        debug!("POST {}", url);
        let response = self
            .client
            .http()
            .post(&url)
            .json(&registration.to_request())
            .send()
            .await
            .map_err(|e| Error::NotReachable {
                url: self.client.base_url().to_string(),
                source: e,
            })?;
        check_status(response, "couldn't register").await?;

        info!("Registered {}", registration.email);
        Ok(())
    }

    /// Trade the refresh token for a new access token.
    ///
    /// Returns `false` when there is no refresh token or the backend refuses
    /// it; in the latter case the session is cleared.
    pub async fn refresh(&self) -> bool {
        let Some(refresh_cookie) = self.client.session().get(REFRESH_TOKEN_COOKIE) else {
            debug!("No refresh token in session");
            return false;
        };

        match self.try_refresh(&refresh_cookie).await {
            Ok(()) => {
                debug!("Access token refreshed");
                true
            }
            Err(e) => {
                warn!("Token refresh failed: {}", e);
                if let Err(e) = self.logout().await {
                    warn!("Failed to clear session after refresh failure: {}", e);
                }
                false
            }
        }
    }

    async fn try_refresh(&self, refresh_cookie: &SessionCookie) -> Result<()> {
        let url = self.client.url("/auth/refresh");
        debug!("POST {}", url);
        let response = self
            .client
            .http()
            .post(&url)
            .header(COOKIE, refresh_cookie.header_pair())
            .send()
            .await
            .map_err(|e| Error::NotReachable {
                url: self.client.base_url().to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(Error::api(response.status().as_u16(), "refresh rejected"));
        }

        self.store_refresh_cookie(&response)?;
        let body: RefreshResponse = response.json().await?;
        self.store_access_token(&body.access_token)
    }

    /// Tell the backend we are leaving, then clear the session regardless.
    pub async fn logout(&self) -> Result<()> {
        let session = self.client.session();

        if let Some(refresh_cookie) = session.get(REFRESH_TOKEN_COOKIE) {
            let url = self.client.url("/auth/logout");
            debug!("POST {}", url);
            let sent = self
                .client
                .http()
                .post(&url)
                .header(COOKIE, refresh_cookie.header_pair())
                .send()
                .await;
            match sent {
                Ok(response) if !response.status().is_success() => {
                    warn!("Backend logout returned {}", response.status());
                }
                Err(e) => warn!("Backend logout failed: {}", e),
                Ok(_) => {}
            }
        }

        session.remove(ACCESS_TOKEN_COOKIE)?;
        session.remove(REFRESH_TOKEN_COOKIE)?;
        session.remove(CSRF_COOKIE)?;
        info!("Signed out");
        Ok(())
    }

    /// Resolve the current session.
    ///
    /// A token that fails verification gets exactly one refresh attempt.
    /// Never returns an error.
    pub async fn get_auth(&self) -> AuthState {
        let session = self.client.session();
        let verifier = self.client.verifier();

        let access = session.value(ACCESS_TOKEN_COOKIE);
        if access.is_none() && session.value(REFRESH_TOKEN_COOKIE).is_none() {
            return AuthState::unauthenticated();
        }

        if let Some(token) = access {
            match verifier.verify(&token) {
                Ok(claims) => return AuthState::authenticated(claims),
                Err(e) => debug!("Access token rejected: {}", e),
            }
        }

        if !self.refresh().await {
            return AuthState::unauthenticated();
        }

        match session.value(ACCESS_TOKEN_COOKIE).map(|t| verifier.verify(&t)) {
            Some(Ok(claims)) => AuthState::authenticated(claims),
            Some(Err(e)) => {
                warn!("Refreshed token failed verification: {}", e);
                AuthState::unauthenticated()
            }
            None => AuthState::unauthenticated(),
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.get_auth().await.is_auth
    }

    /// Apply the route guard to `path` using the current session.
    pub async fn authorize(&self, path: &str) -> RouteDecision {
        let auth = self.get_auth().await;
        route_decision(path, &auth)
    }

    fn store_access_token(&self, token: &str) -> Result<()> {
        let secure = self.client.options().secure_cookies;
        self.client
            .session()
            .set(SessionCookie::access_token(token, secure))
    }

    fn store_refresh_cookie(&self, response: &Response) -> Result<()> {
        let headers = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        if let Some(value) = extract_cookie(headers, REFRESH_TOKEN_COOKIE) {
            let secure = self.client.options().secure_cookies;
            self.client
                .session()
                .set(SessionCookie::refresh_token(value, secure))?;
        }
        Ok(())
    }
}
