//! Session cookie storage.
//!
//! The backend hands out an access token (returned in the login body) and a
//! refresh token (in a `Set-Cookie` header). Both are kept as cookies with
//! the same attributes a browser would enforce, in a [`SessionStore`].
//!
//! [`FileSessionStore`] persists them as JSON so the CLI keeps its session
//! between invocations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{Error, Result};

/// Cookie holding the short-lived access token.
pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Cookie holding the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// CSRF cookie some backends set; cleared on logout.
pub const CSRF_COOKIE: &str = "csrftoken";

/// Access token lifetime (120 minutes).
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(120 * 60);

/// Refresh token lifetime (7 days).
pub const REFRESH_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    None,
}

/// A stored cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub http_only: bool,
    pub same_site: SameSite,
    pub secure: bool,
    /// Lifetime from `created_at`; `None` for session cookies.
    #[serde(default, with = "duration_secs")]
    pub max_age: Option<Duration>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl SessionCookie {
    /// New http-only, `SameSite=Strict` cookie created now.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            http_only: true,
            same_site: SameSite::Strict,
            secure: false,
            max_age: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// The `accessToken` cookie.
    pub fn access_token(value: impl Into<String>, secure: bool) -> Self {
        Self::new(ACCESS_TOKEN_COOKIE, value)
            .with_max_age(ACCESS_TOKEN_TTL)
            .with_secure(secure)
    }

    /// The `refresh_token` cookie.
    pub fn refresh_token(value: impl Into<String>, secure: bool) -> Self {
        Self::new(REFRESH_TOKEN_COOKIE, value)
            .with_max_age(REFRESH_TOKEN_TTL)
            .with_secure(secure)
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: OffsetDateTime) -> Self {
        self.created_at = created_at;
        self
    }

    /// Expiry instant, if the cookie has a max age.
    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        self.max_age.map(|age| self.created_at + age)
    }

    /// Whether the cookie has expired at `now`.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|at| now >= at)
    }

    /// `name=value`, as sent in a `Cookie` request header.
    pub fn header_pair(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// Storage for session cookies.
///
/// `get` never returns an expired cookie.
pub trait SessionStore: Send + Sync {
    /// Look up a live cookie by name.
    fn get(&self, name: &str) -> Option<SessionCookie>;

    /// Insert or replace a cookie.
    fn set(&self, cookie: SessionCookie) -> Result<()>;

    /// Remove a cookie if present.
    fn remove(&self, name: &str) -> Result<()>;

    /// Remove every cookie.
    fn clear(&self) -> Result<()>;

    /// Value of a live cookie.
    fn value(&self, name: &str) -> Option<String> {
        self.get(name).map(|c| c.value)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn live(cookies: &BTreeMap<String, SessionCookie>, name: &str) -> Option<SessionCookie> {
    cookies
        .get(name)
        .filter(|c| !c.is_expired(OffsetDateTime::now_utc()))
        .cloned()
}

/// In-memory store; lost when dropped.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    cookies: Mutex<BTreeMap<String, SessionCookie>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored cookies, expired ones included.
    pub fn len(&self) -> usize {
        lock(&self.cookies).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, name: &str) -> Option<SessionCookie> {
        live(&lock(&self.cookies), name)
    }

    fn set(&self, cookie: SessionCookie) -> Result<()> {
        lock(&self.cookies).insert(cookie.name.clone(), cookie);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        lock(&self.cookies).remove(name);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        lock(&self.cookies).clear();
        Ok(())
    }
}

/// JSON-file store, rewritten on every mutation.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    cookies: Mutex<BTreeMap<String, SessionCookie>>,
}

impl FileSessionStore {
    /// Open the store at `path`, loading existing cookies if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cookies = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    Error::Session(format!("{} is not a valid session file: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };
        debug!("Opened session store at {} ({} cookies)", path.display(), cookies.len());
        Ok(Self {
            path,
            cookies: Mutex::new(cookies),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cookies: &BTreeMap<String, SessionCookie>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(cookies)?;
        std::fs::write(&self.path, content)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, name: &str) -> Option<SessionCookie> {
        live(&lock(&self.cookies), name)
    }

    fn set(&self, cookie: SessionCookie) -> Result<()> {
        let mut cookies = lock(&self.cookies);
        cookies.insert(cookie.name.clone(), cookie);
        self.persist(&cookies)
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut cookies = lock(&self.cookies);
        if cookies.remove(name).is_some() {
            self.persist(&cookies)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut cookies = lock(&self.cookies);
        cookies.clear();
        self.persist(&cookies)
    }
}

/// Find cookie `name` among `Set-Cookie` header values.
///
/// ```
/// use verdant_core::session::extract_cookie;
///
/// let headers = ["refresh_token=abc.def; Path=/; HttpOnly; SameSite=Strict"];
/// assert_eq!(extract_cookie(headers, "refresh_token").as_deref(), Some("abc.def"));
/// ```
pub fn extract_cookie<'a, I>(set_cookie_headers: I, name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    set_cookie_headers.into_iter().find_map(|header| {
        let pair = header.split(';').next()?.trim();
        let (key, value) = pair.split_once('=')?;
        (key.trim() == name).then(|| value.trim().trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_cookie_expiry() {
        let created = datetime!(2024-04-05 10:00 UTC);
        let cookie = SessionCookie::access_token("tok", true).with_created_at(created);

        assert!(cookie.http_only);
        assert!(cookie.secure);
        assert_eq!(cookie.same_site, SameSite::Strict);
        assert!(!cookie.is_expired(datetime!(2024-04-05 11:59 UTC)));
        assert!(cookie.is_expired(datetime!(2024-04-05 12:00 UTC)));

        let refresh = SessionCookie::refresh_token("r", false).with_created_at(created);
        assert!(!refresh.is_expired(datetime!(2024-04-11 10:00 UTC)));
        assert!(refresh.is_expired(datetime!(2024-04-12 10:00 UTC)));

        let session = SessionCookie::new("csrftoken", "x");
        assert!(!session.is_expired(datetime!(2100-01-01 0:00 UTC)));
    }

    #[test]
    fn test_memory_store_hides_expired() {
        let store = MemorySessionStore::new();
        store
            .set(SessionCookie::access_token("old", false).with_created_at(datetime!(2000-01-01 0:00 UTC)))
            .unwrap();
        store.set(SessionCookie::refresh_token("fresh", false)).unwrap();

        assert!(store.get(ACCESS_TOKEN_COOKIE).is_none());
        assert_eq!(store.value(REFRESH_TOKEN_COOKIE).as_deref(), Some("fresh"));
        assert_eq!(store.len(), 2);

        store.remove(REFRESH_TOKEN_COOKIE).unwrap();
        assert!(store.value(REFRESH_TOKEN_COOKIE).is_none());
        store.clear().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        {
            let store = FileSessionStore::open(&path).unwrap();
            store.set(SessionCookie::access_token("a1", false)).unwrap();
            store.set(SessionCookie::refresh_token("r1", false)).unwrap();
        }

        let reopened = FileSessionStore::open(&path).unwrap();
        assert_eq!(reopened.value(ACCESS_TOKEN_COOKIE).as_deref(), Some("a1"));
        assert_eq!(reopened.value(REFRESH_TOKEN_COOKIE).as_deref(), Some("r1"));
        let cookie = reopened.get(REFRESH_TOKEN_COOKIE).unwrap();
        assert_eq!(cookie.max_age, Some(REFRESH_TOKEN_TTL));

        reopened.clear().unwrap();
        let cleared = FileSessionStore::open(&path).unwrap();
        assert!(cleared.get(ACCESS_TOKEN_COOKIE).is_none());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = FileSessionStore::open(&path).unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }

    #[test]
    fn test_extract_cookie() {
        let headers = [
            "csrftoken=zzz; Path=/",
            "refresh_token=\"r.t.v\"; Max-Age=604800; HttpOnly",
        ];
        assert_eq!(
            extract_cookie(headers, REFRESH_TOKEN_COOKIE).as_deref(),
            Some("r.t.v")
        );
        assert_eq!(extract_cookie(headers, "csrftoken").as_deref(), Some("zzz"));
        assert!(extract_cookie(headers, ACCESS_TOKEN_COOKIE).is_none());
        assert!(extract_cookie(["garbage"], REFRESH_TOKEN_COOKIE).is_none());
    }
}
