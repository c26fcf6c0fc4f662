//! Cookie sessions for dashboard logins.

use super::AppState;
use super::error::ApiError;
use crate::accounts::{Account, AccountRole};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "vw_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Error,
}

/// One-shot message shown on the next rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FlashKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub account_id: Uuid,
    pub username: String,
    pub role: AccountRole,
    pub expires_at: DateTime<Utc>,
    flash: Vec<Flash>,
}

/// Live sessions by token
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    /// Open a session for an account and return its token
    pub fn create(&self, account: &Account) -> String {
        let token = new_token();
        self.sessions.insert(
            token.clone(),
            Session {
                token: token.clone(),
                account_id: account.id,
                username: account.username.clone(),
                role: account.role,
                expires_at: Utc::now() + self.ttl,
                flash: Vec::new(),
            },
        );
        token
    }

    /// The session for a token, dropping it when expired
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Session> {
        let session = self.sessions.get(token).map(|entry| entry.value().clone())?;
        if session.expires_at > Utc::now() {
            return Some(session);
        }
        self.sessions.remove(token);
        None
    }

    pub fn remove(&self, token: &str) {
        self.sessions.remove(token);
    }

    pub fn push_flash(&self, token: &str, flash: Flash) {
        if let Some(mut session) = self.sessions.get_mut(token) {
            session.flash.push(flash);
        }
    }

    /// Pending flash messages, emptied
    pub fn take_flash(&self, token: &str) -> Vec<Flash> {
        self.sessions
            .get_mut(token)
            .map(|mut session| std::mem::take(&mut session.flash))
            .unwrap_or_default()
    }

    /// Drop every expired session; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at > now);
        before - self.sessions.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn new_token() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Resolve the session cookie, dropping sessions whose account is gone
fn resolve(parts: &Parts, state: &AppState) -> Option<Session> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar.get(SESSION_COOKIE)?.value().to_string();
    let session = state.sessions.get(&token)?;
    if state.data.account(session.account_id).is_none() {
        state.sessions.remove(&token);
        return None;
    }
    Some(session)
}

/// A logged in, non-suspended dashboard user
#[derive(Debug, Clone)]
pub struct ApiSession(pub Session);

impl FromRequestParts<AppState> for ApiSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = resolve(parts, state).ok_or(ApiError::Unauthorized)?;
        if state.data.web_timeout_remaining(session.account_id).is_some() {
            return Err(ApiError::TimedOut);
        }
        Ok(Self(session))
    }
}

/// A logged in user, suspended or not
#[derive(Debug, Clone)]
pub struct AnySession(pub Session);

impl FromRequestParts<AppState> for AnySession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        resolve(parts, state).map(Self).ok_or(ApiError::Unauthorized)
    }
}

/// Session for HTML pages; anonymous visitors are sent to the login page and
/// suspended accounts see the timeout page
#[derive(Debug, Clone)]
pub struct PageSession(pub Session);

impl FromRequestParts<AppState> for PageSession {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(session) = resolve(parts, state) else {
            return Err(Redirect::to("/login").into_response());
        };
        if let Some(remaining) = state.data.web_timeout_remaining(session.account_id) {
            return Err(super::pages::timeout_page(remaining).into_response());
        }
        Ok(Self(session))
    }
}
