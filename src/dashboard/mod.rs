//! Web dashboard for Voice Warden
//!
//! Cookie-session HTML pages plus the JSON API under `/api`, served by axum
//! next to the gateway client. Static assets live in `public/`.

mod api;
mod error;
mod pages;
mod session;

pub use error::{ApiError, ApiResult};
pub use pages::escape;
pub use session::{Flash, SESSION_COOKIE, Session, SessionStore};

use crate::Data;
use axum::Router;
use poise::serenity_prelude::GuildId;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Directory served under `/public`
pub const PUBLIC_DIR: &str = "public";

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    pub data: Data,
    pub sessions: Arc<SessionStore>,
    /// The guild the dashboard administers
    pub guild_id: Option<GuildId>,
}

impl AppState {
    #[must_use]
    pub fn new(data: Data, session_ttl_hours: i64, guild_id: Option<GuildId>) -> Self {
        Self {
            data,
            sessions: Arc::new(SessionStore::new(session_ttl_hours)),
            guild_id,
        }
    }

    /// The administered guild
    ///
    /// # Errors
    /// [`ApiError::NoGuild`] when `MAIN_GUILD_ID` is unset.
    pub fn guild(&self) -> ApiResult<GuildId> {
        self.guild_id.ok_or(ApiError::NoGuild)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(pages::routes())
        .nest("/api", api::routes())
        .nest_service("/public", ServeDir::new(PUBLIC_DIR))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drop expired sessions
pub fn spawn_session_purge(sessions: Arc<SessionStore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                debug!("Purged {purged} expired dashboard sessions");
            }
        }
    })
}

/// Bind and serve the dashboard until the listener fails
///
/// # Errors
/// Returns an error when the address is invalid or cannot be bound.
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<(), crate::Error> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let purge = spawn_session_purge(Arc::clone(&state.sessions));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Dashboard listening on http://{addr}");
    let result = axum::serve(listener, router(state)).await;
    purge.abort();
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use axum::response::Response;
    use crate::platform::{GuildSummary, MemberInfo, MockPlatform};
    use serde_json::Value;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(Data::new(), 24, Some(GuildId::new(1)))
    }

    async fn json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn login(state: &AppState, username: &str, password: &str) -> Response {
        router(state.clone())
            .oneshot(
                Request::post("/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from(format!("username={username}&password={password}")))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    /// Log in and return the `name=value` cookie pair
    async fn session_cookie(state: &AppState, username: &str, password: &str) -> String {
        let response = login(state, username, password).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    fn get(uri: &str, cookie: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, cookie: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_api_requires_session() {
        let response = router(state())
            .oneshot(Request::get("/api/disputes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json(response).await["error"], "unauthorized");

        let response = router(state())
            .oneshot(Request::get("/punishments").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_bad_login_rerenders_form() {
        let state = state();
        state.data.create_account("owner", "hunter22", "owner").await.unwrap();
        let response = login(&state, "owner", "wrong").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_login_flow_and_settings() {
        let state = state();
        state.data.create_account("owner", "hunter22", "owner").await.unwrap();
        let cookie = session_cookie(&state, "owner", "hunter22").await;

        let response = router(state.clone())
            .oneshot(get("/", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("Welcome back, owner!"));

        let response = router(state.clone())
            .oneshot(post_json(
                "/api/settings/disputes",
                &cookie,
                &serde_json::json!({ "disputesEnabled": "false", "disputeLogChannelId": "77" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["settings"]["disputesEnabled"], false);
        assert_eq!(body["settings"]["disputeLogChannelId"], "77");
        assert_eq!(body["settings"]["updatedBy"], "owner");
    }

    #[tokio::test]
    async fn test_role_gates() {
        let state = state();
        state.data.create_account("mod", "hunter22", "admin").await.unwrap();
        let cookie = session_cookie(&state, "mod", "hunter22").await;

        let response = router(state.clone())
            .oneshot(get("/manager", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");

        let response = router(state.clone())
            .oneshot(get("/api/accounts", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = router(state.clone())
            .oneshot(post_json(
                "/api/settings/verify",
                &cookie,
                &serde_json::json!({ "verifyEnabled": false }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_suspended_account() {
        let state = state();
        let admin = state.data.create_account("mod", "hunter22", "admin").await.unwrap();
        let cookie = session_cookie(&state, "mod", "hunter22").await;
        state.data.set_web_timeout(admin.id, "30m").await.unwrap();

        let response = router(state.clone())
            .oneshot(get("/api/disputes", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json(response).await["error"], "timed_out");

        let response = router(state.clone())
            .oneshot(get("/api/userstimoutes", &cookie))
            .await
            .unwrap();
        let body = json(response).await;
        assert!(body["remainingMs"].as_u64().unwrap() > 0);

        let response = router(state.clone())
            .oneshot(get("/disputes", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Account suspended"));
    }

    #[tokio::test]
    async fn test_disputes_api() {
        let state = state();
        let mut platform = MockPlatform::new();
        platform.expect_guild_summary().returning(|id| {
            Ok(Some(GuildSummary {
                id,
                name: "Guild".to_string(),
                member_count: 2,
            }))
        });
        platform
            .expect_fetch_member()
            .returning(|_, user| Ok(Some(MemberInfo::plain(user.get(), &format!("user{user}")))));
        state.data.set_platform(Arc::new(platform));
        state.data.create_account("owner", "hunter22", "owner").await.unwrap();
        let cookie = session_cookie(&state, "owner", "hunter22").await;

        let response = router(state.clone())
            .oneshot(post_json(
                "/api/disputes",
                &cookie,
                &serde_json::json!({ "user1Id": "10", "user2Id": "10" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = router(state.clone())
            .oneshot(post_json(
                "/api/disputes",
                &cookie,
                &serde_json::json!({ "user1Id": "10", "user2Id": "20" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let id = json(response).await["dispute"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let delete = |uri: String| {
            Request::delete(uri)
                .header(header::COOKIE, cookie.as_str())
                .body(Body::empty())
                .unwrap()
        };
        let response = router(state.clone())
            .oneshot(delete(format!("/api/disputes/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router(state.clone())
            .oneshot(delete(format!("/api/disputes/{id}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "Dispute not found");
    }

    #[tokio::test]
    async fn test_missing_guild() {
        let state = AppState::new(Data::new(), 24, None);
        state.data.create_account("owner", "hunter22", "owner").await.unwrap();
        let cookie = session_cookie(&state, "owner", "hunter22").await;
        let response = router(state)
            .oneshot(get("/api/voice-actions", &cookie))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_static_assets() {
        let response = router(state())
            .oneshot(Request::get("/public/style.css").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
