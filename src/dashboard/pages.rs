//! Server rendered dashboard pages.
//!
//! Pages render the current state; edits go through the JSON API from
//! `/public/dashboard.js`, which reads the `data-api` attributes below.

use super::AppState;
use super::session::{Flash, FlashKind, PageSession, SESSION_COOKIE, Session, session_cookie};
use crate::accounts::AccountRole;
use crate::duration;
use crate::embeds::EmbedTemplate;
use crate::moderation::PunishmentKind;
use crate::settings::{GuildSettings, join_ids};
use axum::Form;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use std::fmt::{Display, Write as _};
use tracing::info;

const NO_ACCESS: &str = "You do not have access to this section.";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login_form).post(login))
        .route("/logout", post(logout))
        .route("/timeout", get(timeout))
        .route("/punishments", get(punishments))
        .route("/disputes", get(disputes))
        .route("/verify", get(verify))
        .route("/logs", get(logs))
        .route("/autoreply", get(autoreply))
        .route("/manager", get(manager))
        .route("/tempvoice", get(tempvoice))
}

/// Escape text for HTML bodies and attribute values
pub fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn id_or_empty<T: Display>(id: Option<T>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

fn document(title: &str, nav: &str, flashes: &[Flash], body: &str) -> Html<String> {
    let mut notices = String::new();
    for flash in flashes {
        let class = match flash.kind {
            FlashKind::Success => "flash success",
            FlashKind::Error => "flash error",
        };
        let _ = write!(notices, r#"<div class="{class}">{}</div>"#, escape(&flash.message));
    }
    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title} · Voice Warden</title>
<link rel="stylesheet" href="/public/style.css">
<script src="/public/dashboard.js" defer></script>
</head>
<body>
{nav}
<main>
{notices}
<h1>{title}</h1>
{body}
</main>
</body>
</html>"#,
        title = escape(title),
    ))
}

fn nav(session: &Session) -> String {
    let role = session.role;
    let mut links = vec![
        ("/", "Home"),
        ("/punishments", "Punishments"),
        ("/disputes", "Disputes"),
        ("/verify", "Verify"),
    ];
    if role.allows_embed_settings() {
        links.push(("/tempvoice", "Temp voice"));
    }
    if role.is_owner() {
        links.extend([("/autoreply", "Auto replies"), ("/logs", "Logs"), ("/manager", "Manager")]);
    }
    let items: String = links
        .iter()
        .map(|(href, label)| format!(r#"<a href="{href}">{label}</a>"#))
        .collect();
    format!(
        r#"<nav>{items}<span class="who">{} ({})</span><form method="post" action="/logout"><button>Log out</button></form></nav>"#,
        escape(&session.username),
        role.as_str(),
    )
}

/// Render a page for a logged in user, consuming pending flash messages
fn page(state: &AppState, session: &Session, title: &str, body: &str) -> Html<String> {
    let flashes = state.sessions.take_flash(&session.token);
    document(title, &nav(session), &flashes, body)
}

/// Send users without the role home with a notice
fn gate(state: &AppState, session: &Session, allowed: fn(AccountRole) -> bool) -> Result<(), Response> {
    if allowed(session.role) {
        return Ok(());
    }
    state.sessions.push_flash(&session.token, Flash::error(NO_ACCESS));
    Err(Redirect::to("/").into_response())
}

fn no_guild(state: &AppState, session: &Session, title: &str) -> Response {
    page(
        state,
        session,
        title,
        r#"<p class="notice">MAIN_GUILD_ID is not configured.</p>"#,
    )
    .into_response()
}

/// Page body built from the main guild's settings
async fn settings_page(
    state: &AppState,
    session: &Session,
    title: &str,
    body: impl FnOnce(&GuildSettings) -> String,
) -> Response {
    let Some(guild_id) = state.guild_id else {
        return no_guild(state, session, title);
    };
    let settings = state.data.settings(guild_id).await;
    page(state, session, title, &body(&settings)).into_response()
}

fn checkbox(name: &str, checked: bool, editable: bool) -> String {
    format!(
        r#"<label><input type="checkbox" name="{name}"{}{}> Enabled</label>"#,
        if checked { " checked" } else { "" },
        if editable { "" } else { " disabled" },
    )
}

fn text_input(label: &str, name: &str, value: &str, editable: bool) -> String {
    format!(
        r#"<label>{label}<input name="{name}" value="{}"{}></label>"#,
        escape(value),
        if editable { "" } else { " readonly" },
    )
}

/// Editable embed template; the script submits it as a nested object under `name`
fn embed_editor(name: &str, template: &EmbedTemplate, editable: bool) -> String {
    let color = template
        .color
        .map(|c| format!("#{c:06x}"))
        .unwrap_or_default();
    let mut fields = String::new();
    for field in &template.fields {
        let _ = write!(
            fields,
            r#"<div class="embed-field"><input data-part="name" value="{}"><input data-part="value" value="{}"><label><input type="checkbox" data-part="inline"{}> Inline</label></div>"#,
            escape(&field.name),
            escape(&field.value),
            if field.inline { " checked" } else { "" },
        );
    }
    format!(
        r#"<fieldset class="embed" data-embed="{name}"{disabled}>
<legend>{name}</legend>
<label>Title<input data-part="title" value="{title}"></label>
<label>Description<textarea data-part="description">{description}</textarea></label>
<label>Color<input data-part="color" value="{color}"></label>
<div class="embed-fields">{fields}</div>
</fieldset>"#,
        disabled = if editable { "" } else { " disabled" },
        title = escape(&template.title),
        description = escape(&template.description),
    )
}

fn settings_form(api: &str, inner: &str) -> String {
    format!(
        r#"<form class="settings" data-api="/api/settings/{api}">{inner}<button>Save</button></form>"#
    )
}

fn updated_line(settings: &GuildSettings) -> String {
    match (&settings.updated_by, settings.updated_at) {
        (Some(by), Some(at)) => format!(
            r#"<p class="muted">Last updated by {} ({}) at {}</p>"#,
            escape(by),
            escape(settings.updated_by_role.as_deref().unwrap_or("unknown")),
            at.format("%Y-%m-%d %H:%M UTC"),
        ),
        _ => String::new(),
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

// Public pages

pub fn timeout_page(remaining_ms: u64) -> Html<String> {
    document(
        "Account suspended",
        "",
        &[],
        &format!(
            r#"<p>Your dashboard access is suspended for another <strong id="remaining" data-ms="{remaining_ms}">{}</strong>.</p>
<p><a href="/login">Back to login</a></p>"#,
            duration::format_long(remaining_ms),
        ),
    )
}

#[derive(Debug, Deserialize)]
struct TimeoutQuery {
    ms: Option<u64>,
}

async fn timeout(Query(query): Query<TimeoutQuery>) -> Html<String> {
    timeout_page(query.ms.unwrap_or(0))
}

fn login_document(error: Option<&str>) -> Html<String> {
    let flashes: Vec<Flash> = error.map(Flash::error).into_iter().collect();
    document(
        "Log in",
        "",
        &flashes,
        r#"<form method="post" action="/login" class="login">
<label>Username<input name="username" autocomplete="username" required></label>
<label>Password<input name="password" type="password" autocomplete="current-password" required></label>
<button>Log in</button>
</form>"#,
    )
}

async fn login_form(State(state): State<AppState>, jar: CookieJar) -> Response {
    let logged_in = jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| state.sessions.get(cookie.value()))
        .is_some();
    if logged_in {
        return Redirect::to("/").into_response();
    }
    login_document(None).into_response()
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(state): State<AppState>, jar: CookieJar, Form(form): Form<LoginForm>) -> Response {
    let Some(account) = state.data.verify_credentials(&form.username, &form.password) else {
        info!("Failed dashboard login for {:?}", form.username.trim());
        return (
            StatusCode::UNAUTHORIZED,
            login_document(Some("Invalid username or password.")),
        )
            .into_response();
    };
    let token = state.sessions.create(&account);
    state.sessions.push_flash(
        &token,
        Flash::success(format!("Welcome back, {}!", account.username)),
    );
    info!("{} logged in to the dashboard", account.username);
    (jar.add(session_cookie(token)), Redirect::to("/")).into_response()
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        state.sessions.remove(cookie.value());
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Redirect::to("/login")).into_response()
}

// Logged in pages

async fn home(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    let stats = state.data.bot_stats(state.guild_id).await;
    let mut body = format!(
        r#"<section class="stats" data-api="/api/bot-stats">
<p>Bot: <strong>{}</strong></p>
<p>Ping: {} ms</p>
<p>Uptime: {}</p>
<p>CPU: {:.2}%</p>
<p>RAM: {:.2} MB</p>"#,
        if stats.online { "online" } else { "offline" },
        stats.ping,
        duration::format_long(stats.uptime),
        stats.cpu,
        stats.ram,
    );
    if let Some(guild) = &stats.guild {
        let _ = write!(
            body,
            "<p>Server: {} ({} members)</p>",
            escape(&guild.name),
            guild.member_count
        );
    }
    body.push_str("</section>");

    if let Some(guild_id) = state.guild_id {
        let status = state.data.system_status(guild_id).await;
        let _ = write!(
            body,
            r#"<section class="status">
<p>Punishments: {}</p>
<p>Disputes: {}</p>
<p>Verification: {}</p>
<p>Temp voice: {}</p>
</section>"#,
            on_off(status.punishments_enabled),
            on_off(status.disputes_enabled),
            on_off(status.verify_enabled),
            on_off(status.temp_voice_enabled),
        );
    }
    page(&state, &session, "Dashboard", &body).into_response()
}

async fn punishments(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    let role = session.role;
    let voice_actions = state
        .guild_id
        .map(|guild| state.data.sanctions.for_guild(guild))
        .unwrap_or_default();
    settings_page(&state, &session, "Punishments", |s| {
        let options: String = PunishmentKind::ALL
            .iter()
            .map(|kind| format!(r#"<option value="{kind}">{kind}</option>"#))
            .collect();
        let mut body = format!(
            r#"<form class="punish" data-api="/api/punishments">
<label>User ID<input name="targetUserId" required></label>
<label>Action<select name="action">{options}</select></label>
<label>Reason<input name="reason"></label>
<label>Duration<input name="duration" placeholder="10m, 1h, 1d"></label>
<label><input type="checkbox" name="force"> Force</label>
<button>Apply</button>
</form>"#
        );

        body.push_str(r#"<h2>Active voice sanctions</h2><table data-api="/api/voice-actions"><tr><th>User</th><th>Type</th><th>Ends</th></tr>"#);
        for action in &voice_actions {
            let _ = write!(
                body,
                "<tr><td>{} ({})</td><td>{}</td><td>{}</td></tr>",
                escape(&action.user_tag),
                action.user_id,
                action.kind,
                action.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
            );
        }
        body.push_str("</table>");

        if role.allows_embed_settings() {
            let owner = role.is_owner();
            body.push_str("<h2>Settings</h2>");
            body.push_str(&settings_form(
                "punishments",
                &[
                    checkbox("enabled", s.punishments_enabled, owner),
                    text_input("Log channel ID", "logChannelId", &id_or_empty(s.log_channel_id), owner),
                    embed_editor("dmEmbed", &s.dm_embed, true),
                ]
                .concat(),
            ));
            body.push_str(&updated_line(s));
        }
        body
    })
    .await
}

async fn disputes(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    let role = session.role;
    let active = state
        .guild_id
        .map(|guild| state.data.active_disputes(guild))
        .unwrap_or_default();
    settings_page(&state, &session, "Disputes", |s| {
        let mut body = String::from(
            r#"<form class="dispute" data-api="/api/disputes">
<label>First user ID<input name="user1Id" required></label>
<label>Second user ID<input name="user2Id" required></label>
<button>Create dispute</button>
</form>
<table><tr><th>Users</th><th>Created by</th><th>Disconnects</th><th></th></tr>"#,
        );
        for dispute in &active {
            let _ = write!(
                body,
                r#"<tr><td>{}</td><td>{}</td><td>{}</td><td><button data-delete="/api/disputes/{}">Delete</button></td></tr>"#,
                escape(&dispute.label()),
                escape(&dispute.created_by),
                dispute.disconnect_count,
                dispute.id,
            );
        }
        body.push_str("</table>");
        if role.is_owner() {
            body.push_str(r#"<button data-delete="/api/disputes">Delete all disputes</button>"#);
        }

        if role.allows_embed_settings() {
            let owner = role.is_owner();
            body.push_str("<h2>Settings</h2>");
            body.push_str(&settings_form(
                "disputes",
                &[
                    checkbox("disputesEnabled", s.disputes_enabled, owner),
                    text_input(
                        "Log channel ID",
                        "disputeLogChannelId",
                        &id_or_empty(s.dispute_log_channel_id),
                        owner,
                    ),
                    embed_editor("disputeEmbed", &s.dispute_embed, true),
                ]
                .concat(),
            ));
            body.push_str(&updated_line(s));
        }
        body
    })
    .await
}

async fn verify(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    let role = session.role;
    let pending = state.data.verifications.len();
    settings_page(&state, &session, "Verification", |s| {
        let owner = role.is_owner();
        let editable = role.allows_embed_settings();
        let mut body = format!("<p>Open requests: {pending}</p>");
        body.push_str(&settings_form(
            "verify",
            &[
                checkbox("verifyEnabled", s.verify_enabled, owner),
                text_input("Category ID", "verifyCategoryId", &id_or_empty(s.verify_category_id), owner),
                text_input(
                    "Log channel ID",
                    "verifyLogChannelId",
                    &id_or_empty(s.verify_log_channel_id),
                    owner,
                ),
                text_input(
                    "Waiting channel ID",
                    "verifyChannelId",
                    &id_or_empty(s.verify_channel_id),
                    owner,
                ),
                text_input(
                    "Admin role IDs",
                    "verifyAdminRoleIds",
                    &join_ids(&s.verify_admin_role_ids),
                    owner,
                ),
                text_input("Boy role ID", "verifyBoyRoleId", &id_or_empty(s.verify_boy_role_id), owner),
                text_input("Girl role ID", "verifyGirlRoleId", &id_or_empty(s.verify_girl_role_id), owner),
                embed_editor("verifyEmbed", &s.verify_embed, editable),
            ]
            .concat(),
        ));
        body.push_str(&updated_line(s));
        body
    })
    .await
}

async fn tempvoice(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    if let Err(denied) = gate(&state, &session, AccountRole::allows_embed_settings) {
        return denied;
    }
    let owner = session.role.is_owner();
    let live = state.data.temp_voice.len();
    settings_page(&state, &session, "Temp voice", |s| {
        let mut body = format!("<p>Live channels: {live}</p>");
        body.push_str(&settings_form(
            "tempvoice",
            &[
                checkbox("tempVoiceEnabled", s.temp_voice_enabled, owner),
                text_input(
                    "Hub channel ID",
                    "tempVoiceHubChannelId",
                    &id_or_empty(s.temp_voice_hub_channel_id),
                    owner,
                ),
                text_input(
                    "Category ID",
                    "tempVoiceCategoryId",
                    &id_or_empty(s.temp_voice_category_id),
                    owner,
                ),
                text_input(
                    "Log channel ID",
                    "tempVoiceLogChannelId",
                    &id_or_empty(s.temp_voice_log_channel_id),
                    owner,
                ),
                text_input(
                    "Access role IDs",
                    "tempVoiceAccessRoleIds",
                    &join_ids(&s.temp_voice_access_role_ids),
                    owner,
                ),
                text_input("Name emojis", "tempVoiceEmojis", &s.temp_voice_emojis, owner),
                embed_editor("tempVoiceControlEmbed", &s.temp_voice_control_embed, true),
                embed_editor("tempVoiceDmEmbed", &s.temp_voice_dm_embed, true),
            ]
            .concat(),
        ));
        body.push_str(&updated_line(s));
        body
    })
    .await
}

async fn autoreply(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    if let Err(denied) = gate(&state, &session, AccountRole::is_owner) {
        return denied;
    }
    settings_page(&state, &session, "Auto replies", |s| {
        let mut body = String::from(
            r#"<form class="autoreply" data-api="/api/autoreply">
<input type="hidden" name="id">
<label>Trigger<input name="trigger" required></label>
<label>Match<select name="matchType"><option value="contains">contains</option><option value="starts">starts</option><option value="ends">ends</option></select></label>
<label>Response<textarea name="response" required></textarea></label>
<button>Save</button>
</form>
<table><tr><th>Trigger</th><th>Match</th><th>Response</th><th></th></tr>"#,
        );
        for entry in &s.auto_replies {
            let _ = write!(
                body,
                r#"<tr><td>{}</td><td>{:?}</td><td>{}</td><td><button data-delete="/api/autoreply/{}">Delete</button></td></tr>"#,
                escape(&entry.trigger),
                entry.match_mode,
                escape(&entry.response),
                escape(&entry.id),
            );
        }
        body.push_str("</table>");
        body
    })
    .await
}

async fn logs(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    if let Err(denied) = gate(&state, &session, AccountRole::is_owner) {
        return denied;
    }
    let Some(guild_id) = state.guild_id else {
        return no_guild(&state, &session, "Logs");
    };
    let mut body = String::from(
        "<table><tr><th>When</th><th>Action</th><th>User</th><th>Reason</th><th>Duration</th><th>By</th></tr>",
    );
    for log in state.data.punishment_logs(guild_id, 100) {
        let duration = if log.duration_ms > 0 {
            duration::format_compact(log.duration_ms)
        } else {
            String::new()
        };
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{} ({})</td><td>{}</td><td>{}</td><td>{} ({})</td></tr>",
            log.created_at.format("%Y-%m-%d %H:%M"),
            log.kind,
            escape(&log.target_tag),
            log.target_user_id,
            escape(&log.reason),
            duration,
            escape(&log.actor_name),
            escape(&log.actor_role),
        );
    }
    body.push_str("</table><h2>Accounts</h2><ul>");
    for account in state.data.list_accounts() {
        let _ = write!(body, "<li>{} ({})</li>", escape(&account.username), account.role);
    }
    body.push_str("</ul>");
    page(&state, &session, "Logs", &body).into_response()
}

async fn manager(State(state): State<AppState>, PageSession(session): PageSession) -> Response {
    if let Err(denied) = gate(&state, &session, AccountRole::is_owner) {
        return denied;
    }
    let roles: String = AccountRole::ALL
        .iter()
        .map(|role| format!(r#"<option value="{role}">{role}</option>"#))
        .collect();
    let mut body = format!(
        r#"<form class="account" data-api="/api/accounts">
<label>Username<input name="username" minlength="3" maxlength="30" required></label>
<label>Password<input name="password" type="password" required></label>
<label>Role<select name="role">{roles}</select></label>
<button>Create account</button>
</form>
<table><tr><th>Username</th><th>Role</th><th>Suspended</th><th></th></tr>"#
    );
    for account in state.data.list_accounts() {
        let actions = if account.role.is_owner() {
            String::new()
        } else {
            format!(
                r#"<form class="timeout" data-api="/api/timeoutaccount"><input type="hidden" name="user" value="{id}"><input name="duration" placeholder="30m"><button>Suspend</button></form><button data-delete="/api/accounts/{id}">Delete</button>"#,
                id = account.id,
            )
        };
        let _ = write!(
            body,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{actions}</td></tr>",
            escape(&account.username),
            account.role,
            account.timeout_remaining.as_deref().unwrap_or("no"),
        );
    }
    body.push_str("</table>");
    page(&state, &session, "Manager", &body).into_response()
}
