//! JSON API under `/api`.
//!
//! Every response carries `ok`. Payload field names follow the dashboard's
//! camelCase forms; ids travel as strings.

use super::AppState;
use super::error::{ApiError, ApiResult};
use super::session::{AnySession, ApiSession, Session};
use crate::accounts::AccountRole;
use crate::disputes::{Dispute, NewDispute};
use crate::duration;
use crate::embeds::{EmbedField, EmbedTemplate, parse_color};
use crate::moderation::{
    Actor, ModerationError, PunishmentKind, PunishmentRequest, TimedSanction, perform_punishment,
};
use crate::settings::{
    AutoReply, Editor, GuildSettings, MatchMode, join_ids, parse_channel_id, parse_id,
    parse_role_id, parse_role_ids,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use poise::serenity_prelude::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt::Display;
use tracing::info;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/{id}", delete(delete_account))
        .route("/timeoutaccount", post(timeout_account))
        .route("/userstimoutes", get(own_timeout))
        .route("/punishments", post(punish))
        .route(
            "/settings/punishments",
            get(get_settings).post(update_punishment_settings),
        )
        .route(
            "/settings/disputes",
            get(get_settings).post(update_dispute_settings),
        )
        .route("/settings/verify", get(get_settings).post(update_verify_settings))
        .route(
            "/settings/tempvoice",
            get(get_settings).post(update_temp_voice_settings),
        )
        .route(
            "/disputes",
            post(create_dispute).get(list_disputes).delete(delete_all_disputes),
        )
        .route("/disputes/{id}", delete(delete_dispute))
        .route("/autoreply", get(list_auto_replies).post(save_auto_reply))
        .route("/autoreply/{id}", delete(delete_auto_reply))
        .route("/bot-stats", get(bot_stats))
        .route("/voice-actions", get(voice_actions))
}

fn editor(session: &Session) -> Editor {
    Editor {
        username: session.username.clone(),
        role: session.role.as_str().to_string(),
    }
}

fn require_owner(session: &Session) -> ApiResult<()> {
    if session.role.is_owner() {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

fn id_string<T: Display>(id: Option<T>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

/// Booleans arrive either as JSON booleans or as `"true"` / `"false"`
fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn color(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .and_then(|c| u32::try_from(c).ok())
            .filter(|c| *c <= 0x00ff_ffff),
        Value::String(s) => parse_color(s),
        _ => None,
    }
}

// Accounts

#[derive(Debug, Deserialize)]
struct NewAccountPayload {
    username: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

async fn create_account(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<NewAccountPayload>,
) -> ApiResult<impl IntoResponse> {
    require_owner(&session)?;
    let account = state
        .data
        .create_account(
            payload.username.as_deref().unwrap_or_default(),
            payload.password.as_deref().unwrap_or_default(),
            payload.role.as_deref().unwrap_or_default(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "id": account.id,
            "username": account.username,
            "role": account.role,
        })),
    ))
}

async fn list_accounts(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
) -> ApiResult<Json<Value>> {
    require_owner(&session)?;
    Ok(Json(json!({ "ok": true, "users": state.data.list_accounts() })))
}

async fn delete_account(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_owner(&session)?;
    let id = Uuid::parse_str(&id).map_err(|_| crate::accounts::AccountError::NotFound)?;
    state.data.delete_account(id).await?;
    info!("{} deleted account {id}", session.username);
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
struct TimeoutPayload {
    user: Option<String>,
    duration: Option<Value>,
}

async fn timeout_account(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<TimeoutPayload>,
) -> ApiResult<Json<Value>> {
    require_owner(&session)?;
    let id = payload
        .user
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or_else(|| ApiError::BadRequest("user and duration are required".to_string()))?;
    let raw = match payload.duration {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(ApiError::BadRequest("user and duration are required".to_string())),
    };
    let account = state.data.set_web_timeout(id, &raw).await?;
    info!("{} set web timeout {raw:?} on {}", session.username, account.username);
    Ok(Json(json!({ "ok": true, "account": account })))
}

async fn own_timeout(
    State(state): State<AppState>,
    AnySession(session): AnySession,
) -> Json<Value> {
    let remaining = state.data.web_timeout_remaining(session.account_id).unwrap_or(0);
    let until = state
        .data
        .account(session.account_id)
        .and_then(|account| account.web_timeout_until)
        .filter(|_| remaining > 0);
    Json(json!({ "ok": true, "remainingMs": remaining, "until": until }))
}

// Punishments

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PunishmentPayload {
    target_user_id: Option<String>,
    action: Option<String>,
    reason: Option<String>,
    duration: Option<Value>,
    force: Option<Value>,
}

fn duration_ms(value: Option<&Value>) -> Option<u64> {
    let millis = match value? {
        Value::String(s) => duration::parse_millis(s)?,
        Value::Number(n) => n.as_u64()?,
        _ => return None,
    };
    (millis > 0).then_some(millis)
}

async fn punish(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<PunishmentPayload>,
) -> ApiResult<Json<Value>> {
    if !session.role.allows_punishments() {
        return Err(ApiError::forbidden());
    }
    let guild_id = state.guild()?;
    let (Some(target), Some(action)) = (
        payload.target_user_id.as_deref().and_then(parse_id),
        payload.action.as_deref(),
    ) else {
        return Err(ApiError::BadRequest(
            "targetUserId and action required".to_string(),
        ));
    };
    let kind: PunishmentKind = action.parse().map_err(|_| ModerationError::UnknownAction)?;

    let warn_count = perform_punishment(
        &state.data,
        PunishmentRequest {
            guild_id,
            target_user_id: UserId::new(target),
            kind,
            reason: payload.reason.unwrap_or_default(),
            duration_ms: duration_ms(payload.duration.as_ref()),
            force: flag(payload.force.as_ref()).unwrap_or(false),
            actor: Actor {
                id: Some(session.account_id.to_string()),
                name: session.username.clone(),
                role: session.role,
            },
        },
    )
    .await?;
    Ok(Json(json!({ "ok": true, "warnCount": warn_count })))
}

// Settings

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AutoReplyView {
    id: String,
    trigger: String,
    match_type: MatchMode,
    response: String,
}

impl From<&AutoReply> for AutoReplyView {
    fn from(entry: &AutoReply) -> Self {
        Self {
            id: entry.id.clone(),
            trigger: entry.trigger.clone(),
            match_type: entry.match_mode,
            response: entry.response.clone(),
        }
    }
}

/// Settings document in the shape the dashboard forms use
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SettingsView {
    guild_id: String,
    log_channel_id: String,
    punishments_enabled: bool,
    dm_embed: EmbedTemplate,
    disputes_enabled: bool,
    dispute_log_channel_id: String,
    dispute_embed: EmbedTemplate,
    verify_enabled: bool,
    verify_category_id: String,
    verify_log_channel_id: String,
    verify_channel_id: String,
    verify_admin_role_ids: String,
    verify_boy_role_id: String,
    verify_girl_role_id: String,
    verify_embed: EmbedTemplate,
    temp_voice_enabled: bool,
    temp_voice_hub_channel_id: String,
    temp_voice_category_id: String,
    temp_voice_log_channel_id: String,
    temp_voice_access_role_ids: String,
    temp_voice_emojis: String,
    temp_voice_control_embed: EmbedTemplate,
    temp_voice_dm_embed: EmbedTemplate,
    auto_replies: Vec<AutoReplyView>,
    updated_by: Option<String>,
    updated_by_role: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<GuildSettings> for SettingsView {
    fn from(s: GuildSettings) -> Self {
        Self {
            guild_id: s.guild_id.to_string(),
            log_channel_id: id_string(s.log_channel_id),
            punishments_enabled: s.punishments_enabled,
            dm_embed: s.dm_embed,
            disputes_enabled: s.disputes_enabled,
            dispute_log_channel_id: id_string(s.dispute_log_channel_id),
            dispute_embed: s.dispute_embed,
            verify_enabled: s.verify_enabled,
            verify_category_id: id_string(s.verify_category_id),
            verify_log_channel_id: id_string(s.verify_log_channel_id),
            verify_channel_id: id_string(s.verify_channel_id),
            verify_admin_role_ids: join_ids(&s.verify_admin_role_ids),
            verify_boy_role_id: id_string(s.verify_boy_role_id),
            verify_girl_role_id: id_string(s.verify_girl_role_id),
            verify_embed: s.verify_embed,
            temp_voice_enabled: s.temp_voice_enabled,
            temp_voice_hub_channel_id: id_string(s.temp_voice_hub_channel_id),
            temp_voice_category_id: id_string(s.temp_voice_category_id),
            temp_voice_log_channel_id: id_string(s.temp_voice_log_channel_id),
            temp_voice_access_role_ids: join_ids(&s.temp_voice_access_role_ids),
            temp_voice_emojis: s.temp_voice_emojis,
            temp_voice_control_embed: s.temp_voice_control_embed,
            temp_voice_dm_embed: s.temp_voice_dm_embed,
            auto_replies: s.auto_replies.iter().map(AutoReplyView::from).collect(),
            updated_by: s.updated_by,
            updated_by_role: s.updated_by_role,
            updated_at: s.updated_at,
        }
    }
}

fn settings_response(settings: GuildSettings) -> Json<Value> {
    Json(json!({ "ok": true, "settings": SettingsView::from(settings) }))
}

async fn get_settings(
    State(state): State<AppState>,
    ApiSession(_): ApiSession,
) -> ApiResult<Json<Value>> {
    let guild_id = state.guild()?;
    Ok(settings_response(state.data.settings(guild_id).await))
}

#[derive(Debug, Default, Deserialize)]
struct EmbedFieldPayload {
    name: Option<String>,
    value: Option<String>,
    inline: Option<Value>,
}

/// Embed template as submitted by a settings form
#[derive(Debug, Default, Deserialize)]
struct EmbedPayload {
    title: Option<String>,
    description: Option<String>,
    color: Option<Value>,
    fields: Option<Vec<EmbedFieldPayload>>,
}

impl EmbedPayload {
    /// Build the stored template; fields missing a name or value are dropped
    fn into_template(self, current: &EmbedTemplate) -> EmbedTemplate {
        let fields = match self.fields {
            Some(fields) => fields
                .into_iter()
                .filter_map(|f| {
                    let name = f.name.filter(|n| !n.trim().is_empty())?;
                    let value = f.value.filter(|v| !v.trim().is_empty())?;
                    Some(EmbedField::new(name, value, flag(f.inline.as_ref()).unwrap_or(false)))
                })
                .collect(),
            None => current.fields.clone(),
        };
        EmbedTemplate {
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            color: color(self.color.as_ref()),
            fields,
        }
    }
}

/// Apply a submitted embed, if any
fn apply_embed(target: &mut EmbedTemplate, payload: Option<EmbedPayload>) {
    if let Some(payload) = payload {
        *target = payload.into_template(target);
    }
}

/// A submitted channel or role id; empty clears it
fn apply_id<T>(target: &mut Option<T>, raw: Option<&str>, parse: fn(&str) -> Option<T>) {
    if let Some(raw) = raw {
        *target = parse(raw);
    }
}

fn apply_flag(target: &mut bool, value: Option<&Value>) {
    if let Some(enabled) = flag(value) {
        *target = enabled;
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PunishmentSettingsPayload {
    log_channel_id: Option<String>,
    enabled: Option<Value>,
    dm_embed: Option<EmbedPayload>,
}

async fn update_punishment_settings(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<PunishmentSettingsPayload>,
) -> ApiResult<Json<Value>> {
    if !session.role.allows_embed_settings() {
        return Err(ApiError::forbidden());
    }
    let guild_id = state.guild()?;
    let is_owner = session.role.is_owner();
    let settings = state
        .data
        .update_settings(guild_id, Some(&editor(&session)), |s| {
            if is_owner {
                apply_id(&mut s.log_channel_id, payload.log_channel_id.as_deref(), parse_channel_id);
                apply_flag(&mut s.punishments_enabled, payload.enabled.as_ref());
            }
            apply_embed(&mut s.dm_embed, payload.dm_embed);
            s.ensure_dm_fields();
        })
        .await?;
    Ok(settings_response(settings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisputeSettingsPayload {
    dispute_embed: Option<EmbedPayload>,
    disputes_enabled: Option<Value>,
    dispute_log_channel_id: Option<String>,
}

async fn update_dispute_settings(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<DisputeSettingsPayload>,
) -> ApiResult<Json<Value>> {
    if !session.role.allows_embed_settings() {
        return Err(ApiError::forbidden());
    }
    let guild_id = state.guild()?;
    let is_owner = session.role.is_owner();
    let settings = state
        .data
        .update_settings(guild_id, Some(&editor(&session)), |s| {
            apply_embed(&mut s.dispute_embed, payload.dispute_embed);
            if is_owner {
                apply_flag(&mut s.disputes_enabled, payload.disputes_enabled.as_ref());
                apply_id(
                    &mut s.dispute_log_channel_id,
                    payload.dispute_log_channel_id.as_deref(),
                    parse_channel_id,
                );
            }
        })
        .await?;
    Ok(settings_response(settings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifySettingsPayload {
    verify_category_id: Option<String>,
    verify_log_channel_id: Option<String>,
    verify_channel_id: Option<String>,
    verify_admin_role_ids: Option<String>,
    verify_boy_role_id: Option<String>,
    verify_girl_role_id: Option<String>,
    verify_enabled: Option<Value>,
    verify_embed: Option<EmbedPayload>,
}

async fn update_verify_settings(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<VerifySettingsPayload>,
) -> ApiResult<Json<Value>> {
    if !session.role.allows_embed_settings() {
        return Err(ApiError::forbidden());
    }
    let guild_id = state.guild()?;
    let is_owner = session.role.is_owner();
    let settings = state
        .data
        .update_settings(guild_id, Some(&editor(&session)), |s| {
            if is_owner {
                apply_id(&mut s.verify_category_id, payload.verify_category_id.as_deref(), parse_channel_id);
                apply_id(
                    &mut s.verify_log_channel_id,
                    payload.verify_log_channel_id.as_deref(),
                    parse_channel_id,
                );
                apply_id(&mut s.verify_channel_id, payload.verify_channel_id.as_deref(), parse_channel_id);
                if let Some(raw) = payload.verify_admin_role_ids.as_deref() {
                    s.verify_admin_role_ids = parse_role_ids(raw);
                }
                apply_id(&mut s.verify_boy_role_id, payload.verify_boy_role_id.as_deref(), parse_role_id);
                apply_id(&mut s.verify_girl_role_id, payload.verify_girl_role_id.as_deref(), parse_role_id);
                apply_flag(&mut s.verify_enabled, payload.verify_enabled.as_ref());
            }
            apply_embed(&mut s.verify_embed, payload.verify_embed);
        })
        .await?;
    Ok(settings_response(settings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TempVoiceSettingsPayload {
    temp_voice_enabled: Option<Value>,
    temp_voice_hub_channel_id: Option<String>,
    temp_voice_category_id: Option<String>,
    temp_voice_log_channel_id: Option<String>,
    temp_voice_access_role_ids: Option<String>,
    temp_voice_emojis: Option<String>,
    temp_voice_control_embed: Option<EmbedPayload>,
    temp_voice_dm_embed: Option<EmbedPayload>,
}

async fn update_temp_voice_settings(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<TempVoiceSettingsPayload>,
) -> ApiResult<Json<Value>> {
    if !session.role.allows_embed_settings() {
        return Err(ApiError::forbidden());
    }
    let guild_id = state.guild()?;
    let is_owner = session.role.is_owner();
    let settings = state
        .data
        .update_settings(guild_id, Some(&editor(&session)), |s| {
            if is_owner {
                apply_flag(&mut s.temp_voice_enabled, payload.temp_voice_enabled.as_ref());
                apply_id(
                    &mut s.temp_voice_hub_channel_id,
                    payload.temp_voice_hub_channel_id.as_deref(),
                    parse_channel_id,
                );
                apply_id(
                    &mut s.temp_voice_category_id,
                    payload.temp_voice_category_id.as_deref(),
                    parse_channel_id,
                );
                apply_id(
                    &mut s.temp_voice_log_channel_id,
                    payload.temp_voice_log_channel_id.as_deref(),
                    parse_channel_id,
                );
                if let Some(raw) = payload.temp_voice_access_role_ids.as_deref() {
                    s.temp_voice_access_role_ids = parse_role_ids(raw);
                }
                if let Some(emojis) = payload.temp_voice_emojis {
                    s.temp_voice_emojis = emojis.trim().to_string();
                }
            }
            apply_embed(&mut s.temp_voice_control_embed, payload.temp_voice_control_embed);
            apply_embed(&mut s.temp_voice_dm_embed, payload.temp_voice_dm_embed);
        })
        .await?;
    Ok(settings_response(settings))
}

// Disputes

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DisputeView {
    id: Uuid,
    user1_id: String,
    user1_name: String,
    user2_id: String,
    user2_name: String,
    created_by: String,
    created_by_role: Option<String>,
    active: bool,
    disconnect_count: u32,
    created_at: DateTime<Utc>,
}

impl From<Dispute> for DisputeView {
    fn from(d: Dispute) -> Self {
        Self {
            id: d.id,
            user1_id: d.user1_id.to_string(),
            user1_name: d.user1_name,
            user2_id: d.user2_id.to_string(),
            user2_name: d.user2_name,
            created_by: d.created_by,
            created_by_role: d.created_by_role,
            active: d.active,
            disconnect_count: d.disconnect_count,
            created_at: d.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DisputePayload {
    user1_id: Option<String>,
    user2_id: Option<String>,
}

async fn create_dispute(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<DisputePayload>,
) -> ApiResult<Json<Value>> {
    if !session.role.allows_punishments() {
        return Err(ApiError::forbidden());
    }
    let guild_id = state.guild()?;
    let (Some(user1), Some(user2)) = (
        payload.user1_id.as_deref().and_then(parse_id),
        payload.user2_id.as_deref().and_then(parse_id),
    ) else {
        return Err(ApiError::BadRequest(
            "user1Id and user2Id are required".to_string(),
        ));
    };
    let dispute = state
        .data
        .create_dispute(NewDispute {
            guild_id,
            user1_id: UserId::new(user1),
            user2_id: UserId::new(user2),
            created_by: session.username.clone(),
            created_by_role: Some(session.role.as_str().to_string()),
        })
        .await?;
    Ok(Json(json!({ "ok": true, "dispute": DisputeView::from(dispute) })))
}

async fn list_disputes(
    State(state): State<AppState>,
    ApiSession(_): ApiSession,
) -> ApiResult<Json<Value>> {
    let guild_id = state.guild()?;
    let disputes: Vec<DisputeView> = state
        .data
        .active_disputes(guild_id)
        .into_iter()
        .map(DisputeView::from)
        .collect();
    Ok(Json(json!({ "ok": true, "disputes": disputes })))
}

async fn delete_dispute(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !session.role.allows_punishments() {
        return Err(ApiError::forbidden());
    }
    let not_found = ApiError::NotFound("Dispute not found");
    let Ok(id) = Uuid::parse_str(&id) else {
        return Err(not_found);
    };
    match state.data.delete_dispute(id).await? {
        Some(_) => Ok(Json(json!({ "ok": true }))),
        None => Err(not_found),
    }
}

async fn delete_all_disputes(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
) -> ApiResult<Json<Value>> {
    if session.role != AccountRole::Owner {
        return Err(ApiError::Forbidden("Only owner can delete all disputes"));
    }
    let guild_id = state.guild()?;
    let deleted = state.data.delete_all_disputes(guild_id).await?;
    Ok(Json(json!({ "ok": true, "deletedCount": deleted })))
}

// Auto replies

fn replies_response(entries: &[AutoReply]) -> Json<Value> {
    let replies: Vec<AutoReplyView> = entries.iter().map(AutoReplyView::from).collect();
    Json(json!({ "ok": true, "replies": replies }))
}

async fn list_auto_replies(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
) -> ApiResult<Json<Value>> {
    require_owner(&session)?;
    let guild_id = state.guild()?;
    Ok(replies_response(&state.data.settings(guild_id).await.auto_replies))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AutoReplyPayload {
    id: Option<String>,
    trigger: Option<String>,
    match_type: Option<String>,
    response: Option<String>,
}

async fn save_auto_reply(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Json(payload): Json<AutoReplyPayload>,
) -> ApiResult<Json<Value>> {
    require_owner(&session)?;
    let guild_id = state.guild()?;
    let trigger = payload.trigger.unwrap_or_default().trim().to_string();
    let response = payload.response.unwrap_or_default().trim().to_string();
    if trigger.is_empty() || response.is_empty() {
        return Err(ApiError::BadRequest(
            "Trigger and response are required.".to_string(),
        ));
    }
    let entry = AutoReply {
        id: payload.id.unwrap_or_default(),
        trigger,
        match_mode: MatchMode::parse(payload.match_type.as_deref().unwrap_or_default()),
        response,
    };
    let entries = state
        .data
        .upsert_auto_reply(guild_id, entry, Some(&editor(&session)))
        .await?;
    Ok(replies_response(&entries))
}

async fn delete_auto_reply(
    State(state): State<AppState>,
    ApiSession(session): ApiSession,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    require_owner(&session)?;
    let guild_id = state.guild()?;
    if state
        .data
        .delete_auto_reply(guild_id, &id, Some(&editor(&session)))
        .await?
    {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(ApiError::NotFound("Auto reply not found"))
    }
}

// Status

async fn bot_stats(State(state): State<AppState>, ApiSession(_): ApiSession) -> Json<Value> {
    let stats = state.data.bot_stats(state.guild_id).await;
    let status = match state.guild_id {
        Some(guild_id) => Some(state.data.system_status(guild_id).await),
        None => None,
    };
    Json(json!({ "ok": true, "stats": stats, "status": status }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceActionView {
    user_id: String,
    tag: String,
    #[serde(rename = "type")]
    kind: &'static str,
    /// Unix milliseconds
    expires_at: i64,
}

impl From<TimedSanction> for VoiceActionView {
    fn from(sanction: TimedSanction) -> Self {
        Self {
            user_id: sanction.user_id.to_string(),
            tag: sanction.user_tag,
            kind: if sanction.kind == PunishmentKind::VoiceDeafen {
                "deafen"
            } else {
                "mute"
            },
            expires_at: sanction.expires_at.timestamp_millis(),
        }
    }
}

async fn voice_actions(
    State(state): State<AppState>,
    ApiSession(_): ApiSession,
) -> ApiResult<Json<Value>> {
    let guild_id = state.guild()?;
    let actions: Vec<VoiceActionView> = state
        .data
        .sanctions
        .for_guild(guild_id)
        .into_iter()
        .map(VoiceActionView::from)
        .collect();
    Ok(Json(json!({ "ok": true, "actions": actions })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_and_color_parsing() {
        assert_eq!(flag(Some(&json!(true))), Some(true));
        assert_eq!(flag(Some(&json!("false"))), Some(false));
        assert_eq!(flag(Some(&json!("maybe"))), None);
        assert_eq!(flag(None), None);

        assert_eq!(color(Some(&json!("#5b8cff"))), Some(0x5b8cff));
        assert_eq!(color(Some(&json!(16_711_680))), Some(0xff0000));
        assert_eq!(color(Some(&json!(0x0100_0000))), None);
    }

    #[test]
    fn test_duration_ms() {
        assert_eq!(duration_ms(Some(&json!("1h"))), Some(3_600_000));
        assert_eq!(duration_ms(Some(&json!(60_000))), Some(60_000));
        assert_eq!(duration_ms(Some(&json!("0"))), None);
        assert_eq!(duration_ms(Some(&json!("soon"))), None);
        assert_eq!(duration_ms(None), None);
    }

    #[test]
    fn test_embed_payload_drops_incomplete_fields() {
        let payload: EmbedPayload = serde_json::from_value(json!({
            "title": "Notice",
            "color": "#ff0000",
            "fields": [
                { "name": "Reason", "value": "<reason>", "inline": "true" },
                { "name": "", "value": "dropped" },
                { "name": "No value" }
            ]
        }))
        .unwrap();
        let template = payload.into_template(&EmbedTemplate::default());
        assert_eq!(template.title, "Notice");
        assert_eq!(template.color, Some(0xff0000));
        assert_eq!(template.fields, vec![EmbedField::new("Reason", "<reason>", true)]);

        // forms without a field list keep the current fields
        let current = EmbedTemplate::moderation_dm();
        let payload: EmbedPayload = serde_json::from_value(json!({ "title": "x" })).unwrap();
        assert_eq!(payload.into_template(&current).fields, current.fields);
    }

    #[test]
    fn test_settings_view_uses_form_names() {
        let mut settings = GuildSettings::new(poise::serenity_prelude::GuildId::new(5));
        settings.verify_admin_role_ids = parse_role_ids("1,2");
        let json = serde_json::to_value(SettingsView::from(settings)).unwrap();
        assert_eq!(json["guildId"], "5");
        assert_eq!(json["logChannelId"], "");
        assert_eq!(json["verifyAdminRoleIds"], "1,2");
        assert_eq!(json["tempVoiceEnabled"], false);
    }
}
