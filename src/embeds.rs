//! Embed templates and their rendering.
//!
//! Templates are stored in guild settings and edited from the dashboard. They carry
//! `<placeholder>` tokens which are substituted when an embed is built. Rendering
//! produces an [`EmbedSpec`], a platform-neutral value that converts into a
//! serenity [`CreateEmbed`].

use crate::moderation::PunishmentKind;
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter, Timestamp};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DM_COLOR: u32 = 0xff3b3b;
pub const DISPUTE_COLOR: u32 = 0xff6b6b;
pub const VERIFY_COLOR: u32 = 0x5b8cff;
pub const VERIFIED_COLOR: u32 = 0x27c093;
pub const TEMP_VOICE_COLOR: u32 = 0x5b8cff;

/// One field of an embed template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

/// Editable embed template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedTemplate {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<u32>,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
}

impl EmbedTemplate {
    /// Template used for moderation DMs
    #[must_use]
    pub fn moderation_dm() -> Self {
        Self {
            title: "Moderation Notice".to_string(),
            description: "You have received an action in <servername>.".to_string(),
            color: Some(DEFAULT_DM_COLOR),
            fields: default_dm_fields(),
        }
    }

    #[must_use]
    pub fn dispute() -> Self {
        Self {
            title: "Dispute Notice".to_string(),
            description: "You have been disconnected due to an active dispute.".to_string(),
            color: Some(DISPUTE_COLOR),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn verify() -> Self {
        Self {
            title: "Verification Request".to_string(),
            description: "<user> wants to verify in <channel>.".to_string(),
            color: Some(VERIFY_COLOR),
            fields: Vec::new(),
        }
    }
}

/// The fields a moderation DM gets when none are configured
#[must_use]
pub fn default_dm_fields() -> Vec<EmbedField> {
    vec![
        EmbedField::new("📋 Action Type", "**<action>**", true),
        EmbedField::new("👤 Moderator", "<actor>", true),
        EmbedField::new("📝 Reason", "<reason>", false),
    ]
}

/// Values substituted for `<key>` tokens
#[derive(Debug, Clone, Default)]
pub struct Placeholders(Vec<(String, String)>);

impl Placeholders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace every `<key>` occurrence in `text`
    #[must_use]
    pub fn apply(&self, text: &str) -> String {
        self.0.iter().fold(text.to_string(), |acc, (key, value)| {
            acc.replace(&format!("<{key}>"), value)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A fully rendered embed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedSpec {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<FieldSpec>,
    pub footer: Option<String>,
}

impl EmbedSpec {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            color,
            fields: Vec::new(),
            footer: None,
        }
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(FieldSpec {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    #[must_use]
    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(text.into());
        self
    }

    /// Build the serenity embed, stamped with the current time
    #[must_use]
    pub fn to_create_embed(&self) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(&self.title)
            .description(&self.description)
            .colour(self.color)
            .timestamp(Timestamp::now());
        for field in &self.fields {
            embed = embed.field(&field.name, &field.value, field.inline);
        }
        if let Some(footer) = &self.footer {
            embed = embed.footer(CreateEmbedFooter::new(footer));
        }
        embed
    }
}

/// Render a template, falling back to the given title / description / color
/// when the template leaves them empty.
#[must_use]
pub fn render_template(
    template: &EmbedTemplate,
    placeholders: &Placeholders,
    fallback_title: &str,
    fallback_description: &str,
    fallback_color: u32,
) -> EmbedSpec {
    let title = non_empty(placeholders.apply(&template.title))
        .unwrap_or_else(|| fallback_title.to_string());
    let description = non_empty(placeholders.apply(&template.description))
        .unwrap_or_else(|| placeholders.apply(fallback_description));

    let mut spec = EmbedSpec::new(title, description, template.color.unwrap_or(fallback_color));
    spec.fields = render_fields(&template.fields, placeholders);
    spec
}

fn render_fields(fields: &[EmbedField], placeholders: &Placeholders) -> Vec<FieldSpec> {
    fields
        .iter()
        .filter_map(|field| {
            let name = placeholders.apply(&field.name);
            let value = placeholders.apply(&field.value);
            (!name.is_empty() && !value.is_empty()).then_some(FieldSpec {
                name,
                value,
                inline: field.inline,
            })
        })
        .collect()
}

fn non_empty(text: String) -> Option<String> {
    (!text.trim().is_empty()).then_some(text)
}

/// Moderation DM sent to the target of a punishment.
///
/// Expected placeholders: `reason`, `duration`, `servername`, `user`, `actor`.
#[must_use]
pub fn moderation_dm(
    template: &EmbedTemplate,
    placeholders: &Placeholders,
    kind: PunishmentKind,
) -> EmbedSpec {
    let placeholders = placeholders.clone().with("action", kind.display_name());
    let mut spec = render_template(
        template,
        &placeholders,
        &format!("{} Moderation Notice", kind.emoji()),
        &format!("You have received a **{}** in the server.", kind.display_name()),
        kind.color(),
    );

    if template.fields.is_empty() {
        spec = spec
            .field("📋 Action Type", format!("**{}**", kind.display_name()), true)
            .field(
                "👤 Moderator",
                placeholders.get("actor").unwrap_or("System").to_string(),
                true,
            )
            .field(
                "📝 Reason",
                placeholders
                    .get("reason")
                    .unwrap_or("No reason provided")
                    .to_string(),
                false,
            );
    }

    if let Some(duration) = placeholders.get("duration").filter(|d| *d != "N/A") {
        let mentions_duration = template.fields.iter().any(|f| {
            placeholders.apply(&f.name).to_lowercase().contains("duration")
                || f.value.contains("<duration>")
        });
        if !mentions_duration {
            spec = spec.field("⏱️ Duration", duration.to_string(), true);
        }
    }

    let server = placeholders.get("servername").unwrap_or("Server");
    spec.footer(format!("{} • {server}", kind.display_name()))
}

/// DM sent to a user disconnected because of a dispute.
///
/// Expected placeholders: `dispute`, `user`, `server`.
#[must_use]
pub fn dispute_dm(template: &EmbedTemplate, placeholders: &Placeholders) -> EmbedSpec {
    let mut spec = render_template(
        template,
        placeholders,
        "Dispute Notice",
        "You have been disconnected due to an active dispute.",
        DISPUTE_COLOR,
    );
    if template.fields.is_empty() {
        spec = spec
            .field(
                "⚠️ Dispute Active",
                placeholders.get("dispute").unwrap_or("Active dispute").to_string(),
                false,
            )
            .field(
                "📋 Server",
                placeholders.get("server").unwrap_or("Unknown").to_string(),
                true,
            );
    }
    spec
}

/// Verification request embed.
///
/// Expected placeholders: `user`, `channel`, `admin`.
#[must_use]
pub fn verify_request(template: &EmbedTemplate, placeholders: &Placeholders) -> EmbedSpec {
    render_template(
        template,
        placeholders,
        "Verification Request",
        "<user> wants to verify in <channel>.",
        VERIFY_COLOR,
    )
}

/// Control panel posted in a freshly created temp voice channel
#[must_use]
pub fn temp_voice_controls(template: &EmbedTemplate, owner: &str, channel_name: &str) -> EmbedSpec {
    let placeholders = Placeholders::new()
        .with("owner", owner)
        .with("channel", channel_name);
    render_template(
        template,
        &placeholders,
        "Temp Voice Controls",
        &format!("Owner: {owner}, Channel: {channel_name}"),
        TEMP_VOICE_COLOR,
    )
}

/// Notice DM'd to someone refused entry to a temp voice channel
#[must_use]
pub fn temp_voice_notice(template: &EmbedTemplate, fallback: &str) -> EmbedSpec {
    render_template(template, &Placeholders::new(), "Voice Notice", fallback, DISPUTE_COLOR)
}

/// One moderation action, as posted to the punishment log channel
#[derive(Debug, Clone)]
pub struct ModerationLogEntry<'a> {
    pub kind: PunishmentKind,
    pub target_tag: &'a str,
    pub target_id: u64,
    pub reason: &'a str,
    pub actor_name: &'a str,
    pub actor_role: &'a str,
    pub duration_ms: u64,
    pub warn_count: u32,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[must_use]
pub fn moderation_log(entry: &ModerationLogEntry<'_>) -> EmbedSpec {
    let kind = entry.kind.as_str();
    let mut spec = EmbedSpec::new(
        format!("🔨 Moderation Action: {}", kind.to_uppercase()),
        format!(
            "**Target:** {} ({})\n**Action:** {kind}\n**Reason:** {}",
            entry.target_tag, entry.target_id, entry.reason
        ),
        entry.kind.color(),
    )
    .field(
        "👤 Moderator",
        format!("{} ({})", entry.actor_name, entry.actor_role),
        true,
    )
    .field("🕐 Time", format!("<t:{}:F>", entry.at.timestamp()), true)
    .footer(format!("Case ID: {}", entry.at.timestamp_millis()));

    if entry.duration_ms > 0 {
        spec = spec.field(
            "⏱️ Duration",
            crate::duration::format_long(entry.duration_ms),
            true,
        );
    }
    if entry.warn_count > 0 {
        spec = spec.field("⚠️ Warning Count", entry.warn_count.to_string(), true);
    }
    spec
}

/// Posted to the dispute log channel when a disputed user is disconnected
#[must_use]
pub fn dispute_log(
    user_id: u64,
    other_id: u64,
    channel_name: &str,
    channel_id: u64,
    pair: (&str, &str),
    disconnect_count: u32,
) -> EmbedSpec {
    EmbedSpec::new(
        "⚠️ Dispute Disconnect",
        format!(
            "User <@{user_id}> was disconnected from {channel_name} due to an active dispute with <@{other_id}>"
        ),
        DISPUTE_COLOR,
    )
    .field("Dispute", format!("{} ↔ {}", pair.0, pair.1), true)
    .field("Channel", format!("<#{channel_id}>"), true)
    .field("Disconnect Count", disconnect_count.to_string(), true)
}

/// Posted to the temp voice log channel on creation and deletion
#[must_use]
pub fn temp_voice_log(created: bool, channel_name: &str, owner_id: u64) -> EmbedSpec {
    let (title, color) = if created {
        ("🎧 Temp Voice Created", VERIFIED_COLOR)
    } else {
        ("🗑️ Temp Voice Deleted", DISPUTE_COLOR)
    };
    EmbedSpec::new(title, format!("**Channel:** {channel_name}"), color)
        .field("Owner", format!("<@{owner_id}>"), true)
}

/// Parse a color as entered in the dashboard: `#5b8cff`, `0x5b8cff` or decimal
#[must_use]
pub fn parse_color(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#').or_else(|| raw.strip_prefix("0x")) {
        return u32::from_str_radix(hex, 16).ok().filter(|c| *c <= 0x00ff_ffff);
    }
    raw.parse::<u32>().ok().filter(|c| *c <= 0x00ff_ffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn punishment_placeholders() -> Placeholders {
        Placeholders::new()
            .with("reason", "spam")
            .with("duration", "N/A")
            .with("servername", "Guild")
            .with("user", "<@1>")
            .with("actor", "alice")
    }

    #[test]
    fn test_placeholders_apply() {
        let placeholders = Placeholders::new().with("user", "<@42>").with("server", "Home");
        assert_eq!(
            placeholders.apply("<user> joined <server>, welcome <user>"),
            "<@42> joined Home, welcome <@42>"
        );
        assert_eq!(placeholders.apply("<unknown>"), "<unknown>");
    }

    #[test]
    fn test_render_drops_empty_fields() {
        let template = EmbedTemplate {
            title: String::new(),
            description: "<user>".to_string(),
            color: None,
            fields: vec![
                EmbedField::new("Who", "<user>", true),
                EmbedField::new("Empty", "<missing-but-empty>", false),
                EmbedField::new("<blank>", "value", false),
            ],
        };
        let placeholders = Placeholders::new()
            .with("user", "bob")
            .with("missing-but-empty", "")
            .with("blank", "");
        let spec = render_template(&template, &placeholders, "Fallback", "desc", 7);
        assert_eq!(spec.title, "Fallback");
        assert_eq!(spec.description, "bob");
        assert_eq!(spec.color, 7);
        assert_eq!(spec.fields.len(), 1);
        assert_eq!(spec.fields[0].value, "bob");
    }

    #[test]
    fn test_moderation_dm_default_template() {
        let spec = moderation_dm(
            &EmbedTemplate::moderation_dm(),
            &punishment_placeholders(),
            PunishmentKind::Warn,
        );
        assert_eq!(spec.title, "Moderation Notice");
        assert_eq!(spec.description, "You have received an action in Guild.");
        assert_eq!(spec.color, DEFAULT_DM_COLOR);
        assert_eq!(spec.fields[0].value, "**Warning**");
        assert_eq!(spec.fields[1].value, "alice");
        assert_eq!(spec.fields[2].value, "spam");
        assert_eq!(spec.footer.as_deref(), Some("Warning • Guild"));
    }

    #[test]
    fn test_moderation_dm_adds_duration_field() {
        let placeholders = punishment_placeholders().with("duration", "1 hour");
        let spec = moderation_dm(
            &EmbedTemplate::moderation_dm(),
            &placeholders,
            PunishmentKind::Timeout,
        );
        assert!(spec.fields.iter().any(|f| f.name.contains("Duration") && f.value == "1 hour"));

        // A template that already shows the duration doesn't get a second field
        let mut template = EmbedTemplate::moderation_dm();
        template.fields.push(EmbedField::new("For", "<duration>", true));
        let spec = moderation_dm(&template, &placeholders, PunishmentKind::Timeout);
        assert_eq!(spec.fields.iter().filter(|f| f.value == "1 hour").count(), 1);
    }

    #[test]
    fn test_moderation_dm_without_fields_uses_fallbacks() {
        let template = EmbedTemplate::default();
        let spec = moderation_dm(&template, &punishment_placeholders(), PunishmentKind::Ban);
        assert_eq!(spec.title, "🔨 Moderation Notice");
        assert_eq!(spec.color, PunishmentKind::Ban.color());
        assert_eq!(spec.fields.len(), 3);
    }

    #[test]
    fn test_dispute_dm_default_fields() {
        let placeholders = Placeholders::new()
            .with("dispute", "Dispute between a and b")
            .with("user", "<@1>")
            .with("server", "Guild");
        let spec = dispute_dm(&EmbedTemplate::dispute(), &placeholders);
        assert_eq!(spec.title, "Dispute Notice");
        assert_eq!(spec.fields[0].value, "Dispute between a and b");
        assert_eq!(spec.fields[1].value, "Guild");
    }

    #[test]
    fn test_temp_voice_controls() {
        let template = EmbedTemplate {
            description: "<owner> owns <channel>".to_string(),
            ..Default::default()
        };
        let spec = temp_voice_controls(&template, "<@5>", "🎧・bob");
        assert_eq!(spec.title, "Temp Voice Controls");
        assert_eq!(spec.description, "<@5> owns 🎧・bob");
    }

    #[test]
    fn test_moderation_log() {
        let at = chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let entry = ModerationLogEntry {
            kind: PunishmentKind::VoiceMute,
            target_tag: "bob",
            target_id: 5,
            reason: "No reason provided",
            actor_name: "alice",
            actor_role: "admin",
            duration_ms: 60_000,
            warn_count: 0,
            at,
        };
        let spec = moderation_log(&entry);
        assert_eq!(spec.title, "🔨 Moderation Action: VOICE_MUTE");
        assert!(spec.description.contains("**Target:** bob (5)"));
        assert_eq!(spec.color, PunishmentKind::VoiceMute.color());
        assert_eq!(spec.fields[0].value, "alice (admin)");
        assert_eq!(spec.fields[1].value, "<t:1700000000:F>");
        assert_eq!(spec.fields[2].value, "1 minute");
        assert_eq!(spec.fields.len(), 3);
        assert_eq!(spec.footer.as_deref(), Some("Case ID: 1700000000000"));
    }

    #[test]
    fn test_dispute_log() {
        let spec = dispute_log(1, 2, "General", 3, ("a", "b"), 4);
        assert!(spec.description.contains("<@1>"));
        assert!(spec.description.contains("<@2>"));
        assert_eq!(spec.fields[0].value, "a ↔ b");
        assert_eq!(spec.fields[1].value, "<#3>");
        assert_eq!(spec.fields[2].value, "4");
    }

    #[test]
    fn test_parse_color() {
        assert_eq!(parse_color("#5b8cff"), Some(0x5b8cff));
        assert_eq!(parse_color("0xff0000"), Some(0xff0000));
        assert_eq!(parse_color("16777215"), Some(0xffffff));
        assert_eq!(parse_color("#zzzzzz"), None);
        assert_eq!(parse_color("99999999"), None);
    }
}
