use crate::autoreply::{self, IncomingMessage};
use crate::platform::VoiceUpdate;
use crate::tempvoice::{self, RENAME_INPUT_ID, TempVoiceComponent};
use crate::verify::{self, VerifyComponent};
use crate::{Data, EVENT_TARGET, SerenityPlatform};
use poise::serenity_prelude::{
    self as serenity, ActionRowComponent, ComponentInteraction, ComponentInteractionDataKind,
    Context, EventHandler, GuildId, Interaction, Message, MessageType, ModalInteraction, Ready,
    VoiceState,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Handler {
    pub data: Data,
}

impl Handler {
    #[must_use]
    pub fn new(data: Data) -> Self {
        Self { data }
    }
}

/// Which feature a component custom id belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentRoute {
    TempVoice(TempVoiceComponent),
    Verify(VerifyComponent),
}

impl ComponentRoute {
    #[must_use]
    pub fn parse(custom_id: &str) -> Option<Self> {
        TempVoiceComponent::parse(custom_id)
            .map(Self::TempVoice)
            .or_else(|| VerifyComponent::parse(custom_id).map(Self::Verify))
    }
}

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.data.set_platform(Arc::new(SerenityPlatform::new(
            ctx.http.clone(),
            ctx.cache.clone(),
        )));
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!("Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!("Cache ready! The bot is in {guild_count} guild(s)");
    }

    async fn voice_state_update(&self, _ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        if new.member.as_ref().is_some_and(|m| m.user.bot) {
            return;
        }
        let update = VoiceUpdate {
            guild_id,
            user_id: new.user_id,
            old_channel: old.and_then(|state| state.channel_id),
            new_channel: new.channel_id,
        };
        if update.joined().is_none() && update.left().is_none() {
            return;
        }
        debug!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            user_id = %update.user_id,
            old_channel = ?update.old_channel,
            new_channel = ?update.new_channel,
            event = "voice_state_update",
            "Voice state changed"
        );

        crate::disputes::on_voice_update(&self.data, &update).await;
        tempvoice::on_voice_update(&self.data, &update).await;
        verify::on_voice_update(&self.data, &update).await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Component(component) => self.on_component(&ctx, &component).await,
            Interaction::Modal(modal) => self.on_modal(&ctx, &modal).await,
            _ => {}
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let incoming = IncomingMessage {
            guild_id: msg.guild_id,
            channel_id: msg.channel_id,
            message_id: msg.id,
            author_id: msg.author.id,
            from_bot: msg.author.bot,
            system: !matches!(msg.kind, MessageType::Regular | MessageType::InlineReply),
            content: msg.content,
        };
        autoreply::on_message(&self.data, &incoming).await;
    }
}

impl Handler {
    async fn on_component(&self, ctx: &Context, component: &ComponentInteraction) {
        let custom_id = component.data.custom_id.as_str();
        let Some(route) = ComponentRoute::parse(custom_id) else {
            return;
        };
        let Some(guild_id) = component.guild_id else {
            return;
        };
        let user = component.user.id;
        info!(
            target: EVENT_TARGET,
            guild_id = %guild_id,
            user_id = %user,
            custom_id = %custom_id,
            event = "component",
            "Component interaction"
        );

        let reply = match route {
            ComponentRoute::TempVoice(TempVoiceComponent::Button(action, channel)) => {
                tempvoice::handle_button(&self.data, guild_id, user, action, channel).await
            }
            ComponentRoute::TempVoice(TempVoiceComponent::Select(op, channel)) => {
                let selected = match &component.data.kind {
                    ComponentInteractionDataKind::UserSelect { values } => values.first().copied(),
                    _ => None,
                };
                tempvoice::handle_select(&self.data, guild_id, user, op, channel, selected).await
            }
            // modal ids never arrive as components
            ComponentRoute::TempVoice(TempVoiceComponent::RenameModal(_)) => return,
            ComponentRoute::Verify(verify_component) => {
                let message = component.message.id;
                verify::handle_component(&self.data, guild_id, message, user, verify_component)
                    .await
            }
        };
        respond(component.create_response(&ctx.http, reply.to_response()).await, custom_id);
    }

    async fn on_modal(&self, ctx: &Context, modal: &ModalInteraction) {
        let custom_id = modal.data.custom_id.as_str();
        let Some(TempVoiceComponent::RenameModal(channel)) = TempVoiceComponent::parse(custom_id)
        else {
            return;
        };
        let value = modal
            .data
            .components
            .iter()
            .flat_map(|row| row.components.iter())
            .find_map(|component| match component {
                ActionRowComponent::InputText(input) if input.custom_id == RENAME_INPUT_ID => {
                    input.value.clone()
                }
                _ => None,
            })
            .unwrap_or_default();

        let reply = tempvoice::handle_rename(&self.data, modal.user.id, channel, &value).await;
        respond(modal.create_response(&ctx.http, reply.to_response()).await, custom_id);
    }
}

fn respond(result: serenity::Result<()>, custom_id: &str) {
    if let Err(e) = result {
        warn!(target: EVENT_TARGET, custom_id = %custom_id, "Failed to answer interaction: {e}");
    }
}
