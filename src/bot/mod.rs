//! # Bot Module
//!
//! Discord side of Panel Music: gateway events, slash commands, the control
//! panel buttons and the background tasks started on `ready`.
//!
//! ## Architecture
//!
//! [`PanelMusicBot`] implements Serenity's [`EventHandler`] trait and does
//! nothing but translate each callback into a [`GatewayEvent`]. The
//! [`Router`] owns the collaborators and handles every event kind in a single
//! exhaustive `match`:
//!
//! - [`controls`] - Shuffle / Skip / Clear button presses
//! - [`commands`] - `/play`, `/setvc`, `/autoplaylist`
//! - [`nowplaying`] - one "now playing" message per guild
//! - [`alone`] - stops playback when nobody is listening
//! - [`maintenance`] - daily update alerts for the owner
//! - [`compliance`] - bot listing guild check
//!
//! ## Example
//!
//! ```rust,no_run
//! let router = Arc::new(Router::new(config, http, storage, players, now_playing, playlists));
//! let mut client = Client::builder(&token, intents)
//!     .event_handler(PanelMusicBot::new(router.clone()))
//!     .await?;
//! router.attach_shard_manager(client.shard_manager.clone());
//! ```

use serenity::{
    all::{
        ChannelId, Context, EventHandler, Guild, GuildId, Interaction, MessageId, Ready,
        VoiceState,
    },
    async_trait,
};
use std::sync::Arc;
use tracing::debug;

pub mod alone;
pub mod commands;
pub mod compliance;
pub mod controls;
pub mod events;
pub mod maintenance;
pub mod nowplaying;

pub use events::{GatewayEvent, Router};

/// Adaptador entre Serenity y el [`Router`].
pub struct PanelMusicBot {
    router: Arc<Router>,
}

impl PanelMusicBot {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for PanelMusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.router.dispatch(GatewayEvent::Ready { ctx, ready }).await;
    }

    /// Sólo las guilds nuevas; las que llegan al conectar ya vienen en `ready`
    async fn guild_create(&self, ctx: Context, guild: Guild, is_new: Option<bool>) {
        if is_new == Some(true) {
            self.router
                .dispatch(GatewayEvent::GuildJoin {
                    ctx,
                    guild_id: guild.id,
                })
                .await;
        }
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        _channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id else {
            return;
        };

        self.router
            .dispatch(GatewayEvent::GuildMessageDelete {
                guild_id,
                message_id: deleted_message_id,
            })
            .await;
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        self.router
            .dispatch(GatewayEvent::VoiceStateChange { ctx, old, new })
            .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                self.router
                    .dispatch(GatewayEvent::SlashCommand { ctx, command })
                    .await
            }
            Interaction::Component(interaction) => {
                self.router
                    .dispatch(GatewayEvent::ButtonPress { interaction })
                    .await
            }
            other => debug!("Interacción ignorada: {:?}", other.kind()),
        }
    }
}
