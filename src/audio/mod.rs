//! # Audio Module
//!
//! Queue and playback collaborators used by the gateway dispatcher.
//!
//! ### [`queue`] - Queue Management
//! - FIFO queue of requested tracks with per-requester shuffle
//! - Request metadata (user request or autoplay)
//!
//! ### [`player`] - Audio Player
//! - One [`player::GuildPlayer`] per guild, driving a songbird call
//! - [`player::PlayerManager`] owning every guild player and voice connection
//!
//! ### [`playlist`] - Default playlists
//! - Text playlists used to resume playback when the bot starts
//!
//! The dispatcher never talks to songbird directly: it goes through the
//! [`PlaybackControl`] and [`DefaultPlayback`] traits, which the
//! [`player::PlayerManager`] implements.

use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, UserId};

pub mod player;
pub mod playlist;
pub mod queue;

use queue::RequestMetadata;

/// Track en reproducción, capturado antes de cualquier cambio de estado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub metadata: RequestMetadata,
}

/// Operaciones que los botones del panel ejecutan sobre una guild.
#[async_trait]
pub trait PlaybackControl: Send + Sync {
    /// Existe un reproductor para la guild
    fn has_handler(&self, guild_id: GuildId) -> bool;

    /// Mezcla las entradas del usuario; devuelve cuántas tiene en cola
    fn shuffle(&self, guild_id: GuildId, user_id: UserId) -> usize;

    fn now_playing(&self, guild_id: GuildId) -> Option<NowPlaying>;

    /// Detiene el track actual; el reproductor avanza solo al siguiente
    fn stop_track(&self, guild_id: GuildId);

    fn stop_and_clear(&self, guild_id: GuildId);

    async fn close_connection(&self, guild_id: GuildId) -> Result<()>;
}

/// Reanudación de la playlist por defecto al arrancar.
#[async_trait]
pub trait DefaultPlayback: Send + Sync {
    /// Conectado, sonando o con cola pendiente
    fn is_active(&self, guild_id: GuildId) -> bool;

    /// Encola la playlist; `false` si no había nada que reproducir
    async fn play_from_default(&self, guild_id: GuildId, playlist: &str) -> Result<bool>;

    async fn open_connection(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()>;
}
