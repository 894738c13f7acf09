use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{audio::queue::QueueItem, ui::embeds};

/// Mensaje de "Now Playing" vigente por guild.
pub struct NowPlayingTracker {
    http: Arc<Http>,
    messages: DashMap<GuildId, (ChannelId, MessageId)>,
}

impl NowPlayingTracker {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            messages: DashMap::new(),
        }
    }

    /// Publica el track actual, editando el mensaje anterior si sigue en el
    /// mismo canal.
    pub async fn announce(&self, guild_id: GuildId, channel_id: ChannelId, item: &QueueItem) -> Result<()> {
        let embed = embeds::create_now_playing_embed(item);

        if let Some((bound_channel, message_id)) = self.get(guild_id) {
            if bound_channel == channel_id {
                let edited = channel_id
                    .edit_message(&self.http, message_id, EditMessage::new().embed(embed.clone()))
                    .await;
                match edited {
                    Ok(_) => return Ok(()),
                    Err(e) => debug!("No se pudo editar now playing en guild {}: {:?}", guild_id, e),
                }
            }
        }

        let message = channel_id
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await?;
        self.messages.insert(guild_id, (channel_id, message.id));

        Ok(())
    }

    pub fn get(&self, guild_id: GuildId) -> Option<(ChannelId, MessageId)> {
        self.messages.get(&guild_id).map(|entry| *entry)
    }

    /// Olvida el mensaje de la guild si el borrado corresponde a él.
    pub fn on_message_delete(&self, guild_id: GuildId, message_id: MessageId) -> bool {
        let removed = self
            .messages
            .remove_if(&guild_id, |_, (_, bound)| *bound == message_id)
            .is_some();
        if removed {
            info!("🗑️ Mensaje now playing borrado en guild {}", guild_id);
        }
        removed
    }

    pub fn forget(&self, guild_id: GuildId) {
        self.messages.remove(&guild_id);
    }

    #[cfg(test)]
    pub(crate) fn bind(&self, guild_id: GuildId, channel_id: ChannelId, message_id: MessageId) {
        self.messages.insert(guild_id, (channel_id, message_id));
    }
}
