use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::PlaybackControl;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Detiene la música cuando el bot queda solo en un canal de voz.
pub struct AloneMonitor {
    timeout: Option<Duration>,
    alone_since: DashMap<GuildId, Instant>,
}

impl AloneMonitor {
    /// `None` desactiva el monitor
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            alone_since: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.timeout.is_some()
    }

    pub fn on_voice_update(&self, guild_id: GuildId, alone: bool) {
        if !self.is_enabled() {
            return;
        }

        if alone {
            if !self.alone_since.contains_key(&guild_id) {
                debug!("🚪 Bot solo en el canal de voz de guild {}", guild_id);
                self.alone_since.insert(guild_id, Instant::now());
            }
        } else if self.alone_since.remove(&guild_id).is_some() {
            debug!("👥 Bot acompañado de nuevo en guild {}", guild_id);
        }
    }

    /// Guilds que llevan solas más del tiempo configurado; se dejan de seguir
    pub fn take_expired(&self, now: Instant) -> Vec<GuildId> {
        let Some(timeout) = self.timeout else {
            return Vec::new();
        };

        let expired: Vec<GuildId> = self
            .alone_since
            .iter()
            .filter(|entry| now.saturating_duration_since(*entry.value()) >= timeout)
            .map(|entry| *entry.key())
            .collect();

        for guild_id in &expired {
            self.alone_since.remove(guild_id);
        }
        expired
    }

    pub fn spawn(
        self: Arc<Self>,
        playback: Arc<dyn PlaybackControl>,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if !self.is_enabled() {
            return None;
        }

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        for guild_id in self.take_expired(Instant::now()) {
                            info!("🚪 Deteniendo por inactividad en guild {}", guild_id);
                            playback.stop_and_clear(guild_id);
                            if let Err(e) = playback.close_connection(guild_id).await {
                                warn!("Error al salir del canal de voz en guild {}: {:?}", guild_id, e);
                            }
                        }
                    }
                }
            }
        }))
    }
}
