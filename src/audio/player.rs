use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serenity::model::id::{ChannelId, GuildId, UserId};
use songbird::{
    error::JoinError,
    input::{Compose, YoutubeDl},
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        playlist::PlaylistLoader,
        queue::{MusicQueue, QueueItem, RequestMetadata},
        DefaultPlayback, NowPlaying, PlaybackControl,
    },
    bot::nowplaying::NowPlayingTracker,
};

struct CurrentTrack {
    handle: TrackHandle,
    item: QueueItem,
}

/// Reproductor de una guild: cola, track actual y canal de anuncios.
pub struct GuildPlayer {
    guild_id: GuildId,
    songbird: Arc<Songbird>,
    http_client: reqwest::Client,
    playlists: PlaylistLoader,
    now_playing: Arc<NowPlayingTracker>,
    queue: RwLock<MusicQueue>,
    current: Mutex<Option<CurrentTrack>>,
    announce_channel: RwLock<Option<ChannelId>>,
    // Serializa el avance de la cola entre el fin de un track y un enqueue
    advancing: tokio::sync::Mutex<()>,
}

impl GuildPlayer {
    /// Agrega un track y arranca la reproducción si estaba detenida.
    /// Devuelve la posición en la cola.
    pub async fn enqueue(self: &Arc<Self>, item: QueueItem) -> Result<usize> {
        let position = self.queue.write().add(item)?;
        self.start_if_idle().await?;
        Ok(position)
    }

    /// Carga la playlist por defecto en la cola
    pub async fn play_from_default(&self, playlist: &str) -> Result<bool> {
        let playlist = self.playlists.load(playlist).await?;
        let items = playlist
            .entries
            .into_iter()
            .map(|entry| QueueItem::new(entry.clone(), entry, RequestMetadata::autoplay()));

        let added = self.queue.write().add_all(items);
        Ok(added > 0)
    }

    pub fn set_announce_channel(&self, channel_id: ChannelId) {
        *self.announce_channel.write() = Some(channel_id);
    }

    pub fn is_playing(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Nada sonando y nada en cola
    pub fn is_idle(&self) -> bool {
        !self.is_playing() && self.queue.read().is_empty()
    }

    pub fn now_playing(&self) -> Option<NowPlaying> {
        self.current.lock().as_ref().map(|current| NowPlaying {
            title: current.item.title.clone(),
            metadata: current.item.metadata.clone(),
        })
    }

    pub fn shuffle(&self, user_id: UserId) -> usize {
        self.queue.write().shuffle_for(user_id)
    }

    /// Detiene el track actual. El evento de fin del track avanza la cola.
    pub fn stop_track(&self) {
        if let Some(current) = self.current.lock().as_ref() {
            if let Err(e) = current.handle.stop() {
                warn!("No se pudo detener el track en guild {}: {:?}", self.guild_id, e);
            }
        }
    }

    /// Vacía la cola antes de detener el track, así el fin del track no
    /// encuentra nada que reproducir.
    pub fn stop_and_clear(&self) {
        self.queue.write().clear();

        if let Some(current) = self.current.lock().take() {
            if let Err(e) = current.handle.stop() {
                warn!("No se pudo detener el track en guild {}: {:?}", self.guild_id, e);
            }
        }

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }

    /// Arranca la cola sólo si no hay nada sonando
    pub async fn start_if_idle(self: &Arc<Self>) -> Result<bool> {
        self.advance(true).await
    }

    /// Reproduce la siguiente canción en la cola
    async fn play_next(self: &Arc<Self>) -> Result<bool> {
        self.advance(false).await
    }

    async fn advance(self: &Arc<Self>, only_if_idle: bool) -> Result<bool> {
        let _advancing = self.advancing.lock().await;
        if only_if_idle && self.is_playing() {
            return Ok(false);
        }

        let Some(call) = self.songbird.get(self.guild_id) else {
            debug!("Sin conexión de voz en guild {}", self.guild_id);
            *self.current.lock() = None;
            return Ok(false);
        };

        let next = self.queue.write().next();
        let Some(mut item) = next else {
            *self.current.lock() = None;
            return Ok(false);
        };

        let mut source = source_for(&self.http_client, &item.url);
        if !item.is_resolved() {
            match source.aux_metadata().await {
                Ok(meta) => {
                    item.title = meta.title.unwrap_or(item.title);
                    item.duration = meta.duration;
                }
                Err(e) => debug!("Sin metadata para {}: {:?}", item.url, e),
            }
        }

        info!("🎵 Reproduciendo: {} en guild {}", item.title, self.guild_id);
        let handle = call.lock().await.play_input(source.into());

        for event in [TrackEvent::End, TrackEvent::Error] {
            let advance = TrackEndHandler {
                player: Arc::downgrade(self),
            };
            if let Err(e) = handle.add_event(Event::Track(event), advance) {
                error!("Error al agregar event handler: {:?}", e);
            }
        }

        *self.current.lock() = Some(CurrentTrack {
            handle,
            item: item.clone(),
        });

        let announce_channel = *self.announce_channel.read();
        if let Some(channel_id) = announce_channel {
            if let Err(e) = self.now_playing.announce(self.guild_id, channel_id, &item).await {
                warn!("Error al enviar mensaje now playing: {:?}", e);
            }
        }

        Ok(true)
    }

    /// Avanza sólo si `ended` sigue siendo el track actual; un track detenido
    /// por `stop_and_clear` ya no lo es.
    async fn advance_after(self: &Arc<Self>, ended: &TrackHandle) {
        let is_current = self
            .current
            .lock()
            .as_ref()
            .map_or(false, |current| current.handle.uuid() == ended.uuid());
        if !is_current {
            return;
        }

        if let Err(e) = self.play_next().await {
            error!("Error al reproducir siguiente track: {:?}", e);
        }
    }
}

fn source_for(client: &reqwest::Client, query: &str) -> YoutubeDl<'static> {
    match url::Url::parse(query) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {
            YoutubeDl::new(client.clone(), query.to_string())
        }
        _ => YoutubeDl::new_search(client.clone(), query.to_string()),
    }
}

/// Handler para cuando termina (o falla) una canción
struct TrackEndHandler {
    player: Weak<GuildPlayer>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let EventContext::Track(tracks) = ctx else {
            return None;
        };
        let Some(player) = self.player.upgrade() else {
            return None;
        };

        for (_, handle) in tracks.iter() {
            let player = player.clone();
            let handle = (*handle).clone();
            tokio::spawn(async move {
                player.advance_after(&handle).await;
            });
        }

        None
    }
}

/// Dueño de todos los reproductores y conexiones de voz.
pub struct PlayerManager {
    songbird: Arc<Songbird>,
    http_client: reqwest::Client,
    playlists: PlaylistLoader,
    now_playing: Arc<NowPlayingTracker>,
    max_queue_size: usize,
    players: DashMap<GuildId, Arc<GuildPlayer>>,
}

impl PlayerManager {
    pub fn new(
        songbird: Arc<Songbird>,
        playlists: PlaylistLoader,
        now_playing: Arc<NowPlayingTracker>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            songbird,
            http_client: reqwest::Client::new(),
            playlists,
            now_playing,
            max_queue_size,
            players: DashMap::new(),
        }
    }

    /// Devuelve el reproductor de la guild, creándolo si no existe
    pub fn set_up_handler(&self, guild_id: GuildId) -> Arc<GuildPlayer> {
        self.players
            .entry(guild_id)
            .or_insert_with(|| {
                Arc::new(GuildPlayer {
                    guild_id,
                    songbird: self.songbird.clone(),
                    http_client: self.http_client.clone(),
                    playlists: self.playlists.clone(),
                    now_playing: self.now_playing.clone(),
                    queue: RwLock::new(MusicQueue::new(self.max_queue_size)),
                    current: Mutex::new(None),
                    announce_channel: RwLock::new(None),
                    advancing: tokio::sync::Mutex::new(()),
                })
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildPlayer>> {
        self.players.get(&guild_id).map(|p| p.clone())
    }

    /// Resuelve una URL o búsqueda con yt-dlp
    pub async fn resolve(&self, query: &str, metadata: RequestMetadata) -> Result<QueueItem> {
        let mut source = source_for(&self.http_client, query);
        let meta = source
            .aux_metadata()
            .await
            .map_err(|e| anyhow::anyhow!("No results for `{}`: {}", query, e))?;

        let url = meta.source_url.unwrap_or_else(|| query.to_string());
        let title = meta.title.unwrap_or_else(|| url.clone());
        Ok(QueueItem::new(title, url, metadata).with_duration(meta.duration))
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.songbird.get(guild_id).is_some()
    }

    /// Detiene todo y sale de todos los canales de voz
    pub async fn shutdown_all(&self) {
        let guilds: Vec<GuildId> = self.players.iter().map(|p| *p.key()).collect();
        for guild_id in guilds {
            self.stop_and_clear(guild_id);
            if let Err(e) = self.close_connection(guild_id).await {
                warn!("Error al salir del canal de voz en guild {}: {:?}", guild_id, e);
            }
        }
    }
}

#[async_trait]
impl PlaybackControl for PlayerManager {
    fn has_handler(&self, guild_id: GuildId) -> bool {
        self.players.contains_key(&guild_id)
    }

    fn shuffle(&self, guild_id: GuildId, user_id: UserId) -> usize {
        self.get(guild_id).map_or(0, |p| p.shuffle(user_id))
    }

    fn now_playing(&self, guild_id: GuildId) -> Option<NowPlaying> {
        self.get(guild_id)?.now_playing()
    }

    fn stop_track(&self, guild_id: GuildId) {
        if let Some(player) = self.get(guild_id) {
            player.stop_track();
        }
    }

    fn stop_and_clear(&self, guild_id: GuildId) {
        if let Some(player) = self.get(guild_id) {
            player.stop_and_clear();
        }
    }

    async fn close_connection(&self, guild_id: GuildId) -> Result<()> {
        match self.songbird.remove(guild_id).await {
            Ok(()) => {
                info!("👋 Desconectado del canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(JoinError::NoCall) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl DefaultPlayback for PlayerManager {
    fn is_active(&self, guild_id: GuildId) -> bool {
        self.is_connected(guild_id) || self.get(guild_id).map_or(false, |p| !p.is_idle())
    }

    async fn play_from_default(&self, guild_id: GuildId, playlist: &str) -> Result<bool> {
        self.set_up_handler(guild_id).play_from_default(playlist).await
    }

    async fn open_connection(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow::anyhow!("Error al conectar al canal de voz: {}", e))?;
        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        if let Some(player) = self.get(guild_id) {
            player.start_if_idle().await?;
        }

        Ok(())
    }
}
