use anyhow::Result;
use futures::future::join_all;
use serenity::{
    all::{
        ApplicationId, ChannelId, CommandInteraction, ComponentInteraction, Context,
        CreateInteractionResponse, GuildId, MessageId, Permissions, Ready, ShardManager, UserId,
        VoiceState,
    },
    http::Http,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, OnceLock,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{playlist::PlaylistLoader, player::PlayerManager, DefaultPlayback, PlaybackControl},
    bot::{
        alone::AloneMonitor,
        commands, compliance,
        controls::{ButtonPress, ControlHandler},
        maintenance::{DirectMessenger, GithubReleases, UpdateChecker, CHECK_INTERVAL},
        nowplaying::NowPlayingTracker,
    },
    config::Config,
    storage::JsonStorage,
    ui::panel::{ControlPanel, ControlRegistry, HttpTransport},
};

/// Eventos del gateway que el bot atiende
pub enum GatewayEvent {
    Ready {
        ctx: Context,
        ready: Ready,
    },
    Shutdown,
    GuildJoin {
        ctx: Context,
        guild_id: GuildId,
    },
    GuildMessageDelete {
        guild_id: GuildId,
        message_id: MessageId,
    },
    VoiceStateChange {
        ctx: Context,
        old: Option<VoiceState>,
        new: VoiceState,
    },
    ButtonPress {
        interaction: ComponentInteraction,
    },
    SlashCommand {
        ctx: Context,
        command: CommandInteraction,
    },
}

impl GatewayEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Shutdown => "shutdown",
            Self::GuildJoin { .. } => "guild_join",
            Self::GuildMessageDelete { .. } => "guild_message_delete",
            Self::VoiceStateChange { .. } => "voice_state_change",
            Self::ButtonPress { .. } => "button_press",
            Self::SlashCommand { .. } => "slash_command",
        }
    }
}

/// Despachador de eventos del gateway.
///
/// Dueño del registro de paneles y de los colaboradores que cada evento usa.
pub struct Router {
    pub(crate) config: Arc<Config>,
    pub(crate) http: Arc<Http>,
    pub(crate) storage: Arc<Mutex<JsonStorage>>,
    pub(crate) players: Arc<PlayerManager>,
    pub(crate) playlists: PlaylistLoader,
    pub(crate) panel: Arc<ControlPanel>,
    controls: ControlHandler,
    now_playing: Arc<NowPlayingTracker>,
    alone: Arc<AloneMonitor>,
    shutdown: CancellationToken,
    shard_manager: OnceLock<Arc<ShardManager>>,
    background_started: AtomicBool,
}

impl Router {
    pub fn new(
        config: Arc<Config>,
        http: Arc<Http>,
        storage: Arc<Mutex<JsonStorage>>,
        players: Arc<PlayerManager>,
        now_playing: Arc<NowPlayingTracker>,
        playlists: PlaylistLoader,
    ) -> Self {
        let registry = Arc::new(ControlRegistry::new());
        let transport = Arc::new(HttpTransport::new(http.clone()));
        let panel = Arc::new(ControlPanel::new(registry, transport));
        let controls = ControlHandler::new(players.clone(), panel.clone());
        let alone = Arc::new(AloneMonitor::new(config.alone_timeout()));

        Self {
            config,
            http,
            storage,
            players,
            playlists,
            panel,
            controls,
            now_playing,
            alone,
            shutdown: CancellationToken::new(),
            shard_manager: OnceLock::new(),
            background_started: AtomicBool::new(false),
        }
    }

    /// Necesario para que `Shutdown` pueda cerrar las conexiones al gateway
    pub fn attach_shard_manager(&self, shard_manager: Arc<ShardManager>) {
        if self.shard_manager.set(shard_manager).is_err() {
            warn!("Shard manager ya estaba registrado");
        }
    }

    pub async fn dispatch(&self, event: GatewayEvent) {
        debug!("📨 Evento {}", event.kind());

        match event {
            GatewayEvent::Ready { ctx, ready } => self.on_ready(&ctx, ready).await,
            GatewayEvent::Shutdown => self.on_shutdown().await,
            GatewayEvent::GuildJoin { ctx, guild_id } => {
                info!("🏠 Agregado a guild {}", guild_id);
                compliance::check(&ctx.cache.guilds(), self.config.allow_bot_listing);
            }
            GatewayEvent::GuildMessageDelete {
                guild_id,
                message_id,
            } => {
                self.now_playing.on_message_delete(guild_id, message_id);
            }
            GatewayEvent::VoiceStateChange { ctx, old, new } => {
                self.on_voice_state_update(&ctx, old, new).await
            }
            GatewayEvent::ButtonPress { interaction } => self.on_button_press(interaction).await,
            GatewayEvent::SlashCommand { ctx, command } => {
                if let Err(e) = commands::handle_command(self, &ctx, command).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
        }
    }

    async fn on_ready(&self, ctx: &Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        let guilds: Vec<GuildId> = ready.guilds.iter().map(|g| g.id).collect();
        if guilds.is_empty() {
            warn!("This bot is not on any guilds! Use the following link to add the bot to your guilds!");
            warn!("{}", invite_url(ready.application.id));
        }

        compliance::check(&guilds, self.config.allow_bot_listing);

        let dev_guild = self.config.dev_guild_id.map(GuildId::new);
        if let Err(e) = commands::register(&ctx.http, dev_guild).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // Reanudar es best-effort: cada resultado se registra y se descarta
        let playback: &dyn DefaultPlayback = &*self.players;
        let resumed = join_all(
            guilds
                .iter()
                .map(|guild_id| resume_default_playback(&self.storage, playback, *guild_id)),
        )
        .await;
        for (guild_id, result) in guilds.iter().zip(resumed) {
            match result {
                Ok(true) => info!("▶️ Playlist por defecto reanudada en guild {}", guild_id),
                Ok(false) => {}
                Err(e) => debug!("No se pudo reanudar en guild {}: {:?}", guild_id, e),
            }
        }

        // `ready` se repite en cada reconexión; las tareas se lanzan una vez
        if !self.background_started.swap(true, Ordering::SeqCst) {
            self.start_background_tasks();
        }
    }

    fn start_background_tasks(&self) {
        if self.config.update_alerts {
            let checker = UpdateChecker::new(
                Arc::new(GithubReleases::new(self.config.update_repository.clone())),
                Arc::new(DirectMessenger::new(self.http.clone())),
                UserId::new(self.config.owner_id),
                self.config.update_repository.clone(),
            );
            checker.spawn(CHECK_INTERVAL, self.shutdown.clone());
            info!("🔔 Alertas de actualización activadas");
        }

        let playback: Arc<dyn PlaybackControl> = self.players.clone();
        if self
            .alone
            .clone()
            .spawn(playback, self.shutdown.clone())
            .is_some()
        {
            info!("🚪 Monitor de canal vacío activado");
        }
    }

    async fn on_shutdown(&self) {
        info!("⚠️ Cerrando...");
        let registry = self.panel.registry();
        if !registry.is_empty() {
            debug!("🎛️ {} paneles activos al cerrar", registry.len());
        }
        self.shutdown.cancel();
        self.players.shutdown_all().await;

        match self.shard_manager.get() {
            Some(shard_manager) => shard_manager.shutdown_all().await,
            None => warn!("Sin shard manager, no se cierran los shards"),
        }
    }

    async fn on_voice_state_update(&self, ctx: &Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let bot_id = ctx.cache.current_user().id;

        // Bot desconectado a mano: limpiar estado
        if new.user_id == bot_id && old.is_some() && new.channel_id.is_none() {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.players.stop_and_clear(guild_id);
            self.now_playing.forget(guild_id);
        }

        let alone = {
            let Some(guild) = ctx.cache.guild(guild_id) else {
                return;
            };
            let bot_channel = guild.voice_states.get(&bot_id).and_then(|vs| vs.channel_id);
            bot_channel.map_or(false, |channel| {
                alone_in(
                    channel,
                    bot_id,
                    guild.voice_states.values().map(|vs| {
                        let is_bot = vs.member.as_ref().map_or(false, |m| m.user.bot);
                        (vs.channel_id, vs.user_id, is_bot)
                    }),
                )
            })
        };

        self.alone.on_voice_update(guild_id, alone);
    }

    async fn on_button_press(&self, interaction: ComponentInteraction) {
        let http = self.http.clone();
        let Some(guild_id) = interaction.guild_id else {
            if let Err(e) = interaction
                .create_response(&*http, CreateInteractionResponse::Acknowledge)
                .await
            {
                warn!("No se pudo reconocer la interacción: {:?}", e);
            }
            return;
        };

        let press = ButtonPress {
            guild_id,
            channel_id: interaction.channel_id,
            user_id: interaction.user.id,
            custom_id: interaction.data.custom_id.clone(),
        };

        self.controls
            .handle(&press, move || async move {
                interaction
                    .create_response(&*http, CreateInteractionResponse::Acknowledge)
                    .await
                    .map_err(Into::into)
            })
            .await;
    }
}

/// Encola la playlist por defecto y se conecta al canal configurado.
///
/// `Ok(false)` cuando la guild ya tiene reproducción activa, no tiene ambos
/// valores configurados o la playlist está vacía. `ready` se repite tras cada
/// reconexión y una guild activa no se vuelve a encolar.
pub async fn resume_default_playback(
    storage: &Mutex<JsonStorage>,
    playback: &dyn DefaultPlayback,
    guild_id: GuildId,
) -> Result<bool> {
    if playback.is_active(guild_id) {
        debug!("Guild {} ya está reproduciendo, no se reanuda", guild_id);
        return Ok(false);
    }

    let settings = storage.lock().await.guild_settings(guild_id);
    let (Some(playlist), Some(channel_id)) = (settings.default_playlist.clone(), settings.voice_channel())
    else {
        return Ok(false);
    };

    if !playback.play_from_default(guild_id, &playlist).await? {
        return Ok(false);
    }

    playback.open_connection(guild_id, channel_id).await?;
    Ok(true)
}

/// `true` si nadie más que bots escucha en `channel`
fn alone_in(
    channel: ChannelId,
    bot_id: UserId,
    states: impl IntoIterator<Item = (Option<ChannelId>, UserId, bool)>,
) -> bool {
    !states
        .into_iter()
        .any(|(state_channel, user_id, is_bot)| {
            state_channel == Some(channel) && user_id != bot_id && !is_bot
        })
}

fn recommended_permissions() -> Permissions {
    Permissions::VIEW_CHANNEL
        | Permissions::SEND_MESSAGES
        | Permissions::READ_MESSAGE_HISTORY
        | Permissions::ADD_REACTIONS
        | Permissions::EMBED_LINKS
        | Permissions::ATTACH_FILES
        | Permissions::MANAGE_MESSAGES
        | Permissions::USE_EXTERNAL_EMOJIS
        | Permissions::CONNECT
        | Permissions::SPEAK
        | Permissions::USE_APPLICATION_COMMANDS
}

pub fn invite_url(application_id: ApplicationId) -> String {
    format!(
        "https://discord.com/oauth2/authorize?client_id={}&scope={}&permissions={}",
        application_id,
        urlencoding::encode("bot applications.commands"),
        recommended_permissions().bits()
    )
}
