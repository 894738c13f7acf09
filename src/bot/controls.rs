use anyhow::Result;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{future::Future, sync::Arc};
use tracing::{debug, info, warn};

use crate::{
    audio::{queue::Requester, PlaybackControl},
    ui::{buttons::button_ids, panel::ControlPanel},
};

/// Botón del panel decodificado desde su `custom_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionCommand {
    Shuffle,
    Skip,
    Clear,
    Unknown(String),
}

impl InteractionCommand {
    pub fn from_custom_id(custom_id: &str) -> Self {
        match custom_id {
            button_ids::SHUFFLE => Self::Shuffle,
            button_ids::SKIP => Self::Skip,
            button_ids::CLEAR => Self::Clear,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// Resultado de mezclar las entradas de un usuario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShuffleOutcome {
    Empty,
    Single,
    Shuffled(usize),
}

impl ShuffleOutcome {
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Empty,
            1 => Self::Single,
            n => Self::Shuffled(n),
        }
    }

    fn message(self) -> String {
        match self {
            Self::Empty => "You don't have any music in the queue to shuffle!".to_string(),
            Self::Single => "You only have one song in the queue!".to_string(),
            Self::Shuffled(n) => format!("You successfully shuffled your {} entries.", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub text: String,
    pub success: bool,
}

impl CommandOutcome {
    fn done(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }

    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: false,
        }
    }
}

pub const NOTHING_TO_SKIP: &str = "There is no track currently playing to skip.";
pub const NOTHING_TO_CLEAR: &str = "There is no active player to stop or clear.";
pub const CLEARED: &str = "The player has stopped and the queue has been cleared.";
pub const UNKNOWN_CONTROL: &str = "How'd you even get here?";

/// Pulsación de un botón, ya separada de la interacción de Discord
#[derive(Debug, Clone)]
pub struct ButtonPress {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub custom_id: String,
}

/// Ejecuta los botones del panel y publica el resultado.
pub struct ControlHandler {
    playback: Arc<dyn PlaybackControl>,
    panel: Arc<ControlPanel>,
}

impl ControlHandler {
    pub fn new(playback: Arc<dyn PlaybackControl>, panel: Arc<ControlPanel>) -> Self {
        Self { playback, panel }
    }

    /// Decodifica, ejecuta y publica; después reconoce la interacción.
    ///
    /// Publicar y reconocer son independientes: si uno falla se registra y el
    /// otro se hace igual. `acknowledge` se llama exactamente una vez.
    pub async fn handle<F, Fut>(&self, press: &ButtonPress, acknowledge: F) -> CommandOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let command = InteractionCommand::from_custom_id(&press.custom_id);
        info!(
            "🔘 Botón {:?} presionado por {} en guild {}",
            command, press.user_id, press.guild_id
        );

        let outcome = self.execute(press.guild_id, press.user_id, &command).await;

        if let Err(e) = self.panel.publish(press.channel_id, &outcome.text).await {
            warn!("No se pudo publicar el panel en canal {}: {:?}", press.channel_id, e);
        }

        if let Err(e) = acknowledge().await {
            warn!("No se pudo reconocer la interacción: {:?}", e);
        }

        outcome
    }

    pub async fn execute(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        command: &InteractionCommand,
    ) -> CommandOutcome {
        match command {
            InteractionCommand::Shuffle => {
                let outcome = ShuffleOutcome::from_count(self.playback.shuffle(guild_id, user_id));
                CommandOutcome {
                    text: outcome.message(),
                    success: matches!(outcome, ShuffleOutcome::Shuffled(_)),
                }
            }
            InteractionCommand::Skip => self.skip(guild_id),
            InteractionCommand::Clear => self.clear(guild_id).await,
            InteractionCommand::Unknown(custom_id) => {
                debug!("Componente no manejado: {}", custom_id);
                CommandOutcome::info(UNKNOWN_CONTROL)
            }
        }
    }

    fn skip(&self, guild_id: GuildId) -> CommandOutcome {
        // La metadata se lee antes de detener: al detener se pierde
        let Some(playing) = self.playback.now_playing(guild_id) else {
            return CommandOutcome::info(NOTHING_TO_SKIP);
        };

        let requester = match &playing.metadata.requester {
            Requester::Autoplay => "(autoplay)".to_string(),
            Requester::User { name, .. } => format!("(requested by {})", name),
        };
        let text = format!("🤡 Skipped **{}** {}", playing.title, requester);

        self.playback.stop_track(guild_id);
        CommandOutcome::done(text)
    }

    async fn clear(&self, guild_id: GuildId) -> CommandOutcome {
        if !self.playback.has_handler(guild_id) {
            return CommandOutcome::info(NOTHING_TO_CLEAR);
        }

        self.playback.stop_and_clear(guild_id);
        if let Err(e) = self.playback.close_connection(guild_id).await {
            warn!("Error al salir del canal de voz en guild {}: {:?}", guild_id, e);
        }

        CommandOutcome::done(CLEARED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{queue::RequestMetadata, NowPlaying};
    use crate::ui::panel::{tests::FakeTransport, ControlRegistry};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reproductor en memoria que registra cada llamada
    #[derive(Default)]
    struct FakePlayback {
        has_handler: bool,
        own_entries: usize,
        now_playing: Mutex<Option<NowPlaying>>,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl PlaybackControl for FakePlayback {
        fn has_handler(&self, _guild_id: GuildId) -> bool {
            self.calls.lock().push("has_handler");
            self.has_handler
        }

        fn shuffle(&self, _guild_id: GuildId, _user_id: UserId) -> usize {
            self.calls.lock().push("shuffle");
            self.own_entries
        }

        fn now_playing(&self, _guild_id: GuildId) -> Option<NowPlaying> {
            self.calls.lock().push("now_playing");
            self.now_playing.lock().clone()
        }

        fn stop_track(&self, _guild_id: GuildId) {
            self.calls.lock().push("stop_track");
            // Como el reproductor real: al detener se pierde el track actual
            *self.now_playing.lock() = None;
        }

        fn stop_and_clear(&self, _guild_id: GuildId) {
            self.calls.lock().push("stop_and_clear");
        }

        async fn close_connection(&self, _guild_id: GuildId) -> Result<()> {
            self.calls.lock().push("close_connection");
            Ok(())
        }
    }

    const GUILD: GuildId = GuildId::new(1);
    const CHANNEL: ChannelId = ChannelId::new(2);
    const USER: UserId = UserId::new(3);

    fn handler(playback: FakePlayback) -> (ControlHandler, Arc<FakePlayback>, Arc<FakeTransport>) {
        let playback = Arc::new(playback);
        let transport = Arc::new(FakeTransport::default());
        let panel = Arc::new(ControlPanel::new(
            Arc::new(ControlRegistry::new()),
            transport.clone(),
        ));
        (
            ControlHandler::new(playback.clone(), panel),
            playback,
            transport,
        )
    }

    fn press(custom_id: &str) -> ButtonPress {
        ButtonPress {
            guild_id: GUILD,
            channel_id: CHANNEL,
            user_id: USER,
            custom_id: custom_id.to_string(),
        }
    }

    #[test]
    fn test_decode_custom_ids() {
        assert_eq!(InteractionCommand::from_custom_id("shuffle"), InteractionCommand::Shuffle);
        assert_eq!(InteractionCommand::from_custom_id("skip"), InteractionCommand::Skip);
        assert_eq!(InteractionCommand::from_custom_id("clear"), InteractionCommand::Clear);
        assert_eq!(
            InteractionCommand::from_custom_id("SKIP"),
            InteractionCommand::Unknown("SKIP".to_string())
        );
    }

    #[tokio::test]
    async fn test_shuffle_messages() {
        for (count, expected) in [
            (0, "You don't have any music in the queue to shuffle!"),
            (1, "You only have one song in the queue!"),
            (7, "You successfully shuffled your 7 entries."),
        ] {
            let (handler, _, _) = handler(FakePlayback {
                own_entries: count,
                ..Default::default()
            });
            let outcome = handler.execute(GUILD, USER, &InteractionCommand::Shuffle).await;
            assert_eq!(outcome.text, expected);
            assert_eq!(outcome.success, count >= 2);
        }
    }

    #[tokio::test]
    async fn test_skip_without_track_does_not_stop() {
        let (handler, playback, transport) = handler(FakePlayback::default());

        let outcome = handler.handle(&press("skip"), || async { Ok(()) }).await;

        assert_eq!(outcome.text, NOTHING_TO_SKIP);
        assert!(!playback.calls.lock().contains(&"stop_track"));
        // Igual se renderiza
        assert_eq!(transport.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_reads_metadata_before_stopping() {
        let (handler, playback, _) = handler(FakePlayback {
            now_playing: Mutex::new(Some(NowPlaying {
                title: "Song A".to_string(),
                metadata: RequestMetadata::user(UserId::new(9), "nina"),
            })),
            ..Default::default()
        });

        let outcome = handler.execute(GUILD, USER, &InteractionCommand::Skip).await;

        assert_eq!(outcome.text, "🤡 Skipped **Song A** (requested by nina)");
        assert_eq!(*playback.calls.lock(), vec!["now_playing", "stop_track"]);
    }

    #[tokio::test]
    async fn test_skip_autoplay_track_has_no_username() {
        let (handler, _, _) = handler(FakePlayback {
            now_playing: Mutex::new(Some(NowPlaying {
                title: "Radio".to_string(),
                metadata: RequestMetadata::autoplay(),
            })),
            ..Default::default()
        });

        let outcome = handler.execute(GUILD, USER, &InteractionCommand::Skip).await;

        assert!(outcome.text.contains("(autoplay)"));
        assert!(!outcome.text.contains("requested by"));
    }

    #[tokio::test]
    async fn test_clear_without_handler_never_disconnects() {
        let (handler, playback, _) = handler(FakePlayback::default());

        let outcome = handler.execute(GUILD, USER, &InteractionCommand::Clear).await;

        assert_eq!(outcome.text, NOTHING_TO_CLEAR);
        assert_eq!(*playback.calls.lock(), vec!["has_handler"]);
    }

    #[tokio::test]
    async fn test_clear_stops_then_disconnects() {
        let (handler, playback, _) = handler(FakePlayback {
            has_handler: true,
            ..Default::default()
        });

        let outcome = handler.execute(GUILD, USER, &InteractionCommand::Clear).await;

        assert_eq!(outcome.text, CLEARED);
        assert_eq!(
            *playback.calls.lock(),
            vec!["has_handler", "stop_and_clear", "close_connection"]
        );
    }

    #[tokio::test]
    async fn test_unknown_control_touches_nothing() {
        for custom_id in ["", "play", "music_skip"] {
            let (handler, playback, _) = handler(FakePlayback {
                has_handler: true,
                ..Default::default()
            });

            let outcome = handler.handle(&press(custom_id), || async { Ok(()) }).await;

            assert_eq!(outcome.text, UNKNOWN_CONTROL);
            assert!(playback.calls.lock().is_empty());
        }
    }

    #[tokio::test]
    async fn test_acknowledged_once_even_when_panel_fails() {
        let (handler, _, transport) = handler(FakePlayback::default());
        transport.fail_creates.store(true, Ordering::SeqCst);
        let counter = AtomicUsize::new(0);
        let acks = &counter;

        handler
            .handle(&press("skip"), move || async move {
                acks.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panel_updates_even_when_ack_fails() {
        let (handler, _, transport) = handler(FakePlayback::default());

        handler
            .handle(&press("clear"), || async { Err::<(), _>(anyhow::anyhow!("Unknown interaction")) })
            .await;

        assert_eq!(transport.creates.load(Ordering::SeqCst), 1);
    }
}
