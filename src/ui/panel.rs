//! # Control panel
//!
//! One control message per text channel, carrying the Shuffle / Skip / Clear
//! buttons and the outcome of the last button press.
//!
//! [`ControlRegistry`] remembers which message is the live panel of each
//! channel. [`ControlPanel::publish`] edits that message in place and, when it
//! can no longer be fetched or edited (deleted, permissions changed, edit
//! conflict), posts a fresh one and rebinds the channel. Stale bindings are
//! never invalidated explicitly; the next publish repairs them.
//!
//! Overlapping publishes on the same channel are not serialized. The last
//! successful write wins, which is fine because a panel can always be
//! recreated from scratch.

use async_trait::async_trait;
use dashmap::DashMap;
use serenity::{
    builder::{CreateMessage, EditMessage},
    http::Http,
    model::id::{ChannelId, MessageId},
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ui::buttons::create_control_buttons;

#[derive(Debug, Error)]
pub enum PanelError {
    #[error("control message {message_id} could not be fetched")]
    Fetch {
        message_id: MessageId,
        #[source]
        source: serenity::Error,
    },
    #[error("control message {message_id} could not be edited")]
    Edit {
        message_id: MessageId,
        #[source]
        source: serenity::Error,
    },
    #[error("control message could not be created")]
    Create(#[source] serenity::Error),
}

/// Canal -> mensaje de control vigente.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    bindings: DashMap<ChannelId, MessageId>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel_id: ChannelId) -> Option<MessageId> {
        self.bindings.get(&channel_id).map(|entry| *entry)
    }

    pub fn set(&self, channel_id: ChannelId, message_id: MessageId) {
        self.bindings.insert(channel_id, message_id);
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Operaciones de red que necesita el panel.
#[async_trait]
pub trait PanelTransport: Send + Sync {
    async fn fetch(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), PanelError>;

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<(), PanelError>;

    async fn create(&self, channel_id: ChannelId, content: &str) -> Result<MessageId, PanelError>;
}

/// Transporte real sobre la API REST de Discord
pub struct HttpTransport {
    http: Arc<Http>,
}

impl HttpTransport {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PanelTransport for HttpTransport {
    async fn fetch(&self, channel_id: ChannelId, message_id: MessageId) -> Result<(), PanelError> {
        channel_id
            .message(&self.http, message_id)
            .await
            .map(|_| ())
            .map_err(|source| PanelError::Fetch { message_id, source })
    }

    async fn edit(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<(), PanelError> {
        let builder = EditMessage::new()
            .content(content)
            .components(create_control_buttons());

        channel_id
            .edit_message(&self.http, message_id, builder)
            .await
            .map(|_| ())
            .map_err(|source| PanelError::Edit { message_id, source })
    }

    async fn create(&self, channel_id: ChannelId, content: &str) -> Result<MessageId, PanelError> {
        let builder = CreateMessage::new()
            .content(content)
            .components(create_control_buttons());

        channel_id
            .send_message(&self.http, builder)
            .await
            .map(|message| message.id)
            .map_err(PanelError::Create)
    }
}

/// Renderer del panel de control.
pub struct ControlPanel {
    registry: Arc<ControlRegistry>,
    transport: Arc<dyn PanelTransport>,
}

impl ControlPanel {
    pub fn new(registry: Arc<ControlRegistry>, transport: Arc<dyn PanelTransport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &Arc<ControlRegistry> {
        &self.registry
    }

    /// Muestra `content` en el panel del canal y devuelve el id del mensaje
    /// que quedó vinculado.
    pub async fn publish(&self, channel_id: ChannelId, content: &str) -> Result<MessageId, PanelError> {
        if let Some(message_id) = self.registry.get(channel_id) {
            match self.edit_existing(channel_id, message_id, content).await {
                Ok(()) => {
                    debug!("🎛️ Panel {} actualizado en canal {}", message_id, channel_id);
                    return Ok(message_id);
                }
                Err(e) => {
                    warn!(
                        "♻️ Panel {} en canal {} no disponible, se crea uno nuevo: {}",
                        message_id, channel_id, e
                    );
                }
            }
        }

        self.create_new(channel_id, content).await
    }

    async fn edit_existing(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        content: &str,
    ) -> Result<(), PanelError> {
        self.transport.fetch(channel_id, message_id).await?;
        self.transport.edit(channel_id, message_id, content).await
    }

    async fn create_new(&self, channel_id: ChannelId, content: &str) -> Result<MessageId, PanelError> {
        let message_id = self.transport.create(channel_id, content).await?;
        self.registry.set(channel_id, message_id);
        info!("🎛️ Nuevo panel {} en canal {}", message_id, channel_id);
        Ok(message_id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

    /// Canal de Discord en memoria
    #[derive(Default)]
    pub(crate) struct FakeTransport {
        messages: Mutex<HashMap<MessageId, (ChannelId, String)>>,
        next_id: AtomicU64,
        pub fetches: AtomicUsize,
        pub edits: AtomicUsize,
        pub creates: AtomicUsize,
        pub fail_edits: AtomicBool,
        pub fail_creates: AtomicBool,
    }

    impl FakeTransport {
        pub(crate) fn content(&self, message_id: MessageId) -> Option<String> {
            self.messages.lock().get(&message_id).map(|(_, c)| c.clone())
        }

        pub(crate) fn delete(&self, message_id: MessageId) {
            self.messages.lock().remove(&message_id);
        }

        pub(crate) fn message_count(&self) -> usize {
            self.messages.lock().len()
        }
    }

    #[async_trait]
    impl PanelTransport for FakeTransport {
        async fn fetch(&self, _channel_id: ChannelId, message_id: MessageId) -> Result<(), PanelError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.messages.lock().contains_key(&message_id) {
                Ok(())
            } else {
                Err(PanelError::Fetch {
                    message_id,
                    source: serenity::Error::Other("Unknown Message"),
                })
            }
        }

        async fn edit(
            &self,
            _channel_id: ChannelId,
            message_id: MessageId,
            content: &str,
        ) -> Result<(), PanelError> {
            self.edits.fetch_add(1, Ordering::SeqCst);
            let mut messages = self.messages.lock();
            match messages.get_mut(&message_id) {
                Some(message) if !self.fail_edits.load(Ordering::SeqCst) => {
                    message.1 = content.to_string();
                    Ok(())
                }
                _ => Err(PanelError::Edit {
                    message_id,
                    source: serenity::Error::Other("Missing Permissions"),
                }),
            }
        }

        async fn create(&self, channel_id: ChannelId, content: &str) -> Result<MessageId, PanelError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.fail_creates.load(Ordering::SeqCst) {
                return Err(PanelError::Create(serenity::Error::Other("Service Unavailable")));
            }
            let id = MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            self.messages.lock().insert(id, (channel_id, content.to_string()));
            Ok(id)
        }
    }

    fn panel() -> (ControlPanel, Arc<FakeTransport>) {
        let transport = Arc::new(FakeTransport::default());
        let panel = ControlPanel::new(Arc::new(ControlRegistry::new()), transport.clone());
        (panel, transport)
    }

    const CHANNEL: ChannelId = ChannelId::new(100);

    #[tokio::test]
    async fn test_first_publish_creates_and_binds() {
        let (panel, transport) = panel();

        let id = panel.publish(CHANNEL, "hello").await.unwrap();

        assert_eq!(panel.registry().get(CHANNEL), Some(id));
        assert_eq!(transport.content(id).as_deref(), Some("hello"));
        assert_eq!(transport.creates.load(Ordering::SeqCst), 1);
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_second_publish_edits_in_place() {
        let (panel, transport) = panel();

        let first = panel.publish(CHANNEL, "one").await.unwrap();
        let second = panel.publish(CHANNEL, "two").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(transport.content(first).as_deref(), Some("two"));
        assert_eq!(transport.creates.load(Ordering::SeqCst), 1);
        assert_eq!(transport.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(transport.edits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deleted_panel_is_recreated_once() {
        let (panel, transport) = panel();

        let old = panel.publish(CHANNEL, "one").await.unwrap();
        transport.delete(old);

        let new = panel.publish(CHANNEL, "two").await.unwrap();

        assert_ne!(old, new);
        assert_eq!(panel.registry().get(CHANNEL), Some(new));
        assert_eq!(transport.content(new).as_deref(), Some("two"));
        assert_eq!(transport.creates.load(Ordering::SeqCst), 2);
        // La búsqueda falló, así que no se intentó editar
        assert_eq!(transport.edits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_edit_failure_falls_back_to_create() {
        let (panel, transport) = panel();

        let old = panel.publish(CHANNEL, "one").await.unwrap();
        transport.fail_edits.store(true, Ordering::SeqCst);

        let new = panel.publish(CHANNEL, "two").await.unwrap();

        assert_ne!(old, new);
        assert_eq!(panel.registry().get(CHANNEL), Some(new));
        assert_eq!(transport.edits.load(Ordering::SeqCst), 1);
        assert_eq!(transport.creates.load(Ordering::SeqCst), 2);
        assert_eq!(panel.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_create_failure_leaves_binding_untouched() {
        let (panel, transport) = panel();

        let old = panel.publish(CHANNEL, "one").await.unwrap();
        transport.delete(old);
        transport.fail_creates.store(true, Ordering::SeqCst);

        assert!(matches!(
            panel.publish(CHANNEL, "two").await,
            Err(PanelError::Create(_))
        ));
        assert_eq!(panel.registry().get(CHANNEL), Some(old));

        // Una vez que Discord responde de nuevo, el panel se repara
        transport.fail_creates.store(false, Ordering::SeqCst);
        let new = panel.publish(CHANNEL, "three").await.unwrap();
        assert_eq!(transport.content(new).as_deref(), Some("three"));
    }

    #[tokio::test]
    async fn test_binding_tracks_latest_content_across_deletions() {
        let (panel, transport) = panel();
        let other = ChannelId::new(200);

        for round in 0..12 {
            let content = format!("round {round}");
            let id = panel.publish(CHANNEL, &content).await.unwrap();
            panel.publish(other, "other").await.unwrap();
            if round % 3 == 0 {
                transport.delete(id);
            }
        }
        let last = panel.publish(CHANNEL, "final").await.unwrap();

        assert_eq!(panel.registry().len(), 2);
        assert_eq!(panel.registry().get(CHANNEL), Some(last));
        assert_eq!(transport.content(last).as_deref(), Some("final"));
        // Un mensaje vivo por canal
        assert_eq!(transport.message_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_publishes_converge_to_one_binding() {
        let (panel, transport) = panel();
        let panel = Arc::new(panel);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let panel = panel.clone();
                tokio::spawn(async move { panel.publish(CHANNEL, &format!("press {i}")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let bound = panel.registry().get(CHANNEL).unwrap();
        assert!(transport.content(bound).is_some());
        assert_eq!(panel.registry().len(), 1);

        let settled = panel.publish(CHANNEL, "settled").await.unwrap();
        assert_eq!(transport.content(settled).as_deref(), Some("settled"));
    }
}
