use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

/// Quién pidió un track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
    /// Reproducción iniciada por el bot (playlist por defecto)
    Autoplay,
    User { id: UserId, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    pub requester: Requester,
}

impl RequestMetadata {
    pub fn autoplay() -> Self {
        Self {
            requester: Requester::Autoplay,
        }
    }

    pub fn user(id: UserId, name: impl Into<String>) -> Self {
        Self {
            requester: Requester::User {
                id,
                name: name.into(),
            },
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        matches!(&self.requester, Requester::User { id, .. } if *id == user_id)
    }
}

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub title: String,
    pub url: String,
    pub duration: Option<Duration>,
    pub metadata: RequestMetadata,
    pub added_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>, metadata: RequestMetadata) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration: None,
            metadata,
            added_at: Utc::now(),
        }
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Las entradas de playlist llegan con la URL como título hasta que
    /// yt-dlp las resuelve
    pub fn is_resolved(&self) -> bool {
        self.title != self.url
    }
}

#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track a la cola y devuelve su posición (1 = siguiente)
    pub fn add(&mut self, item: QueueItem) -> Result<usize> {
        if self.items.len() >= self.max_size {
            anyhow::bail!("The queue is full ({} songs max)", self.max_size);
        }

        info!("➕ Agregado a la cola: {}", item.title);
        self.items.push_back(item);

        Ok(self.items.len())
    }

    /// Agrega múltiples tracks (playlist), hasta llenar la cola
    pub fn add_all(&mut self, items: impl IntoIterator<Item = QueueItem>) -> usize {
        let available_space = self.max_size.saturating_sub(self.items.len());
        let before = self.items.len();
        self.items.extend(items.into_iter().take(available_space));

        let added = self.items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn next(&mut self) -> Option<QueueItem> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => debug!("➡️ Siguiente en cola: {}", item.title),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    /// Limpia la cola
    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Mezcla sólo las entradas pedidas por `user_id`.
    ///
    /// Las entradas del usuario se permutan entre las posiciones que ya
    /// ocupaban; las de los demás no se mueven. Devuelve cuántas entradas
    /// tiene el usuario en la cola.
    pub fn shuffle_for(&mut self, user_id: UserId) -> usize {
        let slots: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.metadata.is_owned_by(user_id))
            .map(|(index, _)| index)
            .collect();

        if slots.len() < 2 {
            return slots.len();
        }

        let mut owned: Vec<QueueItem> = slots.iter().map(|&i| self.items[i].clone()).collect();
        owned.shuffle(&mut rand::thread_rng());

        for (slot, item) in slots.iter().zip(owned) {
            self.items[*slot] = item;
        }

        info!("🔀 Mezcladas {} entradas del usuario {}", slots.len(), user_id);
        slots.len()
    }
}
