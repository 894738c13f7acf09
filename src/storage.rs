use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// Configuración de servidor almacenada en JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuildSettings {
    pub guild_id: u64,
    pub default_playlist: Option<String>,
    pub voice_channel_id: Option<u64>,
    pub updated_at: DateTime<Utc>,
}

impl GuildSettings {
    fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            default_playlist: None,
            voice_channel_id: None,
            updated_at: Utc::now(),
        }
    }

    pub fn voice_channel(&self) -> Option<ChannelId> {
        self.voice_channel_id.filter(|id| *id != 0).map(ChannelId::new)
    }
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    servers_cache: HashMap<u64, GuildSettings>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let servers_dir = data_dir.join("servers");
        fs::create_dir_all(&servers_dir).await?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let mut storage = Self {
            data_dir,
            servers_cache: HashMap::new(),
        };

        // Cargar configuraciones existentes
        storage.load_all_servers().await?;

        Ok(storage)
    }

    /// Obtiene la configuración de un servidor.
    ///
    /// Un servidor sin archivo recibe valores por defecto, que no se escriben
    /// a disco hasta el primer cambio.
    pub fn guild_settings(&self, guild_id: GuildId) -> GuildSettings {
        self.servers_cache
            .get(&guild_id.get())
            .cloned()
            .unwrap_or_else(|| GuildSettings::new(guild_id.get()))
    }

    pub async fn set_default_playlist(
        &mut self,
        guild_id: GuildId,
        playlist: Option<String>,
    ) -> Result<()> {
        let mut settings = self.guild_settings(guild_id);
        settings.default_playlist = playlist;
        self.update_guild_settings(settings).await
    }

    pub async fn set_voice_channel(
        &mut self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
    ) -> Result<()> {
        let mut settings = self.guild_settings(guild_id);
        settings.voice_channel_id = channel_id.map(|c| c.get());
        self.update_guild_settings(settings).await
    }

    async fn update_guild_settings(&mut self, mut settings: GuildSettings) -> Result<()> {
        settings.updated_at = Utc::now();
        let guild_id = settings.guild_id;

        self.save_guild_settings(&settings).await?;
        self.servers_cache.insert(guild_id, settings);

        info!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }

    // Métodos privados

    async fn load_guild_settings(&self, guild_id: u64) -> Result<GuildSettings> {
        let file_path = self.get_server_file_path(guild_id);
        let content = fs::read_to_string(&file_path).await?;
        let settings: GuildSettings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    async fn save_guild_settings(&self, settings: &GuildSettings) -> Result<()> {
        let file_path = self.get_server_file_path(settings.guild_id);
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&file_path, content).await?;
        Ok(())
    }

    async fn load_all_servers(&mut self) -> Result<()> {
        let servers_dir = self.data_dir.join("servers");

        let mut files = fs::read_dir(&servers_dir).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();

            if path.extension().map_or(false, |ext| ext == "json") {
                let guild_id = path
                    .file_stem()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.strip_prefix("guild_"))
                    .and_then(|id| id.parse::<u64>().ok());

                if let Some(guild_id) = guild_id {
                    match self.load_guild_settings(guild_id).await {
                        Ok(settings) => {
                            self.servers_cache.insert(guild_id, settings);
                            loaded_count += 1;
                        }
                        Err(e) => {
                            warn!("Error cargando configuración para guild {}: {}", guild_id, e);
                        }
                    }
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {} configuraciones de servidor", loaded_count);
        }

        Ok(())
    }

    fn get_server_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir
            .join("servers")
            .join(format!("guild_{}.json", guild_id))
    }
}
