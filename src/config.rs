use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Repositorio cuyo último release se compara con la versión en ejecución
pub const DEFAULT_UPDATE_REPOSITORY: &str = "yeipills/panel-music";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub owner_id: u64,
    pub dev_guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub max_queue_size: usize,
    pub alone_time_until_stop: u64, // En segundos, 0 = desactivado

    // Paths
    pub data_dir: PathBuf,
    pub playlists_dir: PathBuf,

    // Features
    pub update_alerts: bool,
    pub update_repository: String,
    pub allow_bot_listing: bool,
}

impl Config {
    /// Carga la configuración desde `config.toml` (opcional) y variables de entorno.
    ///
    /// Las variables de entorno tienen prioridad sobre el archivo, y un `.env`
    /// en el directorio de trabajo se carga antes que ambas.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Self = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().try_parsing(true))
            .build()
            .context("No se pudo leer la configuración")?
            .try_deserialize()
            .context("Configuración inválida")?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.playlists_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - A Discord token must be present
    /// - Update alerts need an owner to notify
    /// - Queue size must be greater than 0
    /// - The update repository must look like `owner/name`
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN es obligatorio");
        }

        if self.update_alerts && self.owner_id == 0 {
            anyhow::bail!("UPDATE_ALERTS requiere OWNER_ID");
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        match self.update_repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {}
            _ => anyhow::bail!(
                "UPDATE_REPOSITORY debe tener el formato owner/name, got: {}",
                self.update_repository
            ),
        }

        Ok(())
    }

    /// Tiempo que el bot espera solo en un canal antes de detenerse.
    pub fn alone_timeout(&self) -> Option<Duration> {
        (self.alone_time_until_stop > 0).then(|| Duration::from_secs(self.alone_time_until_stop))
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: owner {} (Guild: {})\n  \
            Queue: {} max, alone timeout {}\n  \
            Paths: data {}, playlists {}\n  \
            Features: update alerts={} ({}), bot listing allowed={}",
            self.owner_id,
            self.dev_guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.max_queue_size,
            self.alone_timeout()
                .map_or("off".to_string(), |d| humantime::format_duration(d).to_string()),
            self.data_dir.display(),
            self.playlists_dir.display(),
            self.update_alerts,
            self.update_repository,
            self.allow_bot_listing,
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when neither the file nor the environment provide a key.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            owner_id: 0,
            dev_guild_id: None,

            max_queue_size: 1000,
            alone_time_until_stop: 0,

            data_dir: "/app/data".into(),
            playlists_dir: "/app/data/playlists".into(),

            update_alerts: true,
            update_repository: DEFAULT_UPDATE_REPOSITORY.to_string(),
            allow_bot_listing: false,
        }
    }
}
