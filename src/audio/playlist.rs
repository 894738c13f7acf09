use rand::seq::SliceRandom;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PlaylistError {
    #[error("playlist `{0}` does not exist")]
    NotFound(String),
    #[error("invalid playlist name `{0}`")]
    InvalidName(String),
    #[error("could not read playlist: {0}")]
    Io(#[from] std::io::Error),
}

/// Playlist de texto: una URL o búsqueda por línea.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    pub name: String,
    pub entries: Vec<String>,
}

/// Carga playlists desde `<dir>/<nombre>.txt`.
///
/// Las líneas que empiezan con `#` son comentarios, salvo `#shuffle`, que
/// mezcla las entradas al cargar.
#[derive(Debug, Clone)]
pub struct PlaylistLoader {
    dir: PathBuf,
}

impl PlaylistLoader {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub async fn names(&self) -> Result<Vec<String>, PlaylistError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "txt") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    pub async fn exists(&self, name: &str) -> bool {
        match self.path_for(name) {
            Ok(path) => fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    pub async fn load(&self, name: &str) -> Result<Playlist, PlaylistError> {
        let path = self.path_for(name)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlaylistError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut shuffle = false;
        let mut entries = Vec::new();
        for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if let Some(directive) = line.strip_prefix('#') {
                if directive.trim().eq_ignore_ascii_case("shuffle") {
                    shuffle = true;
                }
                continue;
            }
            entries.push(line.to_string());
        }

        if shuffle {
            entries.shuffle(&mut rand::thread_rng());
        }

        debug!("📜 Playlist {} cargada con {} entradas", name, entries.len());
        Ok(Playlist {
            name: name.to_string(),
            entries,
        })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, PlaylistError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ' ');
        if !valid {
            return Err(PlaylistError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(format!("{name}.txt")))
    }
}
