//! # Update alerts
//!
//! Background task that compares the running version with the latest GitHub
//! release and sends the bot owner a direct message when they differ.
//!
//! ## Schedule
//!
//! First run right after `ready`, then every 24 hours with a fixed delay
//! between runs. The task runs on its own tokio task, independent of gateway
//! events, and only stops when the shutdown token is cancelled.
//!
//! ## Error Handling
//!
//! A failed run (network error, bad response, DM refused) is logged as a
//! warning and the task waits for the next tick.

use async_trait::async_trait;
use serde::Deserialize;
use serenity::{http::Http, model::id::UserId};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error)]
pub enum UpdateCheckError {
    #[error("release lookup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("release lookup returned {0}")]
    Status(reqwest::StatusCode),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VersionSource: Send + Sync {
    fn current_version(&self) -> String;

    /// `None` cuando no hay ningún release publicado
    async fn latest_version(&self) -> Result<Option<String>, UpdateCheckError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, user_id: UserId, message: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Último release de un repositorio de GitHub
pub struct GithubReleases {
    client: reqwest::Client,
    repository: String,
}

impl GithubReleases {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            repository: repository.into(),
        }
    }
}

#[async_trait]
impl VersionSource for GithubReleases {
    fn current_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    async fn latest_version(&self) -> Result<Option<String>, UpdateCheckError> {
        let url = format!("https://api.github.com/repos/{}/releases/latest", self.repository);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, concat!("panel-music/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if !status.is_success() => Err(UpdateCheckError::Status(status)),
            _ => {
                let release: Release = response.json().await?;
                Ok(Some(release.tag_name))
            }
        }
    }
}

/// Envía mensajes directos por la API REST de Discord
pub struct DirectMessenger {
    http: Arc<Http>,
}

impl DirectMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl OperatorNotifier for DirectMessenger {
    async fn notify(&self, user_id: UserId, message: &str) -> anyhow::Result<()> {
        let dm = user_id.create_dm_channel(&self.http).await?;
        dm.id.say(&self.http, message).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    UpToDate,
    NoRelease,
    Notified { current: String, latest: String },
}

/// Compara la versión en ejecución con el último release y avisa al owner.
///
/// La comparación ignora mayúsculas y además un `v`/`V` inicial, porque los
/// tags de GitHub suelen ser `v1.2.0` mientras la versión del crate es `1.2.0`.
pub struct UpdateChecker {
    versions: Arc<dyn VersionSource>,
    notifier: Arc<dyn OperatorNotifier>,
    owner_id: UserId,
    repository: String,
}

impl UpdateChecker {
    pub fn new(
        versions: Arc<dyn VersionSource>,
        notifier: Arc<dyn OperatorNotifier>,
        owner_id: UserId,
        repository: impl Into<String>,
    ) -> Self {
        Self {
            versions,
            notifier,
            owner_id,
            repository: repository.into(),
        }
    }

    pub async fn run_once(&self) -> anyhow::Result<UpdateCheck> {
        let current = self.versions.current_version();
        let Some(latest) = self.versions.latest_version().await? else {
            return Ok(UpdateCheck::NoRelease);
        };

        if normalize(&current) == normalize(&latest) {
            debug!("✅ Versión {} al día", current);
            return Ok(UpdateCheck::UpToDate);
        }

        let message = format!(
            "There is a new version of Panel Music available!\n\
             Current version: `{}`\n\
             New Version: `{}`\n\n\
             Please visit https://github.com/{}/releases/latest to get the latest release.",
            current, latest, self.repository
        );
        self.notifier.notify(self.owner_id, &message).await?;
        info!("📬 Aviso de versión {} enviado al owner", latest);

        Ok(UpdateCheck::Notified { current, latest })
    }

    /// Lanza el chequeo periódico; el primer chequeo es inmediato.
    pub fn spawn(self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!("Error verificando actualizaciones: {:?}", e);
                        }
                    }
                }
            }

            debug!("Chequeo de actualizaciones detenido");
        })
    }
}

// "v1.2.0" y "1.2.0" son la misma versión; la comparación ignora mayúsculas
fn normalize(version: &str) -> String {
    let version = version.trim();
    version
        .strip_prefix(['v', 'V'])
        .unwrap_or(version)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OWNER: UserId = UserId::new(77);

    fn versions(current: &'static str, latest: Option<&'static str>) -> MockVersionSource {
        let mut versions = MockVersionSource::new();
        versions
            .expect_current_version()
            .returning(move || current.to_string());
        versions
            .expect_latest_version()
            .returning(move || Ok(latest.map(str::to_string)));
        versions
    }

    fn checker(versions: MockVersionSource, notifier: MockOperatorNotifier) -> UpdateChecker {
        UpdateChecker::new(Arc::new(versions), Arc::new(notifier), OWNER, "owner/repo")
    }

    #[tokio::test]
    async fn test_same_version_sends_nothing() {
        let mut notifier = MockOperatorNotifier::new();
        notifier.expect_notify().never();

        let result = checker(versions("1.0", Some("1.0")), notifier).run_once().await.unwrap();
        assert_eq!(result, UpdateCheck::UpToDate);
    }

    #[tokio::test]
    async fn test_comparison_ignores_case_and_v_prefix() {
        let mut notifier = MockOperatorNotifier::new();
        notifier.expect_notify().never();

        let result = checker(versions("1.0.0-rc1", Some("V1.0.0-RC1")), notifier)
            .run_once()
            .await
            .unwrap();
        assert_eq!(result, UpdateCheck::UpToDate);
    }

    #[tokio::test]
    async fn test_new_version_notifies_owner_once() {
        let mut notifier = MockOperatorNotifier::new();
        notifier.expect_notify().times(1).returning(|user_id, message| {
            assert_eq!(user_id, OWNER);
            assert!(message.contains("`1.0`"));
            assert!(message.contains("`1.1`"));
            assert!(message.contains("github.com/owner/repo"));
            Ok(())
        });

        let result = checker(versions("1.0", Some("1.1")), notifier).run_once().await.unwrap();
        assert_eq!(
            result,
            UpdateCheck::Notified {
                current: "1.0".to_string(),
                latest: "1.1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_no_release_sends_nothing() {
        let mut notifier = MockOperatorNotifier::new();
        notifier.expect_notify().never();

        let result = checker(versions("1.0", None), notifier).run_once().await.unwrap();
        assert_eq!(result, UpdateCheck::NoRelease);
    }

    #[tokio::test]
    async fn test_lookup_failure_sends_nothing() {
        let mut versions = MockVersionSource::new();
        versions
            .expect_current_version()
            .returning(|| "1.0".to_string());
        versions
            .expect_latest_version()
            .returning(|| Err(UpdateCheckError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE)));
        let mut notifier = MockOperatorNotifier::new();
        notifier.expect_notify().never();

        assert!(checker(versions, notifier).run_once().await.is_err());
    }

    /// Falla en la primera consulta y publica "1.1" en las siguientes
    struct FlakyReleases {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl VersionSource for FlakyReleases {
        fn current_version(&self) -> String {
            "1.0".to_string()
        }

        async fn latest_version(&self) -> Result<Option<String>, UpdateCheckError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(UpdateCheckError::Status(reqwest::StatusCode::BAD_GATEWAY))
            } else {
                Ok(Some("1.1".to_string()))
            }
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl OperatorNotifier for CountingNotifier {
        async fn notify(&self, _user_id: UserId, _message: &str) -> anyhow::Result<()> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_does_not_stop_schedule() {
        let releases = Arc::new(FlakyReleases {
            lookups: AtomicUsize::new(0),
        });
        let notifier = Arc::new(CountingNotifier::default());
        let shutdown = CancellationToken::new();

        let task = UpdateChecker::new(releases.clone(), notifier.clone(), OWNER, "owner/repo")
            .spawn(CHECK_INTERVAL, shutdown.clone());

        // Primer chequeo inmediato: falla
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(releases.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 0);

        // 24 horas después vuelve a correr
        tokio::time::sleep(CHECK_INTERVAL).await;
        assert_eq!(releases.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(notifier.sent.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        task.await.unwrap();
    }
}
