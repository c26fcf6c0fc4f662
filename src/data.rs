use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use crate::accounts::Account;
use crate::disputes::Dispute;
use crate::moderation::{PunishmentLog, SanctionCheckRequest, SanctionStore};
use crate::platform::Platform;
use crate::settings::GuildSettings;
use crate::tempvoice::TempVoiceRegistry;
use crate::verify::VerificationRegistry;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, mpsc::Sender};
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

const SETTINGS_FILE: &str = "guild_settings.yaml";
const PUNISHMENTS_FILE: &str = "punishment_logs.yaml";
const DISPUTES_FILE: &str = "disputes.yaml";
const ACCOUNTS_FILE: &str = "accounts.yaml";

/// Centralized data shared by the bot, the background tasks and the dashboard
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl Default for Data {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("guild_settings", &self.guild_settings.len())
            .field("punishment_logs", &self.punishment_logs.len())
            .field("disputes", &self.disputes.len())
            .field("accounts", &self.accounts.len())
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// In-memory data; `save` is a no-op
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(DataInner::new(None)))
    }

    /// Load the YAML documents from `dir`, starting empty for missing files
    ///
    /// # Errors
    /// Returns an error when a file exists but cannot be read or parsed.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let dir = dir.as_ref().to_path_buf();
        let inner = DataInner::new(Some(dir.clone()));

        for settings in read_documents::<GuildSettings>(&dir.join(SETTINGS_FILE)).await? {
            inner.guild_settings.insert(settings.guild_id, settings);
        }
        for log in read_documents::<PunishmentLog>(&dir.join(PUNISHMENTS_FILE)).await? {
            inner.punishment_logs.insert(log.id, log);
        }
        for dispute in read_documents::<Dispute>(&dir.join(DISPUTES_FILE)).await? {
            inner.disputes.insert(dispute.id, dispute);
        }
        for account in read_documents::<Account>(&dir.join(ACCOUNTS_FILE)).await? {
            inner.accounts.insert(account.id, account);
        }

        info!(
            "Loaded {} guild settings, {} punishment logs, {} disputes, {} accounts from {}",
            inner.guild_settings.len(),
            inner.punishment_logs.len(),
            inner.disputes.len(),
            inner.accounts.len(),
            dir.display()
        );
        Ok(Self(Arc::new(inner)))
    }

    /// Write every document back to disk
    ///
    /// # Errors
    /// This function will return an error if:
    /// - The data directory cannot be created
    /// - A collection cannot be serialized to YAML
    /// - A file cannot be written
    pub async fn save(&self) -> Result<(), crate::Error> {
        let Some(dir) = &self.storage else {
            return Ok(());
        };
        let _guard = self.save_lock.lock().await;

        tokio::fs::create_dir_all(dir).await?;

        let mut settings: Vec<GuildSettings> = collect(&self.guild_settings);
        settings.sort_by_key(|s| s.guild_id);
        write_documents(&dir.join(SETTINGS_FILE), &settings).await?;

        let mut logs: Vec<PunishmentLog> = collect(&self.punishment_logs);
        logs.sort_by_key(|l| l.created_at);
        write_documents(&dir.join(PUNISHMENTS_FILE), &logs).await?;

        let mut disputes: Vec<Dispute> = collect(&self.disputes);
        disputes.sort_by_key(|d| d.created_at);
        write_documents(&dir.join(DISPUTES_FILE), &disputes).await?;

        let mut accounts: Vec<Account> = collect(&self.accounts);
        accounts.sort_by_key(|a| a.created_at);
        write_documents(&dir.join(ACCOUNTS_FILE), &accounts).await?;

        Ok(())
    }

    /// The platform handle, once the bot is connected
    #[must_use]
    pub fn platform(&self) -> Option<Arc<dyn Platform>> {
        self.platform.get().cloned()
    }

    /// Install the platform handle; only the first call has an effect
    pub fn set_platform(&self, platform: Arc<dyn Platform>) {
        if self.platform.set(platform).is_err() {
            tracing::debug!("Platform already installed");
        }
    }

    #[must_use]
    pub fn shard_manager(&self) -> Option<Arc<serenity::ShardManager>> {
        self.shard_manager.get().cloned()
    }

    pub fn set_shard_manager(&self, manager: Arc<serenity::ShardManager>) {
        let _ = self.shard_manager.set(manager);
    }

    /// Sender for the timed sanction task
    #[must_use]
    pub fn sanction_sender(&self) -> Option<Sender<SanctionCheckRequest>> {
        self.sanction_tx.get().cloned()
    }

    pub fn set_sanction_sender(&self, tx: Sender<SanctionCheckRequest>) {
        let _ = self.sanction_tx.set(tx);
    }
}

/// Shared state behind [`Data`]
pub struct DataInner {
    // Persisted documents
    pub guild_settings: DashMap<GuildId, GuildSettings>,
    pub punishment_logs: DashMap<Uuid, PunishmentLog>,
    pub disputes: DashMap<Uuid, Dispute>,
    pub accounts: DashMap<Uuid, Account>,

    // Runtime state
    pub temp_voice: TempVoiceRegistry,
    pub verifications: VerificationRegistry,
    pub sanctions: SanctionStore,
    pub autoreply_cooldowns: DashMap<ChannelId, Instant>,
    pub started_at: DateTime<Utc>,

    platform: OnceLock<Arc<dyn Platform>>,
    shard_manager: OnceLock<Arc<serenity::ShardManager>>,
    sanction_tx: OnceLock<Sender<SanctionCheckRequest>>,
    storage: Option<PathBuf>,
    save_lock: Mutex<()>,
}

impl DataInner {
    fn new(storage: Option<PathBuf>) -> Self {
        Self {
            guild_settings: DashMap::new(),
            punishment_logs: DashMap::new(),
            disputes: DashMap::new(),
            accounts: DashMap::new(),
            temp_voice: TempVoiceRegistry::default(),
            verifications: VerificationRegistry::default(),
            sanctions: SanctionStore::default(),
            autoreply_cooldowns: DashMap::new(),
            started_at: Utc::now(),
            platform: OnceLock::new(),
            shard_manager: OnceLock::new(),
            sanction_tx: OnceLock::new(),
            storage,
            save_lock: Mutex::new(()),
        }
    }
}

fn collect<K, V>(map: &DashMap<K, V>) -> Vec<V>
where
    K: Eq + std::hash::Hash,
    V: Clone,
{
    map.iter().map(|entry| entry.value().clone()).collect()
}

async fn read_documents<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, crate::Error> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
        Ok(content) => Ok(serde_yaml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

async fn write_documents<T: Serialize>(path: &Path, documents: &[T]) -> Result<(), crate::Error> {
    let yaml = serde_yaml::to_string(documents)?;
    tokio::fs::write(path, yaml).await?;
    Ok(())
}
