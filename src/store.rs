//! Per-domain signing configuration, persisted as a single JSON document.
//!
//! The document maps each normalized domain to its [`DomainConfig`]. Records
//! are created once and never rewritten. Every mutation reloads the
//! document under an exclusive lock and replaces it atomically, so two
//! processes adding different domains do not drop each other's entries.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::Settings;
use crate::domain::{
    derive_alias, derive_password, domain_to_package_name, keystore_file_name, url_to_domain,
};
use crate::error::Result;
use crate::keystore::KeystoreProvisioner;
use crate::utils::{FileLock, lock_path, write_atomic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain: String,
    pub package_name: String,
    pub keystore_path: PathBuf,
    pub keystore_password: String,
    pub key_alias: String,
    pub key_password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

impl DomainConfig {
    /// Derive every field from `domain`. `created_at` is left unset.
    pub fn new(domain: &str, keystore_path: PathBuf) -> Self {
        let password = derive_password(domain);
        Self {
            domain: domain.to_string(),
            package_name: domain_to_package_name(domain),
            keystore_path,
            keystore_password: password.clone(),
            key_alias: derive_alias(domain),
            key_password: password,
            created_at: None,
        }
    }

    /// Gradle `key.properties` entries for signing with this config.
    pub fn key_properties(&self) -> std::collections::HashMap<String, String> {
        [
            ("storePassword", self.keystore_password.clone()),
            ("keyPassword", self.key_password.clone()),
            ("keyAlias", self.key_alias.clone()),
            ("storeFile", self.keystore_path.display().to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}

/// Compute the config for `url` without reading or writing anything.
pub fn derive(url: &str, settings: &Settings) -> Result<DomainConfig> {
    let domain = url_to_domain(url)?;
    let keystore_path = settings.recorded_keystore_path(&keystore_file_name(&domain))?;
    Ok(DomainConfig::new(&domain, keystore_path))
}

/// Read the config document. Missing, empty and malformed files all load
/// as an empty map; the latter two are logged.
pub fn load_document(path: &Path) -> BTreeMap<String, DomainConfig> {
    if !path.exists() {
        return BTreeMap::new();
    }
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(file = %path.display(), "failed to read config document: {e}");
            return BTreeMap::new();
        }
    };
    if content.trim().is_empty() {
        return BTreeMap::new();
    }
    match serde_json::from_str(&content) {
        Ok(configs) => configs,
        Err(e) => {
            tracing::warn!(
                file = %path.display(),
                "config document is malformed, starting empty: {e}"
            );
            BTreeMap::new()
        }
    }
}

#[derive(Debug)]
pub struct ConfigStore {
    settings: Settings,
    provisioner: KeystoreProvisioner,
    configs: BTreeMap<String, DomainConfig>,
}

impl ConfigStore {
    /// Open the store described by `settings`, loading the current document.
    pub fn open(settings: Settings) -> Self {
        let configs = load_document(&settings.config_file);
        tracing::debug!(
            file = %settings.config_file.display(),
            domains = configs.len(),
            "loaded config document"
        );
        Self {
            provisioner: KeystoreProvisioner::new(settings.clone()),
            settings,
            configs,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Return the config for `url`, creating and persisting it (and its
    /// keystore) on first use. Existing records are returned unchanged.
    pub fn get_or_create(&mut self, url: &str) -> Result<DomainConfig> {
        let domain = url_to_domain(url)?;
        if let Some(config) = self.configs.get(&domain) {
            tracing::debug!(domain, "using existing domain config");
            return Ok(config.clone());
        }

        let _lock = FileLock::acquire(&lock_path(&self.settings.config_file))?;
        self.configs = load_document(&self.settings.config_file);
        if let Some(config) = self.configs.get(&domain) {
            tracing::debug!(domain, "domain config was created concurrently");
            return Ok(config.clone());
        }

        tracing::info!(domain, "creating domain config");
        // Provision at the recorded path so the record always resolves to
        // the file that was written.
        let recorded = self
            .settings
            .recorded_keystore_path(&keystore_file_name(&domain))?;
        let mut config = DomainConfig::new(&domain, recorded);
        self.provisioner.ensure_keystore(
            &domain,
            &config.keystore_path,
            &config.keystore_password,
            &config.key_alias,
        )?;
        config.created_at = Some(Local::now().naive_local());

        self.configs.insert(domain, config.clone());
        self.save();
        Ok(config)
    }

    pub fn get(&self, domain: &str) -> Option<&DomainConfig> {
        self.configs.get(domain)
    }

    /// All known domains, sorted.
    pub fn list(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &DomainConfig> {
        self.configs.values()
    }

    /// Drop the record for `domain`. The keystore file is kept on disk.
    /// Returns whether the domain was known.
    pub fn remove(&mut self, domain: &str) -> Result<bool> {
        let _lock = FileLock::acquire(&lock_path(&self.settings.config_file))?;
        self.configs = load_document(&self.settings.config_file);
        if self.configs.remove(domain).is_none() {
            return Ok(false);
        }
        self.save();
        tracing::info!(domain, "removed domain config");
        Ok(true)
    }

    /// Write the whole document. Failures are logged, not returned.
    fn save(&self) {
        let result = serde_json::to_vec_pretty(&self.configs)
            .map_err(Into::into)
            .and_then(|json| write_atomic(&self.settings.config_file, &json));
        if let Err(e) = result {
            tracing::warn!(
                file = %self.settings.config_file.display(),
                "failed to save config document: {e}"
            );
        }
    }
}
