//! Consumed capabilities: the declarative rule store and key-value storage
//!
//! The engine only talks to these traits. In-process implementations are
//! provided for embedding and tests; a browser host plugs in its own.

use crate::rules::{HeaderRule, RuleId};
use crate::{OverrideError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// One atomic batch submitted to the rule store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_rules: Vec<HeaderRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove_rule_ids: Vec<RuleId>,
}

impl RuleUpdate {
    pub fn is_empty(&self) -> bool {
        self.add_rules.is_empty() && self.remove_rule_ids.is_empty()
    }
}

/// Dynamic header-rewrite rule store
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Whether the rule-management capability exists in this host
    fn is_available(&self) -> bool {
        true
    }

    /// Enumerate all currently installed dynamic rules
    async fn dynamic_rules(&self) -> Result<Vec<HeaderRule>>;

    /// Apply removals and additions together, or not at all
    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<()>;
}

/// Async string key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// In-process rule store with the same validation a browser applies
#[derive(Debug)]
pub struct MemoryRuleStore {
    rules: RwLock<BTreeMap<RuleId, HeaderRule>>,
    available: AtomicBool,
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// A store that reports the capability as missing
    pub fn unavailable() -> Self {
        let store = Self::new();
        store.set_available(false);
        store
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.is_available() {
            Ok(())
        } else {
            Err(OverrideError::RuleStore(
                "declarative rule management is not available".to_string(),
            ))
        }
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn dynamic_rules(&self) -> Result<Vec<HeaderRule>> {
        self.ensure_available()?;
        Ok(self.rules.read().await.values().cloned().collect())
    }

    async fn update_dynamic_rules(&self, update: RuleUpdate) -> Result<()> {
        self.ensure_available()?;

        let mut rules = self.rules.write().await;
        let mut next = rules.clone();

        // Unknown ids are ignored, as browsers do
        for id in &update.remove_rule_ids {
            next.remove(id);
        }

        let mut added = HashSet::new();
        for rule in &update.add_rules {
            if rule.id == 0 {
                return Err(OverrideError::RuleStore(
                    "rule id must be a positive integer".to_string(),
                ));
            }
            validate_regex_filter(&rule.condition.regex_filter)?;
            if !added.insert(rule.id) || next.contains_key(&rule.id) {
                return Err(OverrideError::RuleStore(format!(
                    "rule with id {} already exists",
                    rule.id
                )));
            }
            next.insert(rule.id, rule.clone());
        }

        debug!(
            "Rule store update: +{} -{} ({} rules installed)",
            update.add_rules.len(),
            update.remove_rule_ids.len(),
            next.len()
        );
        *rules = next;
        Ok(())
    }
}

fn validate_regex_filter(filter: &str) -> Result<()> {
    if filter.is_empty() {
        return Err(OverrideError::configuration(
            "rule regexFilter must not be empty",
        ));
    }
    regex::Regex::new(filter).map_err(|e| {
        OverrideError::configuration(format!("invalid regexFilter '{}': {}", filter, e))
    })?;
    Ok(())
}

/// In-process key-value store
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: DashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.remove(key);
        Ok(())
    }
}

/// Key-value store persisted as a single JSON object file
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => serde_json::from_str(&content).map_err(|e| self.storage_error(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.storage_error(e)),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.storage_error(e))?;
            }
        }
        let content = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| self.storage_error(e))
    }

    fn storage_error(&self, e: impl std::fmt::Display) -> OverrideError {
        OverrideError::Storage(format!("{}: {}", self.path.display(), e))
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value);
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
