//! Mode transition controller
//!
//! Drives the Existing / Override / Suggest state machine for an inspected
//! page. The installed rule is the only source of truth: the mode reported
//! back to the panel is always re-detected from the rule store after a
//! change, never assumed from the request.

use crate::collector::SuggestionSource;
use crate::config::ConfigStore;
use crate::mode::OverrideMode;
use crate::navigation::{InspectedPage, NavigationEvent, NavigationPhase};
use crate::rules::{HeaderAction, OriginPattern, RuleManager};
use crate::snapshot::{ObservedResponse, PolicySnapshotStore, TabId};
use crate::store::{KeyValueStore, RuleStore};
use crate::{OverrideError, Result};
use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of a completed mode change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    /// Mode detected after the change
    pub mode: OverrideMode,
    /// A header rule was added or removed; the page must be reloaded to see it
    pub reload_required: bool,
    /// Policy text for the new mode, when it is known locally.
    /// Suggestions live on the collector and are fetched on demand.
    pub policy_text: Option<String>,
}

/// What the panel needs to render the current page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelState {
    pub mode: OverrideMode,
    pub policy_text: Option<String>,
    /// Whether the site served a policy of its own
    pub has_existing_policy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelUpdate {
    /// Navigation started; drop what is displayed
    Cleared,
    /// Navigation completed; render this
    Refreshed(PanelState),
}

#[derive(Clone)]
pub struct OverrideController {
    rules: RuleManager,
    snapshots: PolicySnapshotStore,
    config: ConfigStore,
    collector: Arc<dyn SuggestionSource>,
    /// Origin -> turn lock, so transitions on one origin run one at a time
    origin_queues: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl OverrideController {
    pub fn new(
        rule_store: Arc<dyn RuleStore>,
        storage: Arc<dyn KeyValueStore>,
        collector: Arc<dyn SuggestionSource>,
    ) -> Self {
        let snapshots = PolicySnapshotStore::new(storage.clone());
        let config = ConfigStore::new(storage);
        let rules = RuleManager::new(rule_store, snapshots.clone(), config.clone());

        Self {
            rules,
            snapshots,
            config,
            collector,
            origin_queues: Arc::new(DashMap::new()),
        }
    }

    pub fn rules(&self) -> &RuleManager {
        &self.rules
    }

    pub fn snapshots(&self) -> &PolicySnapshotStore {
        &self.snapshots
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Install or update hook: restore default settings and drop stale rules
    pub async fn on_installed(&self) -> Result<()> {
        self.config.init_defaults().await?;
        let removed = self.rules.clear_all().await?;
        info!("Installed defaults, removed {} stale rule(s)", removed);
        Ok(())
    }

    /// Mode for display; a failing rule store reads as `Existing`
    pub async fn detect_mode(&self, page: &InspectedPage) -> OverrideMode {
        let rule = self.rules.find_rule_for_origin(&page.url).await;
        OverrideMode::detect(rule.as_ref())
    }

    /// Mode derived from the installed rule. Store failures are returned.
    pub async fn current_mode(&self, page: &InspectedPage) -> Result<OverrideMode> {
        let rule = self.rules.try_find_rule_for_origin(&page.url).await?;
        Ok(OverrideMode::detect(rule.as_ref()))
    }

    /// Switch the page's origin to `new_mode`.
    ///
    /// `payload` is the override text for `Override`; without it the
    /// observed policy, then the starter policy, is used. Requesting the
    /// mode that is already active is a no-op.
    pub async fn transition(
        &self,
        page: &InspectedPage,
        new_mode: OverrideMode,
        payload: Option<String>,
    ) -> Result<TransitionOutcome> {
        let pattern = OriginPattern::from_url(&page.url)?;
        self.in_turn(
            pattern.origin(),
            self.transition_in_turn(page, &pattern, new_mode, payload.as_deref()),
        )
        .await
    }

    /// Apply edited override text, switching to `Override` if needed
    pub async fn update_override(&self, page: &InspectedPage, policy_text: &str) -> Result<TransitionOutcome> {
        let pattern = OriginPattern::from_url(&page.url)?;
        self.in_turn(pattern.origin(), self.replace_override(page, policy_text))
            .await
    }

    /// Suggested policy captured by the collector for this page
    pub async fn fetch_suggestion(&self, page: &InspectedPage) -> Result<String> {
        let collector_url = self.config.suggest_service().await?;
        self.collector
            .fetch_suggestion(&collector_url, &page.url)
            .await?
            .ok_or_else(|| OverrideError::NoSuggestion {
                origin: origin_label(&page.url),
            })
    }

    /// Enforce the collector's suggestion as the override policy.
    ///
    /// The suggestion is fetched before any rule is touched, so a collector
    /// failure leaves the current mode in place.
    pub async fn apply_suggestion(&self, page: &InspectedPage) -> Result<TransitionOutcome> {
        let pattern = OriginPattern::from_url(&page.url)?;
        let suggestion = self.fetch_suggestion(page).await?;

        info!("Applying suggested policy for {}", pattern.origin());
        self.in_turn(pattern.origin(), self.replace_override(page, &suggestion))
            .await
    }

    /// Discard violations captured for this page so suggestion starts over
    pub async fn reset_suggestions(&self, page: &InspectedPage) -> Result<()> {
        let collector_url = self.config.suggest_service().await?;
        self.collector.reset(&collector_url, &page.url).await
    }

    /// Policy text to show for `mode`: the served policy, the override
    /// (or the text an override would start from), or the suggestion
    pub async fn effective_policy_text(&self, page: &InspectedPage, mode: OverrideMode) -> Result<String> {
        match mode {
            OverrideMode::Existing => Ok(self.snapshots.load(page.tab_id).await?.unwrap_or_default()),
            OverrideMode::Override => {
                let installed = self
                    .rules
                    .try_find_rule_for_origin(&page.url)
                    .await?
                    .and_then(|rule| rule.header_action());
                match installed {
                    Some(HeaderAction::Override { policy }) => Ok(policy),
                    _ => match self.snapshots.load(page.tab_id).await? {
                        Some(existing) if !existing.trim().is_empty() => Ok(existing),
                        _ => self.config.starter_csp().await,
                    },
                }
            }
            OverrideMode::Suggest => match self.fetch_suggestion(page).await {
                Ok(suggestion) => Ok(suggestion),
                Err(OverrideError::NoSuggestion { .. }) => Ok(String::new()),
                Err(e) => Err(e),
            },
        }
    }

    /// Re-derive everything the panel shows from the current rule state
    pub async fn panel_state(&self, page: &InspectedPage) -> Result<PanelState> {
        let mode = self.current_mode(page).await?;
        let existing = self.snapshots.load(page.tab_id).await?;
        let policy_text = match mode {
            OverrideMode::Existing => existing.clone(),
            _ => self.local_policy_text(page, mode).await?,
        };

        Ok(PanelState {
            mode,
            policy_text,
            has_existing_policy: existing.is_some_and(|policy| !policy.trim().is_empty()),
        })
    }

    /// Handle a navigation signal for an inspected tab
    pub async fn on_navigation(&self, event: &NavigationEvent) -> Result<PanelUpdate> {
        match event.phase {
            NavigationPhase::Start => {
                self.snapshots.invalidate(event.tab_id).await?;
                Ok(PanelUpdate::Cleared)
            }
            NavigationPhase::Complete => {
                let page = event.page();
                // Wait out any transition in flight so the rendered mode is the settled one
                let state = match OriginPattern::from_url(&page.url) {
                    Ok(pattern) => self.in_turn(pattern.origin(), self.panel_state(&page)).await?,
                    Err(_) => self.panel_state(&page).await?,
                };

                Ok(PanelUpdate::Refreshed(state))
            }
        }
    }

    /// Response observer hook
    pub async fn on_response(&self, response: &ObservedResponse) -> Result<()> {
        self.snapshots.observe_response(response).await.map(|_| ())
    }

    pub async fn on_tab_removed(&self, tab_id: TabId) -> Result<()> {
        self.snapshots.tab_removed(tab_id).await
    }

    /// Origins with a transition running or waiting for its turn
    pub fn active_origin_gates(&self) -> usize {
        self.origin_queues.len()
    }

    /// Run `work` once every earlier call for `origin` has finished
    async fn in_turn<T, F>(&self, origin: &str, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let gate = self.origin_gate(origin);
        let result = {
            let _turn = gate.lock().await;
            work.await
        };
        self.release_gate(origin, gate);
        result
    }

    fn origin_gate(&self, origin: &str) -> Arc<Mutex<()>> {
        self.origin_queues.entry(origin.to_string()).or_default().clone()
    }

    /// Drop the origin's gate once no other caller holds or waits on it
    fn release_gate(&self, origin: &str, gate: Arc<Mutex<()>>) {
        drop(gate);
        self.origin_queues
            .remove_if(origin, |_, gate| Arc::strong_count(gate) == 1);
    }

    async fn transition_in_turn(
        &self,
        page: &InspectedPage,
        pattern: &OriginPattern,
        new_mode: OverrideMode,
        payload: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let old_mode = self.current_mode(page).await?;
        if old_mode == new_mode {
            debug!("{} already in {}", pattern.origin(), new_mode);
            return Ok(TransitionOutcome {
                mode: old_mode,
                reload_required: false,
                policy_text: self.local_policy_text(page, old_mode).await?,
            });
        }

        info!("Transition {} -> {} for {}", old_mode, new_mode, pattern.origin());
        self.switch(page, old_mode, new_mode, payload).await
    }

    /// Tear down the old mode's rule, then install the new one
    async fn switch(
        &self,
        page: &InspectedPage,
        old_mode: OverrideMode,
        new_mode: OverrideMode,
        payload: Option<&str>,
    ) -> Result<TransitionOutcome> {
        let mut reload_required = false;

        if old_mode.has_rule() {
            match self.rules.clear_override(page).await {
                Ok(removed) => reload_required |= removed,
                Err(e) => return Err(self.failed(page, new_mode, e).await),
            }
        }

        let installed = match new_mode {
            OverrideMode::Existing => None,
            OverrideMode::Override => Some(self.rules.install_override(page, payload).await),
            OverrideMode::Suggest => Some(self.rules.install_reporting(page).await),
        };
        if let Some(result) = installed {
            if let Err(e) = result {
                return Err(self.failed(page, new_mode, e).await);
            }
            reload_required = true;
        }

        self.settled(page, reload_required).await
    }

    /// Override with `policy_text`, replacing an existing override in one batch
    async fn replace_override(&self, page: &InspectedPage, policy_text: &str) -> Result<TransitionOutcome> {
        let old_mode = self.current_mode(page).await?;
        if old_mode != OverrideMode::Override {
            return self.switch(page, old_mode, OverrideMode::Override, Some(policy_text)).await;
        }

        if let Err(e) = self.rules.install_override(page, Some(policy_text)).await {
            return Err(self.failed(page, OverrideMode::Override, e).await);
        }
        self.settled(page, true).await
    }

    async fn settled(&self, page: &InspectedPage, reload_required: bool) -> Result<TransitionOutcome> {
        let mode = self.current_mode(page).await?;
        Ok(TransitionOutcome {
            mode,
            reload_required,
            policy_text: self.local_policy_text(page, mode).await?,
        })
    }

    /// Wrap a failed install with the mode re-detected afterwards.
    /// If the mode cannot be read back either, the original error is returned.
    async fn failed(&self, page: &InspectedPage, requested: OverrideMode, source: OverrideError) -> OverrideError {
        let current = match self.current_mode(page).await {
            Ok(current) => current,
            Err(e) => {
                warn!(
                    "Transition to {} for {} failed and the mode could not be re-detected: {} ({})",
                    requested, page.url, source, e
                );
                return source;
            }
        };
        warn!(
            "Transition to {} for {} failed, now in {}: {}",
            requested, page.url, current, source
        );
        OverrideError::TransitionFailed {
            requested,
            current,
            source: Box::new(source),
        }
    }

    async fn local_policy_text(&self, page: &InspectedPage, mode: OverrideMode) -> Result<Option<String>> {
        match mode {
            OverrideMode::Existing => self.snapshots.load(page.tab_id).await,
            OverrideMode::Override => Ok(self
                .rules
                .try_find_rule_for_origin(&page.url)
                .await?
                .and_then(|rule| rule.header_action())
                .map(|action| action.policy().to_string())),
            OverrideMode::Suggest => Ok(None),
        }
    }
}

fn origin_label(url: &str) -> String {
    OriginPattern::from_url(url)
        .map(|pattern| pattern.origin().to_string())
        .unwrap_or_else(|_| url.to_string())
}
