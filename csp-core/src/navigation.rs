//! Navigation signals delivered by the host's message relay

use crate::snapshot::TabId;
use serde::{Deserialize, Serialize};

/// The page being inspected, passed explicitly to every operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectedPage {
    pub tab_id: TabId,
    pub url: String,
}

impl InspectedPage {
    pub fn new(tab_id: TabId, url: impl Into<String>) -> Self {
        Self {
            tab_id,
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationPhase {
    Start,
    Complete,
}

/// `{phase, tabId, url}` as relayed to the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub phase: NavigationPhase,
    pub tab_id: TabId,
    pub url: String,
}

impl NavigationEvent {
    pub fn page(&self) -> InspectedPage {
        InspectedPage::new(self.tab_id, self.url.clone())
    }
}
