//! Per-tab snapshots of the policy a site actually serves

use crate::store::KeyValueStore;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

pub const CSP_HEADER: &str = "Content-Security-Policy";

/// Browser tab identifier
pub type TabId = i32;

/// A response delivered by the response observer
#[derive(Debug, Clone)]
pub struct ObservedResponse {
    pub tab_id: TabId,
    /// 0 for the top-level document
    pub frame_id: i32,
    pub method: String,
    pub headers: Vec<(String, String)>,
}

impl ObservedResponse {
    fn is_top_level_get(&self) -> bool {
        self.frame_id == 0 && self.method.eq_ignore_ascii_case("GET")
    }

    /// First `Content-Security-Policy` header, matched case-insensitively
    pub fn csp_header(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(CSP_HEADER))
            .map(|(_, value)| value.as_str())
    }
}

/// Cache of the most recently observed served policy, keyed by tab
#[derive(Clone)]
pub struct PolicySnapshotStore {
    storage: Arc<dyn KeyValueStore>,
}

impl PolicySnapshotStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self { storage }
    }

    fn key(tab_id: TabId) -> String {
        format!("{}-existing", tab_id)
    }

    /// Record the served policy of a top-level GET response.
    ///
    /// Returns the recorded policy, or `None` when the response was ignored
    /// or carried no policy (an earlier snapshot is then left in place).
    pub async fn observe_response(&self, response: &ObservedResponse) -> Result<Option<String>> {
        if !response.is_top_level_get() {
            return Ok(None);
        }

        match response.csp_header() {
            Some(policy) => {
                debug!("Tab {} {}: {}", response.tab_id, CSP_HEADER, policy);
                self.storage
                    .set(&Self::key(response.tab_id), policy.to_string())
                    .await?;
                Ok(Some(policy.to_string()))
            }
            None => Ok(None),
        }
    }

    pub async fn load(&self, tab_id: TabId) -> Result<Option<String>> {
        self.storage.get(&Self::key(tab_id)).await
    }

    /// Drop the snapshot when the tab starts navigating elsewhere
    pub async fn invalidate(&self, tab_id: TabId) -> Result<()> {
        debug!("Invalidating policy snapshot for tab {}", tab_id);
        self.storage.remove(&Self::key(tab_id)).await
    }

    pub async fn tab_removed(&self, tab_id: TabId) -> Result<()> {
        info!("Cleaning up {}", Self::key(tab_id));
        self.storage.remove(&Self::key(tab_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryKeyValueStore;

    fn response(tab_id: TabId, frame_id: i32, method: &str, csp: Option<&str>) -> ObservedResponse {
        let mut headers = vec![("content-type".to_string(), "text/html".to_string())];
        if let Some(csp) = csp {
            headers.push(("content-security-policy".to_string(), csp.to_string()));
        }
        ObservedResponse {
            tab_id,
            frame_id,
            method: method.to_string(),
            headers,
        }
    }

    #[tokio::test]
    async fn test_records_main_frame_get_policy() {
        let snapshots = PolicySnapshotStore::new(Arc::new(MemoryKeyValueStore::new()));

        let recorded = snapshots
            .observe_response(&response(5, 0, "GET", Some("default-src 'self'")))
            .await
            .unwrap();
        assert_eq!(recorded.as_deref(), Some("default-src 'self'"));
        assert_eq!(snapshots.load(5).await.unwrap().as_deref(), Some("default-src 'self'"));
        assert_eq!(snapshots.load(6).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ignores_subframes_and_non_get() {
        let snapshots = PolicySnapshotStore::new(Arc::new(MemoryKeyValueStore::new()));

        snapshots
            .observe_response(&response(5, 3, "GET", Some("default-src 'none'")))
            .await
            .unwrap();
        snapshots
            .observe_response(&response(5, 0, "POST", Some("default-src 'none'")))
            .await
            .unwrap();
        assert_eq!(snapshots.load(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalidate_and_tab_removed() {
        let snapshots = PolicySnapshotStore::new(Arc::new(MemoryKeyValueStore::new()));
        snapshots
            .observe_response(&response(1, 0, "GET", Some("script-src 'self'")))
            .await
            .unwrap();
        snapshots
            .observe_response(&response(2, 0, "GET", Some("img-src *")))
            .await
            .unwrap();

        snapshots.invalidate(1).await.unwrap();
        snapshots.tab_removed(2).await.unwrap();

        assert_eq!(snapshots.load(1).await.unwrap(), None);
        assert_eq!(snapshots.load(2).await.unwrap(), None);
    }
}
