//! CSP Override Core Library
//!
//! This library tracks which Content-Security-Policy mode each inspected
//! origin is in (observing the served policy, overriding it, or collecting
//! violations for a suggested policy) and keeps exactly one declarative
//! header rule per origin in sync with that mode.

/// Mode transition state machine
pub mod controller;

/// Violation collector client
pub mod collector;

/// Configuration types and the settings store
pub mod config;

/// Error types for override operations
pub mod error;

pub mod mode;
pub mod navigation;

/// Header rules, the active-rule locator and the rule installer
pub mod rules;

pub mod snapshot;

/// Rule store and key-value storage capabilities
pub mod store;

pub use collector::{CollectorClient, SuggestionSource};
pub use config::{ConfigStore, OverrideConfig, DEFAULT_CSP_REPORT_SERVICE, DEFAULT_STARTER_CSP};
pub use controller::{OverrideController, PanelState, PanelUpdate, TransitionOutcome};
pub use error::OverrideError;
pub use mode::OverrideMode;
pub use navigation::{InspectedPage, NavigationEvent, NavigationPhase};
pub use rules::{
    HeaderAction, HeaderRule, OriginPattern, OverrideSummary, RuleId, RuleManager,
    CSP_REPORT_ONLY_HEADER,
};
pub use snapshot::{ObservedResponse, PolicySnapshotStore, TabId, CSP_HEADER};
pub use store::{
    FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, MemoryRuleStore, RuleStore, RuleUpdate,
};

/// Result type alias for override operations
pub type Result<T> = std::result::Result<T, OverrideError>;
