//! # Store Events
//!
//! Event types broadcast to the storefront's live feed. Observability
//! only; no session state depends on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of store event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreEventKind {
    /// A cart line was added, adjusted or removed
    CartUpdated,
    /// Checkout cleared the cart
    CheckoutCompleted,
    /// Catalog filters changed
    FiltersChanged,
    /// Catalog filters were reset to defaults
    FiltersReset,
    /// An insight panel fired a provider request
    InsightRequested,
    /// The provider answered and the panel has fresh content
    InsightDelivered,
    /// The provider call failed; the panel shows the generic notice
    InsightFailed,
    /// A coach reply started streaming
    CoachReplyStarted,
    /// A coach reply was committed in full
    CoachReplyCompleted,
    /// A coach reply failed mid-stream
    CoachReplyFailed,
}

/// An event in the store feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreEvent {
    /// Unique event ID
    pub id: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Kind of event
    pub kind: StoreEventKind,
    /// Panel that produced this event (cart, catalog, health_tips, ...)
    pub panel: String,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl StoreEvent {
    /// Create a new event
    pub fn new(kind: StoreEventKind, panel: &str) -> Self {
        Self {
            id: event_id(),
            timestamp: Utc::now(),
            kind,
            panel: panel.to_string(),
            data: None,
        }
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Generate a simple unique event id
fn event_id() -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    format!("{:x}-{:x}", nanos, rand_u32())
}

/// Simple random number (not cryptographic)
fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = StoreEvent::new(StoreEventKind::CheckoutCompleted, "cart")
            .with_data(serde_json::json!({ "subtotal": 40.0 }));

        assert_eq!(event.panel, "cart");
        assert_eq!(event.kind, StoreEventKind::CheckoutCompleted);
        assert!(event.data.is_some());
    }

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&StoreEventKind::CoachReplyFailed).unwrap();
        assert_eq!(json, "\"coach_reply_failed\"");
    }
}
