use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::tag::TagChange;

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives tag-cache change notifications
#[async_trait]
pub trait TagListener: Send + Sync {
    async fn on_tag_changed(&self, change: &TagChange) -> ListenerResult;
}

/// Receives the watched subset of facts after it changed
#[async_trait]
pub trait FactListener: Send + Sync {
    async fn on_facts_changed(&self, facts: &BTreeMap<String, bool>) -> ListenerResult;
}

/// Receives a freshly composed domain snapshot
#[async_trait]
pub trait SnapshotListener<S: Send + Sync>: Send + Sync {
    async fn on_snapshot(&self, snapshot: &S) -> ListenerResult;
}
