//! Collaborator seams: artifact persistence and progress notification

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

use storyflow_utils::error::StoreError;
use storyflow_utils::types::{Artifact, ProcessGraph};

/// Event sent to the notification channel for one request
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Narrative items available so far; advisory only
    Progress {
        subject_id: String,
        narrative_items: Vec<String>,
    },
    Completed {
        subject_id: String,
        artifact: Arc<Artifact>,
    },
    /// Terminal failure with a user-facing, redacted reason
    Failed { subject_id: String, error: String },
}

impl GenerationEvent {
    #[must_use]
    pub fn subject_id(&self) -> &str {
        match self {
            Self::Progress { subject_id, .. }
            | Self::Completed { subject_id, .. }
            | Self::Failed { subject_id, .. } => subject_id,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Receives progress and terminal events.
///
/// Delivery is best-effort: implementations must not block and must not
/// fail the request.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: GenerationEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _event: GenerationEvent) {}
}

/// Forwards events into a bounded tokio channel, dropping them when it is full.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<GenerationEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(sender: mpsc::Sender<GenerationEvent>) -> Self {
        Self { sender }
    }

    /// Sink plus its receiving end
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<GenerationEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(sender), receiver)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, event: GenerationEvent) {
        if let Err(e) = self.sender.try_send(event) {
            debug!(error = %e, "Dropped generation event");
        }
    }
}

/// Durable storage for accepted artifacts.
///
/// Narrative items are saved one by one; the graph is saved as one unit.
/// Called only after the quality gate has accepted an artifact.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StoreError` if the item cannot be written.
    async fn save_narrative_item(
        &self,
        subject_id: &str,
        index: usize,
        item: &str,
    ) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns `StoreError` if the graph cannot be written.
    async fn save_graph(&self, subject_id: &str, graph: &ProcessGraph) -> Result<(), StoreError>;
}

/// Write every part of an accepted artifact, stopping at the first failure.
///
/// # Errors
///
/// Returns the first `StoreError` reported by the store.
pub async fn persist_artifact(
    store: &dyn ArtifactStore,
    subject_id: &str,
    artifact: &Artifact,
) -> Result<(), StoreError> {
    for (index, item) in artifact.narrative_items.iter().enumerate() {
        store.save_narrative_item(subject_id, index, item).await?;
    }
    store.save_graph(subject_id, &artifact.graph).await
}

/// What an [`InMemoryArtifactStore`] holds for one subject
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredArtifacts {
    pub narrative_items: Vec<String>,
    pub graph: Option<ProcessGraph>,
}

/// Process-local [`ArtifactStore`]. Later writes replace earlier ones.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    subjects: Mutex<HashMap<String, StoredArtifacts>>,
    unavailable: AtomicBool,
}

impl InMemoryArtifactStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    #[must_use]
    pub fn get(&self, subject_id: &str) -> Option<StoredArtifacts> {
        self.lock().get(subject_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, StoredArtifacts>> {
        self.subjects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn save_narrative_item(
        &self,
        subject_id: &str,
        index: usize,
        item: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut subjects = self.lock();
        let items = &mut subjects.entry(subject_id.to_string()).or_default().narrative_items;
        if index == 0 {
            items.clear();
        }
        if index > items.len() {
            return Err(StoreError::WriteFailed {
                subject_id: subject_id.to_string(),
                kind: "narrative item".to_string(),
                reason: format!("index {index} skips past {}", items.len()),
            });
        }
        items.truncate(index);
        items.push(item.to_string());
        Ok(())
    }

    async fn save_graph(&self, subject_id: &str, graph: &ProcessGraph) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock()
            .entry(subject_id.to_string())
            .or_default()
            .graph = Some(graph.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyflow_utils::types::{Node, NodeKind};

    fn artifact() -> Artifact {
        Artifact {
            narrative_items: vec!["first".to_string(), "second".to_string()],
            graph: ProcessGraph {
                nodes: vec![Node {
                    id: "1".to_string(),
                    label: "Start".to_string(),
                    kind: NodeKind::Start,
                }],
                edges: vec![],
            },
            confidence: 0.5,
        }
    }

    #[tokio::test]
    async fn test_persist_writes_items_and_graph() {
        let store = InMemoryArtifactStore::new();
        persist_artifact(&store, "p1", &artifact()).await.unwrap();
        persist_artifact(&store, "p1", &artifact()).await.unwrap();

        let stored = store.get("p1").unwrap();
        assert_eq!(stored.narrative_items, vec!["first", "second"]);
        assert_eq!(stored.graph.unwrap().nodes.len(), 1);
        assert!(store.get("p2").is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails() {
        let store = InMemoryArtifactStore::new();
        store.set_unavailable(true);
        let err = persist_artifact(&store, "p1", &artifact()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.get("p1").is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelSink::channel(1);
        for n in 0..3 {
            sink.notify(GenerationEvent::Failed {
                subject_id: format!("p{n}"),
                error: "x".to_string(),
            });
        }
        let first = rx.recv().await.unwrap();
        assert_eq!(first.subject_id(), "p0");
        assert!(first.is_terminal());
        assert!(rx.try_recv().is_err());
    }
}
