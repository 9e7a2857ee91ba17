//! Single-flight registry for identical concurrent requests
//!
//! The first request for a fingerprint becomes the leader and generates.
//! Later requests for the same fingerprint wait until the leader finishes,
//! then look in the cache again. If the leader left nothing cacheable, one of
//! them claims leadership next.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;

use storyflow_utils::fingerprint::Fingerprint;

#[derive(Debug, Default)]
pub struct InflightRegistry {
    leaders: Mutex<HashMap<Fingerprint, watch::Sender<()>>>,
}

/// Result of [`InflightRegistry::claim`]
#[derive(Debug)]
pub enum Claim {
    /// Caller generates; dropping the guard wakes every waiter
    Leader(LeaderGuard),
    /// Another request is generating; wait on this
    Follower(Waiter),
}

impl InflightRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(self: &Arc<Self>, fingerprint: &Fingerprint) -> Claim {
        let mut leaders = self.leaders.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sender) = leaders.get(fingerprint) {
            return Claim::Follower(Waiter {
                receiver: sender.subscribe(),
            });
        }
        let (sender, _) = watch::channel(());
        leaders.insert(fingerprint.clone(), sender);
        Claim::Leader(LeaderGuard {
            registry: Arc::clone(self),
            fingerprint: fingerprint.clone(),
        })
    }

    /// Number of fingerprints currently being generated
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Leadership of one fingerprint, held for the duration of a generation
#[derive(Debug)]
pub struct LeaderGuard {
    registry: Arc<InflightRegistry>,
    fingerprint: Fingerprint,
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        // Dropping the sender closes the channel, which wakes every waiter.
        self.registry
            .leaders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.fingerprint);
    }
}

#[derive(Debug)]
pub struct Waiter {
    receiver: watch::Receiver<()>,
}

impl Waiter {
    /// Resolve once the leader has finished, however it finished.
    pub async fn finished(mut self) {
        while self.receiver.changed().await.is_ok() {}
    }
}
