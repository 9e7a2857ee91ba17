//! Admission control in front of the upstream backend
//!
//! Two independent throttles: a semaphore bounding concurrent calls to `C`,
//! and an optional rolling window admitting at most `R` calls per `W`. Both
//! queue waiters in arrival order. Callers over either limit wait; nothing
//! here fails except acquiring from a closed limiter.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use storyflow_config::GenerationProfile;
use storyflow_utils::error::LlmError;

/// Bounded-admission gate shared by every orchestrator call for a profile.
///
/// Cloning is cheap and clones share the same slots and window.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    window: Option<Arc<RollingWindow>>,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `capacity` slots (at least one) and an optional
    /// `(max_calls, window)` rate ceiling.
    #[must_use]
    pub fn new(capacity: usize, rate: Option<(u32, Duration)>) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            window: rate.map(|(max_calls, window)| Arc::new(RollingWindow::new(max_calls, window))),
        }
    }

    #[must_use]
    pub fn for_profile(profile: &GenerationProfile) -> Self {
        Self::new(
            profile.concurrency,
            profile.rate_limit.map(|r| (r.max_calls, r.window())),
        )
    }

    /// Wait for a free slot, then for room in the rolling window.
    ///
    /// Dropping the returned future while it waits gives back anything it
    /// had already taken.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Cancelled` if the limiter has been closed.
    pub async fn acquire(&self) -> Result<AdmissionTicket, LlmError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LlmError::Cancelled)?;

        if let Some(window) = &self.window {
            window.admit().await;
        }

        trace!(outstanding = self.outstanding(), capacity = self.capacity, "Admission granted");
        Ok(AdmissionTicket {
            permit: Some(permit),
        })
    }

    /// [`acquire`](Self::acquire), abandoned as soon as `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Cancelled` on cancellation or if the limiter is closed.
    pub async fn acquire_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<AdmissionTicket, LlmError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("Admission wait cancelled");
                Err(LlmError::Cancelled)
            }
            ticket = self.acquire() => ticket,
        }
    }

    /// Give a ticket's slot back. Releasing twice is a no-op.
    pub fn release(&self, ticket: &mut AdmissionTicket) {
        ticket.release();
    }

    /// Stop admitting. Pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Tickets currently held
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One of at most `C` concurrent upstream calls.
///
/// The slot is returned on [`release`](Self::release) or on drop, whichever
/// happens first.
#[derive(Debug)]
#[must_use = "dropping a ticket releases its slot immediately"]
pub struct AdmissionTicket {
    permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionTicket {
    pub fn release(&mut self) {
        self.permit.take();
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.permit.is_none()
    }
}

/// Sliding log of recent admission times
#[derive(Debug)]
struct RollingWindow {
    max_calls: usize,
    window: Duration,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RollingWindow {
    fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: (max_calls as usize).max(1),
            window,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one admission, sleeping until the oldest one in the window ages out if full.
    ///
    /// The lock is held across the sleep so waiters are admitted in order.
    async fn admit(&self) {
        let mut admitted = self.admitted.lock().await;
        loop {
            let now = Instant::now();
            while admitted
                .front()
                .is_some_and(|&at| now.duration_since(at) >= self.window)
            {
                admitted.pop_front();
            }

            if admitted.len() < self.max_calls {
                admitted.push_back(now);
                return;
            }

            if let Some(&oldest) = admitted.front() {
                let resume = oldest + self.window;
                debug!(
                    delay_ms = resume.saturating_duration_since(now).as_millis() as u64,
                    max_calls = self.max_calls,
                    "Rolling window full, waiting"
                );
                tokio::time::sleep_until(resume).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let limiter = ConcurrencyLimiter::new(0, None);
        assert_eq!(limiter.capacity(), 1);
        let ticket = limiter.acquire().await.unwrap();
        assert_eq!(limiter.outstanding(), 1);
        drop(ticket);
        assert_eq!(limiter.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_profile_limits_are_applied() {
        let limiter = ConcurrencyLimiter::for_profile(&GenerationProfile::batch());
        assert_eq!(limiter.capacity(), 3);
        assert!(limiter.window.is_some());

        let limiter = ConcurrencyLimiter::for_profile(&GenerationProfile::streaming());
        assert_eq!(limiter.capacity(), 4);
        assert!(limiter.window.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_wait_returns_error() {
        let limiter = ConcurrencyLimiter::new(1, None);
        let _held = limiter.acquire().await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = limiter.acquire_cancellable(&cancel).await;
        assert!(matches!(result, Err(LlmError::Cancelled)));
        assert_eq!(limiter.outstanding(), 1);
    }
}
