//! Interaction Correlator: pending permission/question exchanges.
//!
//! Each registered interaction gets one timer on tokio's monotonic clock
//! (a [`DelayQueue`] entry). Whichever of host resolution, timeout, or
//! invalidation happens first is recorded; every later attempt is a no-op.

use std::collections::{HashMap, VecDeque};
use std::future::poll_fn;
use std::task::Poll;
use std::time::Duration;

use serde::Serialize;
use tether_core::CorrelationId;
use tokio::time::Instant;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, info};

/// What the backend is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// Tool permission.
    Permission,
    /// Free-form or multiple-choice question.
    Question,
}

/// How an interaction ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Still waiting.
    Unresolved,
    /// Granted or answered.
    Approved,
    /// Refused.
    Denied,
    /// The local timer fired first.
    TimedOut,
    /// Dropped by a reconnect, replacement, or disconnect.
    Invalidated,
}

/// A pending (or just-resolved) interaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingInteraction {
    /// Correlation id.
    pub id: CorrelationId,
    /// Kind.
    pub kind: InteractionKind,
    /// Epoch it was registered under.
    pub epoch: u64,
    /// Registration time (monotonic).
    pub created_at: Instant,
    /// Timeout deadline (monotonic).
    pub deadline: Instant,
    /// Current resolution.
    pub resolution: Resolution,
}

/// Handle returned by [`Correlator::register`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InteractionHandle {
    /// Correlation id.
    pub id: CorrelationId,
    /// Kind.
    pub kind: InteractionKind,
    /// Timeout deadline.
    pub deadline: Instant,
}

struct Entry {
    interaction: PendingInteraction,
    key: delay_queue::Key,
}

/// Tracks interactions by correlation id.
pub struct Correlator {
    pending: HashMap<CorrelationId, Entry>,
    timers: DelayQueue<CorrelationId>,
    resolved: HashMap<CorrelationId, Resolution>,
    resolved_order: VecDeque<CorrelationId>,
    history_limit: usize,
}

impl Correlator {
    /// Correlator remembering up to `history_limit` resolved ids.
    pub fn new(history_limit: usize) -> Self {
        Self {
            pending: HashMap::new(),
            timers: DelayQueue::new(),
            resolved: HashMap::new(),
            resolved_order: VecDeque::new(),
            history_limit,
        }
    }

    /// Start tracking `id`. Returns `None` if the id is already known.
    pub fn register(
        &mut self,
        id: CorrelationId,
        kind: InteractionKind,
        timeout: Duration,
        epoch: u64,
    ) -> Option<InteractionHandle> {
        if self.pending.contains_key(&id) || self.resolved.contains_key(&id) {
            debug!(request_id = %id, "interaction already known");
            return None;
        }
        let created_at = Instant::now();
        let deadline = created_at + timeout;
        let key = self.timers.insert_at(id.clone(), deadline);
        let interaction = PendingInteraction {
            id: id.clone(),
            kind,
            epoch,
            created_at,
            deadline,
            resolution: Resolution::Unresolved,
        };
        let _ = self.pending.insert(id.clone(), Entry { interaction, key });
        Some(InteractionHandle { id, kind, deadline })
    }

    /// Resolve `id`. Returns the resolved interaction, or `None` when the id
    /// is unknown or already resolved.
    pub fn resolve(&mut self, id: &CorrelationId, resolution: Resolution) -> Option<PendingInteraction> {
        let entry = self.pending.remove(id)?;
        let _ = self.timers.remove(&entry.key);
        Some(self.finish(entry.interaction, resolution))
    }

    /// Invalidate everything registered before `epoch`.
    pub fn invalidate_before(&mut self, epoch: u64) -> Vec<PendingInteraction> {
        let stale: Vec<CorrelationId> = self
            .pending
            .values()
            .filter(|e| e.interaction.epoch < epoch)
            .map(|e| e.interaction.id.clone())
            .collect();
        stale
            .iter()
            .filter_map(|id| self.resolve(id, Resolution::Invalidated))
            .collect()
    }

    /// Invalidate every pending interaction.
    pub fn invalidate_all(&mut self) -> Vec<PendingInteraction> {
        self.invalidate_before(u64::MAX)
    }

    /// Wait for the next timeout and record it. Pending forever when empty.
    pub async fn next_timeout(&mut self) -> PendingInteraction {
        loop {
            let id = poll_fn(|cx| match self.timers.poll_expired(cx) {
                Poll::Ready(Some(expired)) => Poll::Ready(expired.into_inner()),
                Poll::Ready(None) | Poll::Pending => Poll::Pending,
            })
            .await;
            if let Some(entry) = self.pending.remove(&id) {
                info!(request_id = %id, kind = ?entry.interaction.kind, "interaction timed out");
                return self.finish(entry.interaction, Resolution::TimedOut);
            }
        }
    }

    /// Resolution recorded for `id`, if known.
    pub fn resolution(&self, id: &CorrelationId) -> Option<Resolution> {
        if self.pending.contains_key(id) {
            return Some(Resolution::Unresolved);
        }
        self.resolved.get(id).copied()
    }

    /// Unresolved interactions, oldest first.
    pub fn pending(&self) -> Vec<PendingInteraction> {
        let mut list: Vec<_> = self.pending.values().map(|e| e.interaction.clone()).collect();
        list.sort_by_key(|i| i.created_at);
        list
    }

    /// Epoch an unresolved interaction was registered under.
    pub fn epoch_of(&self, id: &CorrelationId) -> Option<u64> {
        self.pending.get(id).map(|e| e.interaction.epoch)
    }

    fn finish(&mut self, mut interaction: PendingInteraction, resolution: Resolution) -> PendingInteraction {
        interaction.resolution = resolution;
        let _ = self.resolved.insert(interaction.id.clone(), resolution);
        self.resolved_order.push_back(interaction.id.clone());
        while self.resolved_order.len() > self.history_limit {
            if let Some(old) = self.resolved_order.pop_front() {
                let _ = self.resolved.remove(&old);
            }
        }
        interaction
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn id(s: &str) -> CorrelationId {
        CorrelationId::from(s)
    }

    #[tokio::test(start_paused = true)]
    async fn first_resolution_wins() {
        let mut c = Correlator::new(16);
        let _ = c.register(id("req-1"), InteractionKind::Permission, Duration::from_secs(5), 1);
        let first = c.resolve(&id("req-1"), Resolution::Approved).unwrap();
        assert_eq!(first.resolution, Resolution::Approved);
        assert!(c.resolve(&id("req-1"), Resolution::Denied).is_none());
        assert_eq!(c.resolution(&id("req-1")), Some(Resolution::Approved));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_id_is_noop() {
        let mut c = Correlator::new(16);
        assert!(c.resolve(&id("ghost"), Resolution::Approved).is_none());
        assert_eq!(c.resolution(&id("ghost")), None);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_and_late_resolve_is_noop() {
        let mut c = Correlator::new(16);
        let handle = c
            .register(id("q1"), InteractionKind::Question, Duration::from_secs(2), 1)
            .unwrap();
        assert_eq!(handle.kind, InteractionKind::Question);

        let timed_out = c.next_timeout().await;
        assert_eq!(timed_out.id, id("q1"));
        assert_eq!(timed_out.resolution, Resolution::TimedOut);
        assert!(Instant::now() >= handle.deadline);

        assert!(c.resolve(&id("q1"), Resolution::Approved).is_none());
        assert_eq!(c.resolution(&id("q1")), Some(Resolution::TimedOut));
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_interaction_never_times_out() {
        let mut c = Correlator::new(16);
        let _ = c.register(id("p1"), InteractionKind::Permission, Duration::from_secs(1), 1);
        let _ = c.register(id("p2"), InteractionKind::Permission, Duration::from_secs(3), 1);
        let _ = c.resolve(&id("p1"), Resolution::Denied);

        let next = c.next_timeout().await;
        assert_eq!(next.id, id("p2"));
        assert_eq!(c.resolution(&id("p1")), Some(Resolution::Denied));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_correlator_never_fires() {
        let mut c = Correlator::new(16);
        let waited = tokio::time::timeout(Duration::from_secs(3600), c.next_timeout()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_before_epoch() {
        let mut c = Correlator::new(16);
        let _ = c.register(id("old"), InteractionKind::Permission, Duration::from_secs(60), 1);
        let _ = c.register(id("new"), InteractionKind::Permission, Duration::from_secs(60), 2);

        let dropped = c.invalidate_before(2);
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].id, id("old"));
        assert_eq!(dropped[0].resolution, Resolution::Invalidated);
        assert_eq!(c.epoch_of(&id("new")), Some(2));
        assert_eq!(c.epoch_of(&id("old")), None);
        assert!(c.resolve(&id("old"), Resolution::Approved).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_all_clears_timers() {
        let mut c = Correlator::new(16);
        let _ = c.register(id("a"), InteractionKind::Permission, Duration::from_secs(1), 1);
        let _ = c.register(id("b"), InteractionKind::Question, Duration::from_secs(1), 1);
        assert_eq!(c.invalidate_all().len(), 2);
        assert!(c.pending().is_empty());
        let waited = tokio::time::timeout(Duration::from_secs(10), c.next_timeout()).await;
        assert!(waited.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_is_refused() {
        let mut c = Correlator::new(16);
        assert!(c.register(id("r"), InteractionKind::Permission, Duration::from_secs(1), 1).is_some());
        assert!(c.register(id("r"), InteractionKind::Permission, Duration::from_secs(1), 1).is_none());
        let _ = c.resolve(&id("r"), Resolution::Approved);
        assert!(c.register(id("r"), InteractionKind::Permission, Duration::from_secs(1), 2).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn resolved_history_is_bounded() {
        let mut c = Correlator::new(2);
        for name in ["a", "b", "c"] {
            let _ = c.register(id(name), InteractionKind::Permission, Duration::from_secs(1), 1);
            let _ = c.resolve(&id(name), Resolution::Approved);
        }
        assert_eq!(c.resolution(&id("a")), None);
        assert_matches!(c.resolution(&id("c")), Some(Resolution::Approved));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_is_oldest_first() {
        let mut c = Correlator::new(16);
        let _ = c.register(id("first"), InteractionKind::Permission, Duration::from_secs(9), 1);
        tokio::time::advance(Duration::from_millis(10)).await;
        let _ = c.register(id("second"), InteractionKind::Question, Duration::from_secs(9), 1);
        let ids: Vec<_> = c.pending().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![id("first"), id("second")]);
    }
}
