use tracing::debug;

use crate::models::{PlayerId, SteamId};
use crate::registry::MetricRegistry;

/// A player series that left the active set but is still registered.
#[derive(Debug)]
pub struct Retired<C> {
    pub player_id: PlayerId,
    pub steam_id: SteamId,
    pub counter: C,
}

/// Series waiting for the next sweep to be unregistered.
///
/// Entries are kept in a `Vec` rather than keyed by [`PlayerId`]: a PlayerId
/// can be retired, reused and retired again before a sweep runs, and both
/// handles must still be unregistered.
#[derive(Debug)]
pub struct RetirementQueue<C> {
    pending: Vec<Retired<C>>,
}

impl<C> RetirementQueue<C> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    pub fn enqueue(&mut self, retired: impl IntoIterator<Item = Retired<C>>) {
        self.pending.extend(retired);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.pending.iter().any(|r| r.player_id == player_id)
    }

    /// Remove and return the pending entries carrying `steam_id`.
    pub fn take_identity(&mut self, steam_id: &SteamId) -> Vec<Retired<C>> {
        let (taken, kept) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|r| r.steam_id == *steam_id);
        self.pending = kept;
        taken
    }

    /// Unregister every queued series and empty the queue.
    /// Returns the number of series unregistered.
    pub fn drain<R>(&mut self, registry: &R) -> usize
    where
        R: MetricRegistry<Counter = C>,
    {
        let drained = self.pending.len();
        for retired in self.pending.drain(..) {
            registry.unregister_counter(&retired.counter);
            debug!(
                userid = retired.player_id,
                steamid = %retired.steam_id,
                "retirement: unregistered player metric"
            );
        }
        drained
    }
}

impl<C> Default for RetirementQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}
