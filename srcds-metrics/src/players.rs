use std::collections::HashMap;

use tracing::debug;

use crate::error::Result;
use crate::models::{Player, PlayerId, SteamId};
use crate::registry::{MetricRegistry, SeriesOpts};
use crate::retirement::{Retired, RetirementQueue};

struct ActiveSeries<C> {
    steam_id: SteamId,
    counter: C,
}

/// Presence counters for the players seen in the latest snapshot.
pub struct PlayerSeries<C> {
    active: HashMap<PlayerId, ActiveSeries<C>>,
}

/// Outcome of [`PlayerSeries::reconcile`].
pub struct PlayerChanges<C> {
    pub added: usize,
    pub retired: Vec<Retired<C>>,
}

impl<C> PlayerSeries<C> {
    pub fn new() -> Self {
        Self {
            active: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, player_id: PlayerId) -> bool {
        self.active.contains_key(&player_id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        let mut ids: Vec<PlayerId> = self.active.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Bring the active set in line with `players`.
    ///
    /// Players no longer present are removed from the active set first and
    /// handed back for the retirement queue; nothing is unregistered for them
    /// here. Newly seen players then get a counter set to 1 and registered.
    ///
    /// A new player whose identity still has a registered series, either
    /// waiting in `pending` or departed in this same call, has that series
    /// unregistered right before the new counter takes over its label set.
    pub fn reconcile<R>(
        &mut self,
        registry: &R,
        server: &str,
        players: &HashMap<PlayerId, Player>,
        pending: &mut RetirementQueue<C>,
    ) -> Result<PlayerChanges<C>>
    where
        R: MetricRegistry<Counter = C>,
    {
        let gone: Vec<PlayerId> = self
            .active
            .keys()
            .filter(|id| !players.contains_key(id))
            .copied()
            .collect();
        let mut retired = Vec::with_capacity(gone.len());
        for userid in gone {
            if let Some(series) = self.active.remove(&userid) {
                debug!(userid, steamid = %series.steam_id, "players: removed user metric");
                retired.push(Retired {
                    player_id: userid,
                    steam_id: series.steam_id,
                    counter: series.counter,
                });
            }
        }

        let mut added = 0;
        for (&userid, player) in players {
            if self.active.contains_key(&userid) {
                debug!(userid, steamid = %player.steam_id, "players: user already has metric");
                continue;
            }

            let (stale, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut retired)
                .into_iter()
                .partition(|r| r.steam_id == player.steam_id);
            retired = kept;
            for stale in pending.take_identity(&player.steam_id).into_iter().chain(stale) {
                registry.unregister_counter(&stale.counter);
                debug!(
                    userid,
                    previous_userid = stale.player_id,
                    steamid = %player.steam_id,
                    "players: reconnected before sweep, replaced previous metric"
                );
            }

            let counter = registry.create_counter(SeriesOpts::player_current(
                server,
                player.steam_id.as_str(),
            ))?;
            registry.increment(&counter);
            registry.register_counter(&counter)?;
            self.active.insert(
                userid,
                ActiveSeries {
                    steam_id: player.steam_id,
                    counter,
                },
            );
            added += 1;
            debug!(userid, steamid = %player.steam_id, name = %player.name, "players: added user metric");
        }

        Ok(PlayerChanges { added, retired })
    }
}

impl<C> Default for PlayerSeries<C> {
    fn default() -> Self {
        Self::new()
    }
}
