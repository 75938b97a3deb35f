mod error;
mod gauges;
mod map;
mod models;
mod players;
pub mod registry;
mod retirement;

pub use error::{MetricsError, Result};
pub use gauges::PlayerCountGauges;
pub use map::MapSeries;
pub use models::{Player, PlayerCount, PlayerId, ReconcileReport, Status, SteamId};
pub use players::{PlayerChanges, PlayerSeries};
pub use registry::{MetricRegistry, PrometheusRegistry, SeriesOpts};
pub use retirement::{Retired, RetirementQueue};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tracing::{debug, info, warn};

/// How long a departed player's series stays exposed before it is unregistered.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(3 * 60);

struct State<R: MetricRegistry> {
  gauges: Option<PlayerCountGauges<R::Gauge>>,
  map: MapSeries<R::Counter>,
  players: PlayerSeries<R::Counter>,
  retirement: RetirementQueue<R::Counter>,
  sweeper: Option<JoinHandle<()>>,
}

/// Keeps the registered series in step with the game server.
///
/// Two paths touch the series: [`on_snapshot`](Self::on_snapshot), called by
/// the poll driver once per poll, and the background sweep that unregisters
/// departed players every `sweep_interval`. Both run under one lock, so a
/// handle is never being created or retired while the sweep unregisters it.
pub struct MetricLifecycle<R: MetricRegistry> {
  registry: Arc<R>,
  server: String,
  sweep_interval: Duration,
  state: Mutex<State<R>>,
}

impl<R: MetricRegistry> MetricLifecycle<R> {
  /// Create a lifecycle publishing series labelled `server="<server>"`.
  pub fn new(registry: Arc<R>, server: impl Into<String>) -> Self {
    Self {
      registry,
      server: server.into(),
      sweep_interval: DEFAULT_SWEEP_INTERVAL,
      state: Mutex::new(State {
        gauges: None,
        map: MapSeries::new(),
        players: PlayerSeries::new(),
        retirement: RetirementQueue::new(),
        sweeper: None,
      }),
    }
  }

  /// Override the sweep period. A zero period keeps the default.
  pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
    if !sweep_interval.is_zero() {
      self.sweep_interval = sweep_interval;
    }
    self
  }

  pub fn registry(&self) -> &Arc<R> {
    &self.registry
  }

  pub fn server(&self) -> &str {
    &self.server
  }

  pub fn sweep_interval(&self) -> Duration {
    self.sweep_interval
  }

  fn lock(&self) -> MutexGuard<'_, State<R>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Apply one snapshot: player count gauges, then the map series, then the
  /// player set.
  ///
  /// The first snapshot registers the gauges and starts the sweeper (when
  /// called inside a Tokio runtime). Any error is a registration failure and
  /// should be treated as fatal by the caller.
  pub fn on_snapshot(self: &Arc<Self>, status: &Status) -> Result<ReconcileReport> {
    let registry = &*self.registry;
    let mut state = self.lock();

    if state.gauges.is_none() {
      state.gauges = Some(PlayerCountGauges::register(registry, &self.server)?);
      info!(server = %self.server, "metrics initialized");
    }
    if state.sweeper.is_none() {
      state.sweeper = self.spawn_sweeper();
    }
    if let Some(gauges) = &state.gauges {
      gauges.set(registry, status.player_count);
    }

    let map_changed = state.map.update(registry, &self.server, &status.map)?;

    let State {
      players,
      retirement,
      ..
    } = &mut *state;
    let changes = players.reconcile(registry, &self.server, &status.players, retirement)?;
    let report = ReconcileReport {
      map_changed,
      added: changes.added,
      retired: changes.retired.len(),
    };
    retirement.enqueue(changes.retired);

    debug!(
      map = %status.map,
      map_changed = report.map_changed,
      added = report.added,
      retired = report.retired,
      active = players.len(),
      pending = retirement.len(),
      "snapshot applied"
    );
    Ok(report)
  }

  /// Unregister every series waiting in the retirement queue.
  /// Returns how many were unregistered.
  pub fn sweep(&self) -> usize {
    let mut state = self.lock();
    let drained = state.retirement.drain(&*self.registry);
    if drained > 0 {
      info!(drained, "sweep: unregistered departed player metrics");
    } else {
      debug!("sweep: nothing to unregister");
    }
    drained
  }

  fn spawn_sweeper(self: &Arc<Self>) -> Option<JoinHandle<()>> {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
      warn!("no tokio runtime, retirement sweep not started");
      return None;
    };
    let lifecycle = Arc::downgrade(self);
    let period = self.sweep_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    debug!(?period, "starting retirement sweeper");
    Some(runtime.spawn(async move {
      loop {
        ticker.tick().await;
        let Some(lifecycle) = lifecycle.upgrade() else {
          break;
        };
        lifecycle.sweep();
      }
    }))
  }

  // ========================================================================
  // Introspection
  // ========================================================================

  pub fn is_initialized(&self) -> bool {
    self.lock().gauges.is_some()
  }

  /// PlayerIDs with an active series, sorted.
  pub fn active_players(&self) -> Vec<PlayerId> {
    self.lock().players.player_ids()
  }

  pub fn is_pending_retirement(&self, player_id: PlayerId) -> bool {
    self.lock().retirement.contains(player_id)
  }

  pub fn pending_retirement(&self) -> usize {
    self.lock().retirement.len()
  }

  pub fn current_map(&self) -> Option<String> {
    self.lock().map.current_map().map(str::to_string)
  }
}

impl<R: MetricRegistry> Drop for MetricLifecycle<R> {
  fn drop(&mut self) {
    if let Some(sweeper) = self.lock().sweeper.take() {
      sweeper.abort();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::recording::{Call, RecordingRegistry};
  use std::collections::HashMap;

  fn status(map: &str, players: &[(PlayerId, &str)]) -> Status {
    let players: HashMap<PlayerId, Player> = players
      .iter()
      .map(|&(id, steam)| {
        (
          id,
          Player {
            name: format!("player{id}"),
            steam_id: SteamId::from(steam).unwrap(),
          },
        )
      })
      .collect();
    Status {
      map: map.to_string(),
      player_count: PlayerCount {
        current: players.len() as u32,
        max: 24,
      },
      players,
    }
  }

  fn lifecycle() -> Arc<MetricLifecycle<RecordingRegistry>> {
    Arc::new(MetricLifecycle::new(
      Arc::new(RecordingRegistry::new()),
      "srv",
    ))
  }

  fn player_series(steam: &str) -> String {
    format!(r#"gameserver_players_current{{server="srv",steamid="{steam}"}}"#)
  }

  #[test]
  fn test_office_scenario() {
    let lc = lifecycle();
    let registry = lc.registry().clone();

    let report = lc
      .on_snapshot(&status("cs_office", &[(1, "A"), (2, "B")]))
      .unwrap();
    assert_eq!(
      report,
      ReconcileReport {
        map_changed: true,
        added: 2,
        retired: 0
      }
    );
    let text = registry.render();
    assert!(text.contains(r#"map="cs_office""#));
    assert!(text.contains(r#"steamid="A""#));
    assert!(text.contains(r#"steamid="B""#));

    // B leaves: moved to the queue but still exposed.
    let report = lc.on_snapshot(&status("cs_office", &[(1, "A")])).unwrap();
    assert_eq!(report.retired, 1);
    assert!(!report.map_changed);
    assert_eq!(lc.active_players(), vec![1]);
    assert!(lc.is_pending_retirement(2));
    assert!(registry.render().contains(r#"steamid="B""#));

    // After the sweep only the map series and A remain.
    assert_eq!(lc.sweep(), 1);
    assert_eq!(lc.pending_retirement(), 0);
    let text = registry.render();
    assert!(text.contains(r#"map="cs_office""#));
    assert!(text.contains(r#"steamid="A""#));
    assert!(!text.contains(r#"steamid="B""#));
  }

  #[test]
  fn test_first_snapshot_initializes_gauges_once() {
    let lc = lifecycle();
    assert!(!lc.is_initialized());
    lc.on_snapshot(&status("de_dust2", &[])).unwrap();
    assert!(lc.is_initialized());
    lc.on_snapshot(&status("de_dust2", &[])).unwrap();

    let registers = lc
      .registry()
      .calls()
      .into_iter()
      .filter(|c| matches!(c, Call::Register(s) if s.contains("player_count")))
      .count();
    assert_eq!(registers, 2);

    let text = lc.registry().render();
    assert!(text.contains(r#"gameserver_player_count_max{server="srv"} 24"#));
    assert!(text.contains(r#"gameserver_player_count_current{server="srv"} 0"#));
  }

  #[test]
  fn test_same_snapshot_twice_is_noop() {
    let lc = lifecycle();
    let snapshot = status("de_dust2", &[(1, "A"), (2, "B"), (3, "C")]);
    lc.on_snapshot(&snapshot).unwrap();
    lc.registry().take_calls();

    let report = lc.on_snapshot(&snapshot).unwrap();
    assert!(report.is_noop());
    // Only the player count gauges are refreshed.
    assert!(lc.registry().take_series_calls().is_empty());
  }

  #[test]
  fn test_map_change_on_snapshot() {
    let lc = lifecycle();
    lc.on_snapshot(&status("de_dust2", &[])).unwrap();
    lc.registry().take_calls();

    let report = lc.on_snapshot(&status("de_nuke", &[])).unwrap();
    assert!(report.map_changed);
    let calls = lc.registry().take_series_calls();
    let unregisters: Vec<_> = calls
      .iter()
      .filter(|c| matches!(c, Call::Unregister(_)))
      .collect();
    let registers: Vec<_> = calls
      .iter()
      .filter(|c| matches!(c, Call::Register(_)))
      .collect();
    assert_eq!(unregisters.len(), 1);
    assert_eq!(registers.len(), 1);
    assert!(matches!(unregisters[0], Call::Unregister(s) if s.contains("de_dust2")));
    assert!(matches!(registers[0], Call::Register(s) if s.contains("de_nuke")));
    assert!(calls.contains(&Call::Increment(
      r#"gameserver_map_current{server="srv",map="de_nuke"}"#.to_string()
    )));
    assert_eq!(lc.current_map().as_deref(), Some("de_nuke"));
  }

  #[test]
  fn test_departed_players_unregistered_only_by_sweep() {
    let lc = lifecycle();
    lc.on_snapshot(&status("de_dust2", &[(1, "P1"), (2, "P2"), (3, "P3")]))
      .unwrap();
    lc.on_snapshot(&status("de_dust2", &[(3, "P3")])).unwrap();
    // More snapshots do not unregister anything either.
    lc.on_snapshot(&status("de_dust2", &[(3, "P3")])).unwrap();

    let unregistered = lc
      .registry()
      .take_calls()
      .into_iter()
      .filter(|c| matches!(c, Call::Unregister(_)))
      .count();
    assert_eq!(unregistered, 0);
    assert_eq!(lc.pending_retirement(), 2);

    assert_eq!(lc.sweep(), 2);
    let mut unregistered: Vec<_> = lc
      .registry()
      .take_calls()
      .into_iter()
      .filter(|c| matches!(c, Call::Unregister(_)))
      .collect();
    unregistered.sort_by_key(|c| format!("{c:?}"));
    assert_eq!(
      unregistered,
      vec![
        Call::Unregister(player_series("P1")),
        Call::Unregister(player_series("P2")),
      ]
    );
    assert_eq!(lc.pending_retirement(), 0);
    assert_eq!(lc.sweep(), 0);
  }

  #[test]
  fn test_reconnect_before_sweep_gets_new_counter() {
    let lc = lifecycle();
    lc.on_snapshot(&status("de_dust2", &[(1, "A")])).unwrap();
    lc.on_snapshot(&status("de_dust2", &[])).unwrap();
    assert_eq!(lc.pending_retirement(), 1);

    // Same userid, same identity, back before the sweep.
    let report = lc.on_snapshot(&status("de_dust2", &[(1, "A")])).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(lc.pending_retirement(), 0);
    assert_eq!(lc.active_players(), vec![1]);

    // The sweep must not take the new series down.
    assert_eq!(lc.sweep(), 0);
    assert!(
      lc.registry()
        .render()
        .contains(&format!("{} 1", player_series("A")))
    );
  }

  #[test]
  fn test_rejoin_under_new_userid_between_polls() {
    let lc = lifecycle();
    lc.on_snapshot(&status("de_dust2", &[(1, "STEAM_0:1:42")]))
      .unwrap();

    let report = lc
      .on_snapshot(&status("de_dust2", &[(2, "STEAM_0:1:42")]))
      .unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.retired, 0);
    assert_eq!(lc.active_players(), vec![2]);
    assert_eq!(lc.pending_retirement(), 0);

    // Nothing left for the sweep to take down.
    assert_eq!(lc.sweep(), 0);
    let text = lc.registry().render();
    assert!(text.contains(&format!("{} 1", player_series("STEAM_0:1:42"))));
  }

  #[test]
  fn test_rejoin_under_new_userid_on_prometheus_registry() {
    let lc = Arc::new(MetricLifecycle::new(
      Arc::new(PrometheusRegistry::new()),
      "srv",
    ));
    lc.on_snapshot(&status("de_dust2", &[(1, "STEAM_0:1:42")]))
      .unwrap();
    assert!(
      lc.on_snapshot(&status("de_dust2", &[(2, "STEAM_0:1:42")]))
        .is_ok()
    );
    assert_eq!(lc.active_players(), vec![2]);
    assert!(lc.registry().render().unwrap().contains(r#"steamid="STEAM_0:1:42""#));
  }

  #[test]
  fn test_zero_sweep_interval_keeps_default() {
    let lc = MetricLifecycle::new(Arc::new(RecordingRegistry::new()), "srv")
      .with_sweep_interval(Duration::ZERO);
    assert_eq!(lc.sweep_interval(), DEFAULT_SWEEP_INTERVAL);
  }

  #[tokio::test]
  async fn test_zero_sweep_interval_starts_sweeper() {
    let lc = Arc::new(
      MetricLifecycle::new(Arc::new(RecordingRegistry::new()), "srv")
        .with_sweep_interval(Duration::ZERO),
    );
    lc.on_snapshot(&status("de_dust2", &[(1, "A")])).unwrap();
    assert!(lc.lock().sweeper.is_some());
  }

  #[test]
  fn test_duplicate_identity_is_fatal() {
    let lc = lifecycle();
    let err = lc
      .on_snapshot(&status("de_dust2", &[(1, "BOT"), (2, "BOT")]))
      .unwrap_err();
    assert!(matches!(err, MetricsError::Register { .. }));
  }

  #[test]
  fn test_sweeper_not_started_without_runtime() {
    let lc = lifecycle();
    lc.on_snapshot(&status("de_dust2", &[])).unwrap();
    assert!(lc.lock().sweeper.is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_sweeper_drains_on_interval() {
    let lc = lifecycle();
    lc.on_snapshot(&status("cs_office", &[(1, "A"), (2, "B")]))
      .unwrap();
    lc.on_snapshot(&status("cs_office", &[])).unwrap();
    assert_eq!(lc.pending_retirement(), 2);

    tokio::time::sleep(DEFAULT_SWEEP_INTERVAL - Duration::from_secs(1)).await;
    assert_eq!(lc.pending_retirement(), 2);
    assert!(lc.registry().render().contains(r#"steamid="A""#));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(lc.pending_retirement(), 0);
    let text = lc.registry().render();
    assert!(!text.contains(r#"steamid="A""#));
    assert!(!text.contains(r#"steamid="B""#));
  }

  #[tokio::test(start_paused = true)]
  async fn test_custom_sweep_interval() {
    let lc = Arc::new(
      MetricLifecycle::new(Arc::new(RecordingRegistry::new()), "srv")
        .with_sweep_interval(Duration::from_secs(10)),
    );
    lc.on_snapshot(&status("cs_office", &[(1, "A")])).unwrap();
    lc.on_snapshot(&status("cs_office", &[])).unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(lc.pending_retirement(), 0);
  }
}
