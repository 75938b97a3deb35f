//! Status sources and the poll driver that feeds them into the metrics.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use srcds_metrics::{MetricLifecycle, MetricRegistry, MetricsError, Status};
use tokio::sync::RwLock;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

/// Something that can report the game server's current status.
pub trait StatusSource: Send + Sync + 'static {
    /// The current status, or `None` if none is known yet.
    fn get_status(&self) -> impl Future<Output = Option<Status>> + Send;
}

/// The most recent status pushed to `POST /status`.
#[derive(Debug, Default)]
pub struct LatestStatus {
    latest: RwLock<Option<Status>>,
}

impl LatestStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store(&self, status: Status) {
        *self.latest.write().await = Some(status);
    }

    pub async fn has_status(&self) -> bool {
        self.latest.read().await.is_some()
    }
}

impl StatusSource for LatestStatus {
    async fn get_status(&self) -> Option<Status> {
        self.latest.read().await.clone()
    }
}

/// Apply the source's status to `lifecycle` every `poll_interval`.
///
/// Only returns on a registration failure, which callers treat as fatal.
pub async fn run_poller<S, R>(
    source: Arc<S>,
    lifecycle: Arc<MetricLifecycle<R>>,
    poll_interval: Duration,
) -> Result<(), MetricsError>
where
    S: StatusSource,
    R: MetricRegistry,
{
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(?poll_interval, "poller started");

    loop {
        ticker.tick().await;
        let Some(status) = source.get_status().await else {
            debug!("poller: no status received yet");
            continue;
        };

        let report = lifecycle.on_snapshot(&status)?;
        if report.is_noop() {
            debug!(map = %status.map, players = status.players.len(), "poller: nothing changed");
        } else {
            info!(
                map = %status.map,
                players = status.players.len(),
                map_changed = report.map_changed,
                added = report.added,
                retired = report.retired,
                "poller: snapshot applied"
            );
        }
    }
}
