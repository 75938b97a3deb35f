use crate::error::Result;
use crate::models::PlayerCount;
use crate::registry::{MetricRegistry, SeriesOpts};

/// `gameserver_player_count_{current,max}`, registered once and set on every snapshot.
pub struct PlayerCountGauges<G> {
    current: G,
    max: G,
}

impl<G> PlayerCountGauges<G> {
    pub fn register<R>(registry: &R, server: &str) -> Result<Self>
    where
        R: MetricRegistry<Gauge = G>,
    {
        let current = registry.create_gauge(SeriesOpts::player_count_current(server))?;
        let max = registry.create_gauge(SeriesOpts::player_count_max(server))?;
        registry.register_gauge(&current)?;
        registry.register_gauge(&max)?;
        Ok(Self { current, max })
    }

    pub fn set<R>(&self, registry: &R, count: PlayerCount)
    where
        R: MetricRegistry<Gauge = G>,
    {
        registry.set_value(&self.current, f64::from(count.current));
        registry.set_value(&self.max, f64::from(count.max));
    }
}
