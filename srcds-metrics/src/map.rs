use tracing::debug;

use crate::error::Result;
use crate::registry::{MetricRegistry, SeriesOpts};

struct Current<C> {
    map: String,
    counter: C,
}

/// The single `gameserver_map_current` series.
///
/// Labels are immutable once registered, so a map change retires the old
/// series and registers a new one.
pub struct MapSeries<C> {
    current: Option<Current<C>>,
}

impl<C> MapSeries<C> {
    pub fn new() -> Self {
        Self { current: None }
    }

    pub fn current_map(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.map.as_str())
    }

    /// Point the series at `map`. Returns true if the series was replaced.
    pub fn update<R>(&mut self, registry: &R, server: &str, map: &str) -> Result<bool>
    where
        R: MetricRegistry<Counter = C>,
    {
        if self.current_map() == Some(map) {
            debug!(map, "map: no map name update required");
            return Ok(false);
        }
        debug!(map, previous = ?self.current_map(), "map: map name update required");

        if let Some(old) = self.current.take() {
            registry.unregister_counter(&old.counter);
        }

        let counter = registry.create_counter(SeriesOpts::map_current(server, map))?;
        registry.increment(&counter);
        registry.register_counter(&counter)?;
        self.current = Some(Current {
            map: map.to_string(),
            counter,
        });
        Ok(true)
    }
}

impl<C> Default for MapSeries<C> {
    fn default() -> Self {
        Self::new()
    }
}
