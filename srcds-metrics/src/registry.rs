//! Metric registry adapter.
//!
//! The lifecycle code never talks to `prometheus` directly; it goes through
//! [`MetricRegistry`] so the series bookkeeping can be exercised against a
//! recording registry in tests.

use std::collections::HashMap;
use std::fmt;

use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};
use tracing::debug;

use crate::error::{MetricsError, Result};

pub const NAMESPACE: &str = "gameserver";

/// Identity of a series: fully-qualified name parts plus its constant labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesOpts {
    pub namespace: &'static str,
    pub subsystem: &'static str,
    pub name: &'static str,
    pub help: &'static str,
    pub labels: Vec<(&'static str, String)>,
}

impl SeriesOpts {
    /// `gameserver_map_current{server, map}`
    pub fn map_current(server: &str, map: &str) -> Self {
        Self {
            namespace: NAMESPACE,
            subsystem: "map",
            name: "current",
            help: "Current map played.",
            labels: vec![("server", server.to_string()), ("map", map.to_string())],
        }
    }

    /// `gameserver_players_current{server, steamid}`
    pub fn player_current(server: &str, steam_id: &str) -> Self {
        Self {
            namespace: NAMESPACE,
            subsystem: "players",
            name: "current",
            help: "Current users by Steam ID playing on the server.",
            labels: vec![
                ("server", server.to_string()),
                ("steamid", steam_id.to_string()),
            ],
        }
    }

    /// `gameserver_player_count_current{server}`
    pub fn player_count_current(server: &str) -> Self {
        Self {
            namespace: NAMESPACE,
            subsystem: "player_count",
            name: "current",
            help: "Current player count on the server.",
            labels: vec![("server", server.to_string())],
        }
    }

    /// `gameserver_player_count_max{server}`
    pub fn player_count_max(server: &str) -> Self {
        Self {
            namespace: NAMESPACE,
            subsystem: "player_count",
            name: "max",
            help: "Maximum player count on the server.",
            labels: vec![("server", server.to_string())],
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn to_opts(&self) -> Opts {
        let labels: HashMap<String, String> = self
            .labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Opts::new(self.name, self.help)
            .namespace(self.namespace)
            .subsystem(self.subsystem)
            .const_labels(labels)
    }
}

impl fmt::Display for SeriesOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}{{", self.namespace, self.subsystem, self.name)?;
        for (i, (k, v)) in self.labels.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}=\"{v}\"")?;
        }
        f.write_str("}")
    }
}

/// Create, mutate and unregister counter/gauge series.
///
/// Handles are owned by the caller; a handle is registered at most once and
/// unregistered at most once. Unregistering a handle the registry does not
/// know about is a no-op.
pub trait MetricRegistry: Send + Sync + 'static {
    type Counter: Send + 'static;
    type Gauge: Send + 'static;

    fn create_counter(&self, opts: SeriesOpts) -> Result<Self::Counter>;
    fn create_gauge(&self, opts: SeriesOpts) -> Result<Self::Gauge>;

    fn register_counter(&self, counter: &Self::Counter) -> Result<()>;
    fn register_gauge(&self, gauge: &Self::Gauge) -> Result<()>;

    fn unregister_counter(&self, counter: &Self::Counter);

    fn increment(&self, counter: &Self::Counter);
    fn set_value(&self, gauge: &Self::Gauge, value: f64);
}

/// A `prometheus` counter together with the identity it was created with.
#[derive(Clone)]
pub struct PromCounter {
    opts: SeriesOpts,
    inner: Counter,
}

impl fmt::Debug for PromCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromCounter")
            .field("series", &self.opts.to_string())
            .field("value", &self.inner.get())
            .finish()
    }
}

impl PromCounter {
    pub fn opts(&self) -> &SeriesOpts {
        &self.opts
    }

    pub fn get(&self) -> f64 {
        self.inner.get()
    }
}

#[derive(Clone)]
pub struct PromGauge {
    opts: SeriesOpts,
    inner: Gauge,
}

impl fmt::Debug for PromGauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromGauge")
            .field("series", &self.opts.to_string())
            .field("value", &self.inner.get())
            .finish()
    }
}

impl PromGauge {
    pub fn opts(&self) -> &SeriesOpts {
        &self.opts
    }

    pub fn get(&self) -> f64 {
        self.inner.get()
    }
}

/// [`MetricRegistry`] backed by a `prometheus::Registry`.
#[derive(Clone, Default)]
pub struct PrometheusRegistry {
    registry: Registry,
}

impl PrometheusRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// The underlying registry, for callers that add their own collectors.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered series in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let families = self.registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new().encode(&families, &mut buf)?;
        // The text encoder only ever writes UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

impl MetricRegistry for PrometheusRegistry {
    type Counter = PromCounter;
    type Gauge = PromGauge;

    fn create_counter(&self, opts: SeriesOpts) -> Result<PromCounter> {
        let inner = Counter::with_opts(opts.to_opts()).map_err(|source| MetricsError::Create {
            series: opts.to_string(),
            source,
        })?;
        Ok(PromCounter { opts, inner })
    }

    fn create_gauge(&self, opts: SeriesOpts) -> Result<PromGauge> {
        let inner = Gauge::with_opts(opts.to_opts()).map_err(|source| MetricsError::Create {
            series: opts.to_string(),
            source,
        })?;
        Ok(PromGauge { opts, inner })
    }

    fn register_counter(&self, counter: &PromCounter) -> Result<()> {
        self.registry
            .register(Box::new(counter.inner.clone()))
            .map_err(|source| MetricsError::Register {
                series: counter.opts.to_string(),
                source,
            })
    }

    fn register_gauge(&self, gauge: &PromGauge) -> Result<()> {
        self.registry
            .register(Box::new(gauge.inner.clone()))
            .map_err(|source| MetricsError::Register {
                series: gauge.opts.to_string(),
                source,
            })
    }

    fn unregister_counter(&self, counter: &PromCounter) {
        if let Err(e) = self.registry.unregister(Box::new(counter.inner.clone())) {
            debug!(series = %counter.opts, error = %e, "unregister of absent series ignored");
        }
    }

    fn increment(&self, counter: &PromCounter) {
        counter.inner.inc();
    }

    fn set_value(&self, gauge: &PromGauge, value: f64) {
        gauge.inner.set(value);
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_display() {
        let opts = SeriesOpts::map_current("srv1", "de_dust2");
        assert_eq!(
            opts.to_string(),
            r#"gameserver_map_current{server="srv1",map="de_dust2"}"#
        );
        assert_eq!(opts.label("map"), Some("de_dust2"));
        assert_eq!(opts.label("steamid"), None);
    }

    #[test]
    fn test_register_render_unregister() {
        let registry = PrometheusRegistry::new();
        let counter = registry
            .create_counter(SeriesOpts::player_current("srv1", "STEAM_0:1:42"))
            .unwrap();
        registry.increment(&counter);
        registry.register_counter(&counter).unwrap();

        let text = registry.render().unwrap();
        assert!(text.contains("# TYPE gameserver_players_current counter"));
        assert!(text.contains(r#"steamid="STEAM_0:1:42""#));
        assert_eq!(counter.get(), 1.0);

        registry.unregister_counter(&counter);
        let text = registry.render().unwrap();
        assert!(!text.contains("STEAM_0:1:42"));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let registry = PrometheusRegistry::new();
        let first = registry
            .create_counter(SeriesOpts::player_current("srv1", "A"))
            .unwrap();
        let second = registry
            .create_counter(SeriesOpts::player_current("srv1", "A"))
            .unwrap();
        registry.register_counter(&first).unwrap();

        let err = registry.register_counter(&second).unwrap_err();
        assert!(matches!(err, MetricsError::Register { .. }));
        assert!(err.to_string().contains(r#"steamid="A""#));
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = PrometheusRegistry::new();
        let counter = registry
            .create_counter(SeriesOpts::map_current("srv1", "cs_office"))
            .unwrap();
        // Never registered.
        registry.unregister_counter(&counter);
        registry.register_counter(&counter).unwrap();
        registry.unregister_counter(&counter);
        // Already gone.
        registry.unregister_counter(&counter);
        assert!(!registry.render().unwrap().contains("cs_office"));
    }

    #[test]
    fn test_gauge_set_value() {
        let registry = PrometheusRegistry::new();
        let gauge = registry
            .create_gauge(SeriesOpts::player_count_max("srv1"))
            .unwrap();
        registry.register_gauge(&gauge).unwrap();
        registry.set_value(&gauge, 24.0);
        assert_eq!(gauge.get(), 24.0);
        assert!(
            registry
                .render()
                .unwrap()
                .contains(r#"gameserver_player_count_max{server="srv1"} 24"#)
        );
    }
}
