use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to create series {series}: {source}")]
    Create {
        series: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to register series {series}: {source}")]
    Register {
        series: String,
        #[source]
        source: prometheus::Error,
    },

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, MetricsError>;
