//! Wattlens Common - store, window table and aggregation engine
//!
//! Correlates metered power draw with spot electricity prices over named
//! workload windows. Batch only: every run works over a fixed historical range.

pub mod analysis;
pub mod compare;
pub mod config;
pub mod error;
pub mod ingest;
pub mod price;
pub mod record;
pub mod report;
pub mod stats;
pub mod store;
pub mod timestamp;
pub mod window;
pub mod workload;

pub use analysis::{run_analysis, run_prices, AnalysisContext, AnalysisReport};
pub use compare::{Comparator, ComparisonResult, WindowComparison};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, FieldError, IngestError, StoreError, WindowError};
pub use price::{PriceAggregator, PriceAnalysis, PriceUnit};
pub use record::{MeasurementRecord, ObisCode, QuoteRecord, SampleRecord};
pub use store::{with_backoff, RetryPolicy, SqliteStore, TimeSeriesStore};
pub use timestamp::LocalClock;
pub use window::{Pattern, WindowDefinition};
pub use workload::{WindowOutcome, WindowResult, WorkloadAggregator};
