//! Leaf consumers.
//!
//! These handlers end a flow: they update local state and, apart from the
//! report worker, publish nothing. Each keeps its simulated latency
//! configurable so tests can run with none.
//!
//! | Worker | Queue |
//! |---|---|
//! | [`CacheWorker`] | `cache_product_updates_queue` (fanout) |
//! | [`SearchWorker`] | `search_product_updates_queue` (fanout) |
//! | [`AnalyticsWorker`] | `analytics_product_updates_queue` (fanout), `click_tracked_queue` |
//! | [`EmailWorker`] | `user_registered_queue` |
//! | [`ReportWorker`] | `report_job_queue` |

pub mod analytics;
pub mod cache;
pub mod email;
pub mod error;
pub mod report;
pub mod search;

pub use analytics::{AnalyticsStore, AnalyticsWorker, ProductActivity};
pub use cache::{CacheWorker, CachedProduct, ProductCache};
pub use email::{EmailWorker, Mailer, SimulatedMailer};
pub use error::{Result, WorkerError};
pub use report::{
    ReportResult, ReportSettings, ReportStatus, ReportStore, ReportWorker, compute_report_hash,
};
pub use search::{SearchDocument, SearchIndex, SearchWorker};
