//! Event catalog for the event-driven services.
//!
//! Every business fact exchanged over the broker is one of the types in this
//! crate. Each type has exactly one canonical JSON shape and implements
//! [`Event`], which provides `encode`/`decode` with the round-trip law
//! `decode(encode(e)) == e`.
//!
//! Decoding is strict: a missing required field or a value of the wrong JSON
//! type fails with a [`ValidationError`] naming the offending field.

pub mod any;
pub mod analytics;
pub mod error;
pub mod event;
pub mod payment;
pub mod product;
pub mod report;
pub mod saga;
pub mod timestamp;
pub mod user;

pub use any::AnyEvent;
pub use analytics::{AnalyticsProcessed, ClickTracked};
pub use error::{EncodeError, ValidationError};
pub use event::{Event, decode_json};
pub use payment::{PaymentCompleted, PaymentFailed, PaymentInitiated};
pub use product::ProductUpdated;
pub use report::{GenerateReportJob, ReportGenerated};
pub use saga::{OrderCreated, StockReleased, StockReserved};
pub use timestamp::Timestamp;
pub use user::{UserRegistered, is_valid_email};
