//! Queue and exchange names shared by every service.
//!
//! These names are part of the wire contract: producers and consumers written
//! in other languages bind to the same names, so they must match exactly.

pub const USER_REGISTERED_QUEUE: &str = "user_registered_queue";
pub const PAYMENT_INITIATED_QUEUE: &str = "payment_initiated_queue";
pub const PAYMENT_COMPLETED_QUEUE: &str = "payment_completed_queue";
pub const ORDER_CREATED_QUEUE: &str = "order_created_queue";
pub const STOCK_RESERVED_QUEUE: &str = "stock_reserved_queue";
pub const STOCK_RELEASED_QUEUE: &str = "stock_released_queue";
pub const REPORT_JOB_QUEUE: &str = "report_job_queue";
pub const REPORT_GENERATED_QUEUE: &str = "report_generated_queue";
pub const CLICK_TRACKED_QUEUE: &str = "click_tracked_queue";

/// Fanout exchange carrying `ProductUpdated`.
pub const PRODUCT_UPDATES_EXCHANGE: &str = "product_updates";

/// Fanout exchange carrying `PaymentFailed`.
pub const PAYMENT_FAILED_EXCHANGE: &str = "payment_failed";

/// Name of the dedicated queue a service binds to a fanout exchange.
///
/// Every consuming role gets its own queue so that each receives a copy of
/// every broadcast message instead of competing for it.
pub fn fanout_queue_name(service: &str, exchange: &str) -> String {
    format!("{service}_{exchange}_queue")
}
