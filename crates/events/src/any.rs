//! Sum type over the whole catalog.

use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, ValidationError};
use crate::event::Event;
use crate::{
    AnalyticsProcessed, ClickTracked, GenerateReportJob, OrderCreated, PaymentCompleted,
    PaymentFailed, PaymentInitiated, ProductUpdated, ReportGenerated, StockReleased,
    StockReserved, UserRegistered,
};

macro_rules! any_event {
    ($($variant:ident),+ $(,)?) => {
        /// Any event of the catalog, tagged by its event name.
        ///
        /// Broker bodies are untagged (the queue determines the type); this
        /// type is for places that hold events of several kinds at once, such
        /// as dead-letter inspection.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type", content = "data")]
        pub enum AnyEvent {
            $($variant($variant),)+
        }

        impl AnyEvent {
            /// Names of every event type in the catalog.
            pub const NAMES: &'static [&'static str] = &[$($variant::NAME,)+];

            /// Returns the event name.
            pub fn event_type(&self) -> &'static str {
                match self {
                    $(AnyEvent::$variant(_) => $variant::NAME,)+
                }
            }

            /// Encodes the inner event as an untagged wire body.
            pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
                match self {
                    $(AnyEvent::$variant(event) => event.encode(),)+
                }
            }

            /// Decodes a wire body whose event type is known by name.
            pub fn decode_named(name: &str, bytes: &[u8]) -> Result<Self, ValidationError> {
                match name {
                    $(n if n == $variant::NAME => $variant::decode(bytes).map(AnyEvent::$variant),)+
                    other => Err(ValidationError::field(
                        "type",
                        format!("unknown event type {other:?}"),
                    )),
                }
            }
        }

        $(
            impl From<$variant> for AnyEvent {
                fn from(event: $variant) -> Self {
                    AnyEvent::$variant(event)
                }
            }
        )+
    };
}

any_event!(
    UserRegistered,
    PaymentInitiated,
    PaymentCompleted,
    PaymentFailed,
    ProductUpdated,
    GenerateReportJob,
    ReportGenerated,
    OrderCreated,
    StockReserved,
    StockReleased,
    ClickTracked,
    AnalyticsProcessed,
);
