//! Admin HTTP surface for operators and intent producers.

mod dto;
mod http;

pub use dto::{ErrorResponse, HealthResponse, OrderRecordResponse, RecoverRequest};
pub use http::{AppState, create_router};
