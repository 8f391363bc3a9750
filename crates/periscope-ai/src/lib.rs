//! AI traffic classification and parsing
//!
//! Everything in this crate operates on untyped `serde_json::Value` payloads:
//! OpenAI and Anthropic shapes are walked defensively, unrecognized fields
//! default to `None`, and no parser ever fails an exchange.
//!
//! - [`detect`]: endpoint recognition and provider inference
//! - [`request`]: request-body parsing (messages, tools, images)
//! - [`response`]: non-streamed response parsing
//! - [`stream`]: streamed SSE delta merging
//! - [`pricing`]: token cost estimation
//! - [`model_info`]: context-window metadata cache

pub mod detect;
pub mod model_info;
pub mod pricing;
pub mod request;
pub mod response;
pub mod stream;

pub use detect::{detect_provider, is_ai_endpoint};
pub use model_info::{ModelInfo, ModelInfoCache};
pub use pricing::{CostBreakdown, estimate_cost};
pub use request::{ParsedAiRequest, parse_ai_request};
pub use response::{ParsedAiResponse, parse_ai_response};
pub use stream::{find_generation_id, find_generation_id_in_frames, parse_sse_chunks};
