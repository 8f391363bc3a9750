//! The Periscope data plane
//!
//! An intercepting reverse proxy: every byte between caller and upstream is
//! forwarded untouched, while a parallel observation pipeline captures the
//! exchange into the store and broadcasts lifecycle events.
//!
//! - [`body`]: bounded body capture, decompression, safe JSON helpers
//! - [`resolve`]: the target precedence chain
//! - [`collector`]: transparent stream tees (raw bytes, SSE tally)
//! - [`botfilter`]: crawler User-Agent blocking
//! - [`forward`]: the request pipeline joining everything
//! - [`enrich`]: deferred OpenRouter telemetry fetch

pub mod body;
pub mod botfilter;
pub mod collector;
pub mod enrich;
pub mod forward;
pub mod resolve;

pub use enrich::Enricher;
pub use forward::{ProxyState, proxy_router};
pub use resolve::{ResolvedTarget, RoutingError};
