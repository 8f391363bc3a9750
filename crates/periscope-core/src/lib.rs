//! Periscope Core Types
//!
//! This crate provides the fundamental types shared across Periscope:
//!
//! - [`types`]: Request/AI records, routing rules, config, pricing rows
//! - [`events`]: Lifecycle events and the broadcast event bus
//! - [`error`]: Core error type

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::{EventBus, ProxyEvent};
pub use types::{
    AiProvider, AiRecord, ConversationMessage, GenerationEnrichment, MatchType, MessageRole,
    OpenRouterMeta, PricingEntry, ProxyConfig, RequestCompletion, RequestRecord, RouteSource,
    RoutingRule, ToolCall, new_record_id,
};
