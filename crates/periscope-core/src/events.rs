//! Lifecycle events and the broadcast bus
//!
//! Events are broadcast to all current observers; a subscriber joining later
//! does not see past events and nothing is persisted. Delivery is
//! non-blocking: a slow subscriber lags and drops, it never stalls the proxy.

use crate::types::RouteSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const BUS_CAPACITY: usize = 256;

/// Lifecycle event pushed to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProxyEvent {
    #[serde(rename = "request:start")]
    RequestStart {
        id: String,
        method: String,
        url: String,
        path: String,
        target_url: String,
        route_source: Option<RouteSource>,
        is_ai_request: bool,
        created_at: DateTime<Utc>,
    },

    #[serde(rename = "request:complete")]
    RequestComplete {
        id: String,
        status_code: Option<i64>,
        response_time_ms: Option<i64>,
        response_size: Option<i64>,
        error: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ai_record_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_tokens: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        total_cost_micros: Option<i64>,
    },

    #[serde(rename = "openrouter:enriched")]
    OpenRouterEnriched {
        ai_record_id: String,
        provider_name: Option<String>,
        total_cost: Option<f64>,
        cache_discount: Option<f64>,
    },
}

impl ProxyEvent {
    /// The request or AI record id this event belongs to.
    pub fn subject_id(&self) -> &str {
        match self {
            Self::RequestStart { id, .. } => id,
            Self::RequestComplete { id, .. } => id,
            Self::OpenRouterEnriched { ai_record_id, .. } => ai_record_id,
        }
    }
}

/// Many-writer, many-reader broadcast channel for [`ProxyEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ProxyEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event. Send errors (no subscribers) are ignored.
    pub fn publish(&self, event: ProxyEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_event(id: &str) -> ProxyEvent {
        ProxyEvent::RequestStart {
            id: id.to_string(),
            method: "GET".to_string(),
            url: "/x".to_string(),
            path: "/x".to_string(),
            target_url: "https://api.openai.com".to_string(),
            route_source: Some(RouteSource::Default),
            is_ai_request: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn event_serializes_with_colon_type_tag() {
        let json = serde_json::to_value(start_event("r1")).unwrap();
        assert_eq!(json["type"], "request:start");
        assert_eq!(json["route_source"], "default");
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish(start_event("r1"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(start_event("r1"));
        bus.publish(ProxyEvent::RequestComplete {
            id: "r1".to_string(),
            status_code: Some(200),
            response_time_ms: Some(12),
            response_size: Some(5),
            error: None,
            ai_record_id: None,
            model: None,
            total_tokens: None,
            total_cost_micros: None,
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.subject_id(), "r1");
        assert!(matches!(second, ProxyEvent::RequestComplete { .. }));
    }

    #[tokio::test]
    async fn late_subscriber_misses_past_events() {
        let bus = EventBus::new();
        bus.publish(start_event("early"));

        let mut rx = bus.subscribe();
        bus.publish(start_event("late"));

        let got = rx.recv().await.unwrap();
        assert_eq!(got.subject_id(), "late");
    }
}
