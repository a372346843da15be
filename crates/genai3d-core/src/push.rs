//! Push channel: event parsing, the injectable channel interface, and routing
//!
//! Messages arrive as `{"event": <name>, "data": {...}}`. Anything that does
//! not parse into a known [`PushEvent`] is rejected here and never reaches a
//! controller.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::conversion::ConversionController;
use crate::effect::UiEffect;
use crate::error::PushError;

/// Events the backend pushes to this client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum PushEvent {
    #[serde(rename = "model_update_complete")]
    ModelUpdateComplete {
        model_path: String,
        #[serde(default)]
        request_id: Option<String>,
    },
    #[serde(rename = "model_update_error")]
    ModelUpdateError {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        request_id: Option<String>,
    },
}

const KNOWN_EVENTS: [&str; 2] = ["model_update_complete", "model_update_error"];

impl PushEvent {
    /// Validate and decode one channel message
    pub fn parse(text: &str) -> Result<Self, PushError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| PushError::Malformed(e.to_string()))?;

        let name = value
            .get("event")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PushError::Malformed("missing event name".to_string()))?;
        if !KNOWN_EVENTS.contains(&name) {
            return Err(PushError::UnknownEvent(name.to_string()));
        }

        let event: PushEvent =
            serde_json::from_value(value).map_err(|e| PushError::Malformed(e.to_string()))?;

        if let PushEvent::ModelUpdateComplete { model_path, .. } = &event {
            if model_path.trim().is_empty() {
                return Err(PushError::EmptyField("model_path"));
            }
        }
        Ok(event)
    }
}

/// A source of push events bound to one channel session
///
/// The browser feeds a [`PushQueue`] from its WebSocket; tests feed one by hand.
pub trait PushChannel: Send + Sync {
    /// Identifier the server uses to address this client
    fn session_id(&self) -> &str;

    /// Take every event received since the last call, oldest first
    fn drain(&self) -> Vec<PushEvent>;
}

/// In-memory push channel shared between a transport callback and the frame loop
#[derive(Debug, Clone)]
pub struct PushQueue {
    session_id: String,
    events: Arc<Mutex<VecDeque<PushEvent>>>,
}

impl PushQueue {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            events: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Queue with a fresh random session id
    pub fn with_random_session() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn push_event(&self, event: PushEvent) {
        if let Ok(mut queue) = self.events.lock() {
            queue.push_back(event);
        }
    }

    /// Parse a raw channel message and queue it. Rejected messages are logged
    /// and dropped.
    pub fn push_raw(&self, text: &str) -> Result<(), PushError> {
        match PushEvent::parse(text) {
            Ok(event) => {
                self.push_event(event);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Dropping push message: {}", e);
                Err(e)
            }
        }
    }
}

impl PushChannel for PushQueue {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    fn drain(&self) -> Vec<PushEvent> {
        match self.events.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Dispatches push events to the conversion lifecycle
pub struct PushEventRouter {
    channel: Arc<dyn PushChannel>,
}

impl PushEventRouter {
    pub fn new(channel: Arc<dyn PushChannel>) -> Self {
        Self { channel }
    }

    /// Drain the channel and route every event, collecting the resulting effects
    pub fn pump(&self, conversion: &mut ConversionController) -> Vec<UiEffect> {
        self.channel
            .drain()
            .into_iter()
            .flat_map(|event| Self::route(event, conversion))
            .collect()
    }

    pub fn route(event: PushEvent, conversion: &mut ConversionController) -> Vec<UiEffect> {
        match event {
            PushEvent::ModelUpdateComplete { model_path, request_id } => {
                conversion.on_model_complete(&model_path, request_id.as_deref())
            }
            PushEvent::ModelUpdateError { error, request_id } => {
                conversion.on_model_error(error.as_deref(), request_id.as_deref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_update_complete() {
        let event = PushEvent::parse(
            r#"{"event": "model_update_complete", "data": {"model_path": "models/j.glb", "status": "success"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            PushEvent::ModelUpdateComplete { model_path: "models/j.glb".into(), request_id: None }
        );
    }

    #[test]
    fn test_parse_rejects_unknown_event() {
        let err = PushEvent::parse(r#"{"event": "eval", "data": {"js": "alert(1)"}}"#).unwrap_err();
        assert_eq!(err, PushError::UnknownEvent("eval".into()));
    }

    #[test]
    fn test_parse_rejects_missing_model_path() {
        let err = PushEvent::parse(r#"{"event": "model_update_complete", "data": {}}"#).unwrap_err();
        assert!(matches!(err, PushError::Malformed(_)));

        let err = PushEvent::parse(r#"{"event": "model_update_complete", "data": {"model_path": " "}}"#)
            .unwrap_err();
        assert_eq!(err, PushError::EmptyField("model_path"));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(PushEvent::parse("42"), Err(PushError::Malformed(_))));
        assert!(matches!(PushEvent::parse("not json"), Err(PushError::Malformed(_))));
    }

    #[test]
    fn test_queue_drains_in_order() {
        let queue = PushQueue::new("sid-1");
        queue
            .push_raw(r#"{"event": "model_update_error", "data": {"error": "timed out"}}"#)
            .unwrap();
        assert!(queue.push_raw("garbage").is_err());
        queue.push_event(PushEvent::ModelUpdateComplete { model_path: "a.glb".into(), request_id: None });

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PushEvent::ModelUpdateError { .. }));
        assert!(queue.drain().is_empty());
        assert_eq!(queue.session_id(), "sid-1");
    }

    #[test]
    fn test_random_sessions_differ() {
        assert_ne!(
            PushQueue::with_random_session().session_id(),
            PushQueue::with_random_session().session_id()
        );
    }
}
