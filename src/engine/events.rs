//! Engine events and the listeners that receive them.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::models::{DecisionAction, DecisionRecord};

/// Free-form lifecycle or error message from an engine.
#[derive(Debug, Clone, Serialize)]
pub struct StatusMessage {
    pub timestamp: DateTime<Utc>,
    pub strategy: String,
    pub message: String,
}

impl StatusMessage {
    pub fn new(strategy: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            strategy: strategy.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EngineEvent {
    Status(StatusMessage),
    Decision(DecisionRecord),
}

/// Subscriber notified synchronously of every engine event, in order.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl EventListener for LogListener {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::Status(status) => {
                info!(strategy = %status.strategy, "{}", status.message);
            }
            EngineEvent::Decision(record) => match record.action {
                DecisionAction::Failed | DecisionAction::EmergencyStop => warn!(
                    strategy = %record.strategy,
                    action = %record.action,
                    instrument = %record.instrument_id,
                    reason = %record.reason,
                    "Decision"
                ),
                _ => info!(
                    strategy = %record.strategy,
                    action = %record.action,
                    instrument = %record.instrument_id,
                    market = %record.label,
                    size = %record.size,
                    price = %record.detected_price,
                    reason = %record.reason,
                    "Decision"
                ),
            },
        }
    }
}

/// Forwards events to an unbounded tokio channel (e.g. for a push transport).
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: UnboundedSender<EngineEvent>,
}

impl ChannelListener {
    pub fn new(tx: UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &EngineEvent) {
        if self.tx.send(event.clone()).is_err() {
            debug!("Event receiver dropped");
        }
    }
}
