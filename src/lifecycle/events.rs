//! Structured events emitted while reconciling.

use std::fmt;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PassStarted,
    IndexCreated,
    AliasUpdated,
    MappingsMatch,
    MappingDrift,
    AdditiveUpdateFailed,
    MappingUpdated,
    StaleIndexMovedAside,
    StaleIndexDropped,
    LeftoverTempDropped,
    UnfreezeFailed,
    ReindexCompleted,
    AliasSwapped,
    AliasSwapIncomplete,
    AliasRepaired,
    PassCompleted,
    PassFailed,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PassStarted => "pass_started",
            EventKind::IndexCreated => "index_created",
            EventKind::AliasUpdated => "alias_updated",
            EventKind::MappingsMatch => "mappings_match",
            EventKind::MappingDrift => "mapping_drift",
            EventKind::AdditiveUpdateFailed => "additive_update_failed",
            EventKind::MappingUpdated => "mapping_updated",
            EventKind::StaleIndexMovedAside => "stale_index_moved_aside",
            EventKind::StaleIndexDropped => "stale_index_dropped",
            EventKind::LeftoverTempDropped => "leftover_temp_dropped",
            EventKind::UnfreezeFailed => "unfreeze_failed",
            EventKind::ReindexCompleted => "reindex_completed",
            EventKind::AliasSwapped => "alias_swapped",
            EventKind::AliasSwapIncomplete => "alias_swap_incomplete",
            EventKind::AliasRepaired => "alias_repaired",
            EventKind::PassCompleted => "pass_completed",
            EventKind::PassFailed => "pass_failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event kind plus key/value attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub attributes: Vec<(&'static str, String)>,
}

impl LifecycleEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            attributes: Vec::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl ToString) -> Self {
        self.attributes.push((key, value.to_string()));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for (key, value) in &self.attributes {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Destination of lifecycle events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        match event.kind {
            EventKind::PassFailed => error!(target: "larch::lifecycle", "{}", event),
            EventKind::MappingDrift
            | EventKind::AdditiveUpdateFailed
            | EventKind::UnfreezeFailed
            | EventKind::AliasSwapIncomplete
            | EventKind::AliasRepaired
            | EventKind::StaleIndexDropped
            | EventKind::LeftoverTempDropped => warn!(target: "larch::lifecycle", "{}", event),
            EventKind::PassStarted | EventKind::MappingsMatch => {
                debug!(target: "larch::lifecycle", "{}", event)
            }
            _ => info!(target: "larch::lifecycle", "{}", event),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|e| e.kind).collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: LifecycleEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_display() {
        let event = LifecycleEvent::new(EventKind::IndexCreated)
            .with("alias", "risk_score")
            .with("index", "risk_score-42");
        assert_eq!(
            event.to_string(),
            "index_created alias=risk_score index=risk_score-42"
        );
        assert_eq!(event.attribute("index"), Some("risk_score-42"));
        assert_eq!(event.attribute("missing"), None);
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.emit(LifecycleEvent::new(EventKind::PassStarted));
        sink.emit(LifecycleEvent::new(EventKind::PassCompleted));
        assert_eq!(
            sink.kinds(),
            vec![EventKind::PassStarted, EventKind::PassCompleted]
        );
    }
}
