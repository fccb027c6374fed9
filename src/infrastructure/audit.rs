use crate::domain::event::AuditEvent;
use crate::domain::ports::AuditSink;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Writes each audit event as a structured `tracing` record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        match serde_json::to_string(&event.detail) {
            Ok(detail) => tracing::info!(
                target: "escrow::audit",
                operation = event.operation,
                id = event.id.0,
                caller = %event.caller,
                height = event.height,
                detail = %detail,
                "audit"
            ),
            Err(e) => tracing::warn!(target: "escrow::audit", error = %e, "dropping audit event"),
        }
    }
}

/// Forwards audit events to a tokio channel.
///
/// A closed receiver never fails the operation; the event is dropped with a warning.
#[derive(Clone)]
pub struct ChannelAuditSink {
    sender: UnboundedSender<AuditEvent>,
}

impl ChannelAuditSink {
    pub fn new() -> (Self, UnboundedReceiver<AuditEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AuditSink for ChannelAuditSink {
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!(
                operation = e.0.operation,
                id = e.0.id.0,
                "audit receiver closed, dropping event"
            );
        }
    }
}

/// Keeps every event in memory. Used by tests and by the CLI's `--audit` flag.
#[derive(Default, Clone)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sends every event to each of the wrapped sinks.
pub struct FanOutAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl FanOutAuditSink {
    pub fn new(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanOutAuditSink {
    fn emit(&self, event: AuditEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}
