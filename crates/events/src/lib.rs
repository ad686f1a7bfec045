#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for edx
//!
//! Library crates never print. Upload, download and resilience progress is
//! reported as typed events over an unbounded channel; the CLI decides how to
//! render or log them.

pub mod events;
pub use events::{
    AppEvent, DownloadEvent, FailureContext, GeneralEvent, ResilienceEvent, UploadEvent,
};

use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;

/// Type alias for event sender
pub type EventSender = UnboundedSender<AppEvent>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<AppEvent>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// The unified trait for emitting events
///
/// Implemented for the raw [`EventSender`] and for anything that optionally
/// holds one, so callers never have to care whether a receiver exists.
pub trait EventEmitter {
    /// Get the event sender for this emitter
    fn event_sender(&self) -> Option<&EventSender>;

    /// Emit an event through this emitter
    fn emit(&self, event: AppEvent) {
        if let Some(sender) = self.event_sender() {
            // Receiver may already be gone during shutdown
            let _ = sender.send(event);
        }
    }

    fn emit_debug(&self, message: impl Into<String>, context: BTreeMap<String, String>) {
        self.emit(AppEvent::General(GeneralEvent::debug_with_context(message, context)));
    }

    /// Warn about something that did not stop the operation
    fn emit_warning(&self, message: impl Into<String>, context: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::warning_with_context(message, context)));
    }

    fn emit_operation_started(&self, operation: impl Into<String>) {
        self.emit(AppEvent::General(GeneralEvent::OperationStarted {
            operation: operation.into(),
        }));
    }

    fn emit_operation_completed(&self, operation: impl Into<String>, success: bool) {
        self.emit(AppEvent::General(GeneralEvent::OperationCompleted {
            operation: operation.into(),
            success,
        }));
    }

    fn emit_upload(&self, event: UploadEvent) {
        self.emit(AppEvent::Upload(event));
    }

    fn emit_download(&self, event: DownloadEvent) {
        self.emit(AppEvent::Download(event));
    }

    fn emit_resilience(&self, event: ResilienceEvent) {
        self.emit(AppEvent::Resilience(event));
    }
}

impl EventEmitter for EventSender {
    fn event_sender(&self) -> Option<&EventSender> {
        Some(self)
    }
}

impl EventEmitter for Option<EventSender> {
    fn event_sender(&self) -> Option<&EventSender> {
        self.as_ref()
    }
}
