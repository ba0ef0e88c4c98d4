#![forbid(unsafe_code)]

use crate::progress::ProgressEvent;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Info,
    Warning,
    Error,
}

/// Everything a scanner reports back to its caller.
///
/// Events arrive in emission order. Exactly one of `Finished` or
/// `Canceled` terminates every `evaluate()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Progress(ProgressEvent),
    Message { level: MessageLevel, text: String },
    /// Combined child output relayed by the streaming runner variant.
    Output(String),
    Canceled,
    Finished,
}

/// Sending half of the scan event channel.
///
/// Sends never fail; when the receiver is gone the event is dropped,
/// which lets a scanner finish its cleanup undisturbed.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    pub fn progress(&self, event: ProgressEvent) {
        self.send(ScanEvent::Progress(event));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.send(ScanEvent::Message {
            level: MessageLevel::Info,
            text: text.into(),
        });
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.send(ScanEvent::Message {
            level: MessageLevel::Warning,
            text: text.into(),
        });
    }

    pub fn error(&self, text: impl Into<String>) {
        self.send(ScanEvent::Message {
            level: MessageLevel::Error,
            text: text.into(),
        });
    }

    pub fn output(&self, chunk: impl Into<String>) {
        self.send(ScanEvent::Output(chunk.into()));
    }
}
