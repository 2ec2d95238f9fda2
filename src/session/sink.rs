use crate::models::ProgressEvent;

/// Where a session delivers its events.
///
/// `emit` returns `false` once the consumer is gone; the session then stops
/// as if it had been cancelled.
pub trait EventSink {
    fn emit(&mut self, event: ProgressEvent) -> bool;
}

/// Collects everything, for tests and one-shot callers.
impl EventSink for Vec<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) -> bool {
        self.push(event);
        true
    }
}

/// Blocks while the channel is full. Only call from a blocking thread.
impl EventSink for tokio::sync::mpsc::Sender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) -> bool {
        self.blocking_send(event).is_ok()
    }
}

impl EventSink for crossbeam_channel::Sender<ProgressEvent> {
    fn emit(&mut self, event: ProgressEvent) -> bool {
        self.send(event).is_ok()
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> EventSink for FnSink<F>
where
    F: FnMut(ProgressEvent) -> bool,
{
    fn emit(&mut self, event: ProgressEvent) -> bool {
        (self.0)(event)
    }
}
