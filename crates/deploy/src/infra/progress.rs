//! Observers of step transitions.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tokio::sync::mpsc;

use super::steps::StepEvent;

/// Receives every step transition of a run.
///
/// Notifications are synchronous and best-effort: the return value is never consulted and a
/// panicking observer is logged and ignored.
pub trait ProgressSink: Send + Sync {
    fn on_transition(&self, event: &StepEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&StepEvent) + Send + Sync,
{
    fn on_transition(&self, event: &StepEvent) {
        self(event)
    }
}

/// Forwards transitions into an unbounded channel without ever blocking the run.
#[derive(Debug, Clone)]
pub struct ChannelSink(mpsc::UnboundedSender<StepEvent>);

impl ProgressSink for ChannelSink {
    fn on_transition(&self, event: &StepEvent) {
        // A dropped receiver means nobody is listening anymore.
        let _ = self.0.send(event.clone());
    }
}

/// A sink paired with the receiving end of its channel.
pub fn progress_channel() -> (ChannelSink, mpsc::UnboundedReceiver<StepEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink(tx), rx)
}

/// Deliver an event to an optional sink, containing observer panics.
pub(crate) fn notify(sink: Option<&dyn ProgressSink>, event: &StepEvent) {
    let Some(sink) = sink else {
        return;
    };

    if catch_unwind(AssertUnwindSafe(|| sink.on_transition(event))).is_err() {
        tracing::warn!(step = %event.step, status = %event.status, "Progress observer panicked, ignoring");
    }
}
