//! Pluggable sinks for rendering or forwarding dispatched events.

use super::event::Event;

/// A host-side consumer of events, invoked synchronously from
/// [`super::EventBus::emit`] when wired via an `on_all`/`on` subscription.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Prints each event's kind and summary to stdout. The default sink used by
/// binaries that don't wire up their own.
#[derive(Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&self, event: &Event) {
        println!("[{}] {}", event.kind_str(), event.summary());
    }
}

/// Forwards events onto an unbounded `flume` channel so a consumer can await
/// them as an async stream instead of registering a closure.
pub struct ChannelSink {
    sender: flume::Sender<Event>,
}

impl ChannelSink {
    /// Create a sink/receiver pair.
    pub fn new() -> (Self, flume::Receiver<Event>) {
        let (sender, receiver) = flume::unbounded();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn handle(&self, event: &Event) {
        // A closed receiver just means nobody is listening anymore.
        let _ = self.sender.send(event.clone());
    }
}
