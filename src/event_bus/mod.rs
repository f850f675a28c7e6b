//! Event Bus: in-process, synchronous-dispatch pub/sub of typed events that
//! drives timeline recording.

mod bus;
mod event;
mod sink;

pub use bus::{EventBus, SubscriptionId};
pub use event::{Event, TimelineEvent};
pub use sink::{ChannelSink, EventSink, StdOutSink};
