//! Notifications published while responses are swapped and settled.

use dom::NodeId;
use log::trace;
use tokio::sync::broadcast;

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapEvent {
    /// A non-success response arrived, whether or not it swaps.
    ResponseError { elt: NodeId, status: u16 },
    /// Event named by the response rule that matched.
    Custom { elt: NodeId, name: String },
    /// The target selector matched nothing.
    TargetError { elt: NodeId, selector: Option<String> },
    /// `inserted` lists the top-level nodes put in place, out-of-band content
    /// included.
    AfterSwap {
        elt: NodeId,
        target: NodeId,
        inserted: Vec<NodeId>,
    },
    AfterSettle { elt: NodeId, target: NodeId },
    OobBeforeSwap { target: NodeId, fragment: NodeId },
    OobAfterSwap { target: NodeId, fragment: NodeId },
    OobErrorNoTarget { selector: Option<String> },
    /// A pending swap was dropped for a newer request on the same element.
    Superseded { elt: NodeId, ticket: u64 },
    /// A `<script>` element became part of the document.
    ScriptInserted { script: NodeId },
    /// The cycle for `ticket` is over.
    Completed { ticket: u64, swapped: bool },
}

/// Broadcast fan-out of [`SwapEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SwapEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Nobody listening is not an error.
    pub fn emit(&self, event: SwapEvent) {
        if let Err(unsent) = self.sender.send(event) {
            trace!("no subscribers for {:?}", unsent.0);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dom::Document;

    #[test]
    fn subscribers_see_events_in_order() {
        let doc = Document::new();
        let bus = EventBus::new();
        bus.emit(SwapEvent::Completed {
            ticket: 0,
            swapped: false,
        });
        let mut receiver = bus.subscribe();
        bus.emit(SwapEvent::ScriptInserted { script: doc.root() });
        bus.emit(SwapEvent::Completed {
            ticket: 1,
            swapped: true,
        });
        assert_eq!(receiver.try_recv().unwrap(), SwapEvent::ScriptInserted { script: doc.root() });
        assert_eq!(
            receiver.try_recv().unwrap(),
            SwapEvent::Completed {
                ticket: 1,
                swapped: true
            }
        );
        assert!(receiver.try_recv().is_err());
    }
}
