//! Contracts between a node and the code running on it.

use std::any::Any;

use super::types::{NodeId, Payload, TimerToken};
use super::world::NodeContext;

/// Code installed on a node under an [`AppTag`](super::types::AppTag).
///
/// Every callback runs inside one event handler and gets a
/// [`NodeContext`] scoped to its own node: sending, timers and the shared
/// random source are reached through it.
pub trait Application: Any {
    /// Called once when the simulation starts, after neighborhoods are known.
    fn start(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// A message sent by the application with the same tag on `sender`
    /// arrived uncorrupted.
    fn receive_message(&mut self, ctx: &mut NodeContext<'_>, payload: &Payload, sender: NodeId);

    /// The message accepted by the last successful `send_message` was
    /// transmitted.
    fn send_message_done(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// The message accepted by the last successful `send_message` never
    /// went on air: the MAC layer gave up after too many busy probes.
    /// Defaults to [`send_message_done`](Self::send_message_done).
    fn send_message_abandoned(&mut self, ctx: &mut NodeContext<'_>) {
        self.send_message_done(ctx);
    }

    fn timer_fired(&mut self, _ctx: &mut NodeContext<'_>, _token: TimerToken) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Read-only listener attached to a node, for statistics and tracing.
pub trait PassiveObserver {
    /// The node accepted a message into its send buffer.
    fn message_sent(&mut self, _node: NodeId, _payload: &Payload) {}

    fn message_received(&mut self, _node: NodeId, _payload: &Payload, _sender: NodeId) {}

    /// `payload` was lost at `node`: either the reception in progress got
    /// corrupted, or an interfering transmission arrived while receiving.
    fn message_corrupted(&mut self, _node: NodeId, _payload: &Payload) {}
}
