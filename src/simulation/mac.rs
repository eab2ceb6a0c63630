//! Per-node MAC layer state machine.
//!
//! The MAC layer decides, it does not act: every transition returns an
//! outcome and the world (see `world.rs`) carries out the scheduling,
//! radio notifications and deliveries that go with it. This keeps the
//! state machine testable without a scheduler or radio model.
//!
//! ## State flags
//!
//! `sending` means the one-message buffer is full. While sending, the node
//! either waits for a reception to end (`send_postponed`), has a channel
//! probe outstanding, or is `transmitting`. Reception is tracked
//! independently because a node keeps listening while its own send waits.

use crate::config::MacConfig;
use crate::scheduler::EventId;

use super::signal_calculations::{is_channel_free, is_message_corrupted, is_receivable};
use super::types::{AppTag, NodeId, Payload};

/// Observable state of the MAC layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    Idle,
    /// A send was accepted while receiving; the probe starts once the
    /// reception is over.
    SendPending,
    /// A channel probe is scheduled (initial wait or backoff).
    Probing,
    Transmitting,
    /// Locked on a sender. A corrupted reception is still followed to its
    /// end but never delivered.
    Receiving { corrupted: bool },
}

/// Result of [`MacLayer::begin_send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDecision {
    /// Already sending; the caller must retry later.
    Rejected,
    /// Accepted, probe deferred until the current reception ends.
    Postponed,
    /// Accepted, a channel probe must be scheduled after the waiting time.
    Probe,
}

/// Result of a channel probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    /// Channel free: transmit with the given power.
    Transmit(f64),
    /// Channel busy: probe again after a backoff.
    Backoff,
    /// Channel busy and the probe budget is used up; the send is dropped.
    GiveUp(Option<AppTag>),
    /// Stale probe for a send that no longer exists.
    Ignored,
}

/// Result of [`MacLayer::reception_begin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptionStart {
    /// Locked on the new sender.
    Started,
    /// Added to the noise of an ongoing reception.
    Interference { newly_corrupted: bool },
    /// Too weak or the node is transmitting; folded into ambient noise.
    Noise,
}

/// Result of [`MacLayer::reception_end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceptionEnd {
    /// The tracked transmission ended.
    Completed { sender: NodeId, corrupted: bool, resume_send: bool },
    /// An unrelated transmission ended and its signal left the noise.
    NoiseRemoved,
}

/// Radio state of one mote.
#[derive(Debug)]
pub struct MacLayer {
    sending: bool,
    transmitting: bool,
    receiving: bool,
    corrupted: bool,
    send_postponed: bool,
    /// Message in the one-message send buffer.
    payload: Option<Payload>,
    /// Application that owns the buffered message.
    sender_app: Option<AppTag>,
    /// Sender of the reception in progress. A handle, not ownership.
    tracked_sender: Option<NodeId>,
    signal_strength: f64,
    noise_strength: f64,
    transmission_strength: f64,
    probe_attempts: u32,
    pub(crate) probe_event: EventId,
    pub(crate) end_transmission_event: EventId,
}

impl MacLayer {
    pub(crate) fn new(probe_event: EventId, end_transmission_event: EventId) -> Self {
        Self {
            sending: false,
            transmitting: false,
            receiving: false,
            corrupted: false,
            send_postponed: false,
            payload: None,
            sender_app: None,
            tracked_sender: None,
            signal_strength: 0.0,
            noise_strength: 0.0,
            transmission_strength: 1.0,
            probe_attempts: 0,
            probe_event,
            end_transmission_event,
        }
    }

    pub fn state(&self) -> MacState {
        if self.transmitting {
            MacState::Transmitting
        } else if self.receiving {
            MacState::Receiving { corrupted: self.corrupted }
        } else if self.sending && self.send_postponed {
            MacState::SendPending
        } else if self.sending {
            MacState::Probing
        } else {
            MacState::Idle
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    pub fn is_transmitting(&self) -> bool {
        self.transmitting
    }

    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    /// Whether the last (or current) reception got corrupted.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    pub fn is_send_postponed(&self) -> bool {
        self.send_postponed
    }

    pub fn tracked_sender(&self) -> Option<NodeId> {
        self.tracked_sender
    }

    pub fn signal_strength(&self) -> f64 {
        self.signal_strength
    }

    /// Noise accumulated from transmissions this node is not locked on.
    pub fn noise_strength(&self) -> f64 {
        self.noise_strength
    }

    pub fn transmission_strength(&self) -> f64 {
        self.transmission_strength
    }

    pub fn set_transmission_strength(&mut self, strength: f64) {
        self.transmission_strength = strength;
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn sender_app(&self) -> Option<AppTag> {
        self.sender_app
    }

    /// Accept a message into the send buffer.
    pub fn begin_send(&mut self, payload: Payload, app: AppTag) -> SendDecision {
        if self.sending {
            return SendDecision::Rejected;
        }
        self.sending = true;
        self.transmitting = false;
        self.payload = Some(payload);
        self.sender_app = Some(app);
        self.probe_attempts = 0;

        if self.receiving {
            self.send_postponed = true;
            SendDecision::Postponed
        } else {
            self.send_postponed = false;
            SendDecision::Probe
        }
    }

    /// Carrier sense before transmitting.
    pub fn probe_channel(&mut self, config: &MacConfig) -> ProbeOutcome {
        if !self.sending || self.transmitting {
            return ProbeOutcome::Ignored;
        }
        if is_channel_free(config, self.noise_strength) && !self.receiving {
            self.transmitting = true;
            return ProbeOutcome::Transmit(self.transmission_strength);
        }

        self.probe_attempts += 1;
        match config.max_probe_attempts {
            Some(limit) if self.probe_attempts >= limit => ProbeOutcome::GiveUp(self.clear_send_buffer()),
            _ => ProbeOutcome::Backoff,
        }
    }

    /// The transmission is over; empties the send buffer and returns the
    /// application to notify.
    pub fn finish_transmission(&mut self) -> Option<AppTag> {
        self.transmitting = false;
        self.clear_send_buffer()
    }

    fn clear_send_buffer(&mut self) -> Option<AppTag> {
        self.sending = false;
        self.send_postponed = false;
        self.payload = None;
        self.probe_attempts = 0;
        self.sender_app.take()
    }

    /// A transmission reached this node with `signal` strength.
    pub fn reception_begin(&mut self, config: &MacConfig, signal: f64, sender: NodeId) -> ReceptionStart {
        if self.receiving {
            self.noise_strength += signal;
            let was_corrupted = self.corrupted;
            if is_message_corrupted(config, self.signal_strength, self.noise_strength) {
                self.corrupted = true;
            }
            return ReceptionStart::Interference {
                newly_corrupted: self.corrupted && !was_corrupted,
            };
        }

        if !self.transmitting && is_receivable(config, signal, self.noise_strength) {
            self.tracked_sender = Some(sender);
            self.receiving = true;
            self.corrupted = false;
            self.signal_strength = signal;
            ReceptionStart::Started
        } else {
            self.noise_strength += signal;
            ReceptionStart::Noise
        }
    }

    /// A transmission that reached this node with `signal` strength ended.
    pub fn reception_end(&mut self, signal: f64, sender: NodeId) -> ReceptionEnd {
        if self.tracked_sender != Some(sender) {
            self.noise_strength -= signal;
            // Float drift must not leave a phantom noise floor behind.
            if self.noise_strength < 0.0 {
                self.noise_strength = 0.0;
            }
            return ReceptionEnd::NoiseRemoved;
        }

        self.receiving = false;
        self.signal_strength = 0.0;
        self.tracked_sender = None;
        let resume_send = self.send_postponed;
        self.send_postponed = false;
        ReceptionEnd::Completed {
            sender,
            corrupted: self.corrupted,
            resume_send,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::EventScheduler;

    const APP: AppTag = AppTag("test");

    fn mac() -> MacLayer {
        let mut scheduler = EventScheduler::<()>::new();
        let probe = scheduler.create(());
        let end = scheduler.create(());
        MacLayer::new(probe, end)
    }

    #[test]
    fn second_send_is_rejected_without_state_change() {
        let mut mac = mac();
        assert_eq!(mac.begin_send(Payload::new(1u32), APP), SendDecision::Probe);
        assert_eq!(mac.state(), MacState::Probing);
        assert_eq!(mac.begin_send(Payload::new(2u32), APP), SendDecision::Rejected);
        assert_eq!(mac.payload().and_then(|p| p.downcast_ref::<u32>()), Some(&1));
    }

    #[test]
    fn send_while_receiving_is_postponed_until_reception_ends() {
        let config = MacConfig::default();
        let mut mac = mac();
        assert_eq!(mac.reception_begin(&config, 1.0, NodeId(7)), ReceptionStart::Started);
        assert_eq!(mac.begin_send(Payload::new(()), APP), SendDecision::Postponed);
        assert_eq!(mac.state(), MacState::Receiving { corrupted: false });

        let end = mac.reception_end(1.0, NodeId(7));
        assert_eq!(
            end,
            ReceptionEnd::Completed {
                sender: NodeId(7),
                corrupted: false,
                resume_send: true
            }
        );
        assert_eq!(mac.state(), MacState::Probing);
    }

    #[test]
    fn busy_channel_backs_off_and_free_channel_transmits() {
        let config = MacConfig::default();
        let mut mac = mac();
        mac.begin_send(Payload::new(()), APP);
        // Signals below the start threshold only add noise.
        assert_eq!(mac.reception_begin(&config, 0.09, NodeId(1)), ReceptionStart::Noise);
        assert_eq!(mac.reception_begin(&config, 0.09, NodeId(2)), ReceptionStart::Noise);
        assert_eq!(mac.probe_channel(&config), ProbeOutcome::Backoff);

        assert_eq!(mac.reception_end(0.09, NodeId(1)), ReceptionEnd::NoiseRemoved);
        assert_eq!(mac.reception_end(0.09, NodeId(2)), ReceptionEnd::NoiseRemoved);
        assert_eq!(mac.probe_channel(&config), ProbeOutcome::Transmit(1.0));
        assert_eq!(mac.state(), MacState::Transmitting);

        assert_eq!(mac.finish_transmission(), Some(APP));
        assert_eq!(mac.state(), MacState::Idle);
        assert!(mac.payload().is_none());
    }

    #[test]
    fn probe_budget_abandons_the_send() {
        let config = MacConfig {
            max_probe_attempts: Some(2),
            ..MacConfig::default()
        };
        let mut mac = mac();
        mac.begin_send(Payload::new(()), APP);
        mac.reception_begin(&config, 0.09, NodeId(1));
        mac.reception_begin(&config, 0.09, NodeId(2));
        assert_eq!(mac.probe_channel(&config), ProbeOutcome::Backoff);
        assert_eq!(mac.probe_channel(&config), ProbeOutcome::GiveUp(Some(APP)));
        assert!(!mac.is_sending());
        assert_eq!(mac.probe_channel(&config), ProbeOutcome::Ignored);
    }

    #[test]
    fn interference_corrupts_once() {
        let config = MacConfig::default();
        let mut mac = mac();
        mac.reception_begin(&config, 0.5, NodeId(1));
        // 0.5 / (0.025 + 0.1) = 4.0, still fine
        assert_eq!(mac.reception_begin(&config, 0.1, NodeId(2)), ReceptionStart::Interference { newly_corrupted: false });
        // 0.5 / (0.025 + 0.3) < 2.0
        assert_eq!(mac.reception_begin(&config, 0.2, NodeId(3)), ReceptionStart::Interference { newly_corrupted: true });
        assert_eq!(mac.reception_begin(&config, 0.2, NodeId(4)), ReceptionStart::Interference { newly_corrupted: false });
        assert_eq!(mac.state(), MacState::Receiving { corrupted: true });

        assert_eq!(mac.reception_end(0.1, NodeId(2)), ReceptionEnd::NoiseRemoved);
        assert!(matches!(mac.reception_end(0.5, NodeId(1)), ReceptionEnd::Completed { corrupted: true, .. }));
    }

    #[test]
    fn transmitting_node_does_not_lock_on_senders() {
        let config = MacConfig::default();
        let mut mac = mac();
        mac.begin_send(Payload::new(()), APP);
        mac.probe_channel(&config);
        assert_eq!(mac.reception_begin(&config, 1.0, NodeId(1)), ReceptionStart::Noise);
        assert!((mac.noise_strength() - 1.0).abs() < 1e-12);
    }
}
