// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Guaranteed publisher flow controller.
//!
//! Owns the [`PublishWindow`](window::PublishWindow), sequence ids, blocked
//! senders and the publisher flow handshake. It never touches the link: each
//! operation returns the frames the session core has to transmit.
//!
//! ```text
//!   send ──> window has room? ──yes──> Pending ──flow up──> InFlight ──ack──> settled
//!                 │ no                                          │
//!                 ├─ blocking:     parked until a slot frees    └─ ack timer: resend
//!                 └─ non-blocking: WouldBlock, CanSend later
//! ```

mod seq;
pub(crate) mod window;

use crossbeam::channel::Sender;
use std::collections::VecDeque;

use crate::config::{PublisherAckMode, SessionConfig};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::wire::Frame;
use seq::SeqNumGenerator;
use window::{PublishWindow, Settled};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowState {
    Closed,
    Opening,
    Up { flow_id: u32 },
}

/// A blocking send waiting for a window slot.
pub(crate) struct ParkedSend {
    id: u64,
    message: Message,
    waiter: Sender<Result<()>>,
}

pub(crate) struct Publisher {
    window: PublishWindow,
    seq: SeqNumGenerator,
    flow: FlowState,
    ack_mode: PublisherAckMode,
    configured_window: u8,
    parked: VecDeque<ParkedSend>,
    next_parked_id: u64,
    can_send_pending: bool,
}

impl Publisher {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        Self {
            window: PublishWindow::new(config.pub_window_size),
            seq: SeqNumGenerator::new(),
            flow: FlowState::Closed,
            ack_mode: config.pub_ack_mode,
            configured_window: config.pub_window_size,
            parked: VecDeque::new(),
            next_parked_id: 1,
            can_send_pending: false,
        }
    }

    pub(crate) fn flow_id(&self) -> Option<u32> {
        match self.flow {
            FlowState::Up { flow_id } => Some(flow_id),
            _ => None,
        }
    }

    pub(crate) fn has_room(&self) -> bool {
        self.window.has_room()
    }

    pub(crate) fn unacked_sequence_ids(&self) -> Vec<u64> {
        self.window.unsettled_seqs()
    }

    pub(crate) fn has_unacked(&self) -> bool {
        !self.window.is_empty()
    }

    pub(crate) fn has_in_flight(&self) -> bool {
        self.window.has_in_flight()
    }

    // ------------------------------------------------------------------------
    // Flow handshake
    // ------------------------------------------------------------------------

    pub(crate) fn open(&mut self) -> Frame {
        self.flow = FlowState::Opening;
        Frame::OpenPublisherFlow {
            window: self.configured_window,
            per_message_acks: self.ack_mode == PublisherAckMode::PerMessage,
        }
    }

    /// Flow granted: (re)send everything the window holds.
    pub(crate) fn on_flow_up(&mut self, flow_id: u32, peer_window: u8) -> Vec<Frame> {
        if self.flow != FlowState::Opening {
            log::debug!("[publisher] unexpected flow up {} ignored", flow_id);
            return Vec::new();
        }
        self.flow = FlowState::Up { flow_id };
        self.window.set_peer_limit(peer_window);
        log::debug!(
            "[publisher] flow {} up, window {} ({} held)",
            flow_id,
            self.window.capacity(),
            self.window.len()
        );
        Self::publish_frames(flow_id, self.window.transmit_pending())
    }

    /// Link gone: the flow id dies with it, in-flight entries wait for the
    /// next flow.
    pub(crate) fn on_link_lost(&mut self) {
        self.flow = FlowState::Closed;
        self.window.requeue();
    }

    fn publish_frames(flow_id: u32, messages: Vec<Message>) -> Vec<Frame> {
        messages
            .into_iter()
            .map(|message| Frame::Publish { flow_id, message })
            .collect()
    }

    // ------------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------------

    /// Put `message` in the window, assigning its sequence id. Returns the
    /// frames to transmit now (none while the flow is not up).
    pub(crate) fn enqueue(&mut self, mut message: Message) -> std::result::Result<Vec<Frame>, Message> {
        if !self.window.has_room() {
            return Err(message);
        }
        let seq = self.seq.next();
        message.set_sequence_id(Some(seq));
        message.set_redelivered(false);
        self.window.push(seq, message)?;

        match self.flow {
            FlowState::Up { flow_id } => {
                Ok(Self::publish_frames(flow_id, self.window.transmit_pending()))
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Remember that a non-blocking send was turned away.
    pub(crate) fn note_would_block(&mut self) {
        self.can_send_pending = true;
    }

    /// `true` once per refused non-blocking send, when a slot is free again.
    pub(crate) fn take_can_send(&mut self) -> bool {
        if self.can_send_pending && self.window.has_room() && self.parked.is_empty() {
            self.can_send_pending = false;
            true
        } else {
            false
        }
    }

    pub(crate) fn park(&mut self, message: Message, waiter: Sender<Result<()>>) -> u64 {
        let id = self.next_parked_id;
        self.next_parked_id += 1;
        self.parked.push_back(ParkedSend {
            id,
            message,
            waiter,
        });
        id
    }

    /// Withdraw a parked send (its caller timed out). `false` when it was
    /// already admitted or failed.
    pub(crate) fn unpark(&mut self, id: u64) -> bool {
        let before = self.parked.len();
        self.parked.retain(|p| p.id != id);
        self.parked.len() != before
    }

    /// Move parked sends into freed slots, oldest first, and release their
    /// callers.
    pub(crate) fn admit_parked(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while self.window.has_room() {
            let Some(parked) = self.parked.pop_front() else {
                break;
            };
            match self.enqueue(parked.message) {
                Ok(mut f) => {
                    frames.append(&mut f);
                    let _ = parked.waiter.send(Ok(()));
                }
                Err(message) => {
                    self.parked.push_front(ParkedSend {
                        id: parked.id,
                        message,
                        waiter: parked.waiter,
                    });
                    break;
                }
            }
        }
        frames
    }

    /// Release every parked caller with `err`.
    pub(crate) fn fail_parked(&mut self, err: &Error) {
        for parked in self.parked.drain(..) {
            let _ = parked.waiter.send(Err(err.duplicate()));
        }
    }

    // ------------------------------------------------------------------------
    // Acks
    // ------------------------------------------------------------------------

    fn is_current(&self, flow_id: u32) -> bool {
        self.flow_id() == Some(flow_id)
    }

    pub(crate) fn on_ack(&mut self, flow_id: u32, seq: u64) -> Vec<Settled> {
        if !self.is_current(flow_id) {
            log::debug!("[publisher] ack for stale flow {} ignored", flow_id);
            return Vec::new();
        }
        match self.ack_mode {
            PublisherAckMode::Windowed => self.window.ack_cumulative(seq),
            PublisherAckMode::PerMessage => self.window.ack_one(seq).into_iter().collect(),
        }
    }

    pub(crate) fn on_reject(&mut self, flow_id: u32, seq: u64) -> Option<Settled> {
        if !self.is_current(flow_id) {
            return None;
        }
        self.window.reject(seq)
    }

    /// Ack timer expired: resend everything in flight.
    pub(crate) fn retransmit(&mut self) -> Vec<Frame> {
        match self.flow {
            FlowState::Up { flow_id } => {
                let messages = self.window.retransmit();
                if !messages.is_empty() {
                    log::debug!("[publisher] retransmitting {} message(s)", messages.len());
                }
                Self::publish_frames(flow_id, messages)
            }
            _ => Vec::new(),
        }
    }

    /// Hand every unsettled message back (GD `Disconnect` policy).
    pub(crate) fn take_unacked(&mut self) -> Vec<Message> {
        self.window.drain_unsettled()
    }

    /// Destroy: drop the window and fail blocked callers.
    pub(crate) fn discard(&mut self) {
        let dropped = self.window.drain_unsettled().len();
        if dropped > 0 {
            log::debug!("[publisher] discarding {} unacked message(s)", dropped);
        }
        self.fail_parked(&Error::Cancelled);
        self.flow = FlowState::Closed;
    }
}
