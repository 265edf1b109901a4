//! Single-slot hand-off between the producer thread and the renderer.
//!
//! The slot is a crossbeam channel of capacity one. Publishing into a full
//! slot replaces the unread frame instead of queueing behind it, so the
//! renderer always sees the latest state and memory stays bounded however far
//! it falls behind. Event transitions are the exception: those of a replaced
//! frame are carried into its replacement, up to [`MAX_PENDING_TRANSITIONS`].

use crate::collector::types::EventTransition;
use crate::core::pipeline::Throughput;
use crate::core::series::SeriesSnapshot;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

/// Upper bound on transitions held for a renderer that is not polling.
pub const MAX_PENDING_TRANSITIONS: usize = 1_024;

/// Everything the renderer needs for one update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub snapshot: SeriesSnapshot,
    /// Transitions since the previous frame the renderer took, oldest first
    pub transitions: Vec<EventTransition>,
    pub throughput: Throughput,
    /// Transitions discarded because the pending list was full
    pub dropped_transitions: u64,
}

impl Frame {
    pub fn new(
        snapshot: SeriesSnapshot,
        transitions: Vec<EventTransition>,
        throughput: Throughput,
    ) -> Self {
        Self {
            snapshot,
            transitions,
            throughput,
            dropped_transitions: 0,
        }
    }

    /// Take over the unread transitions of a frame this one replaces.
    fn absorb_older(&mut self, older: Frame) {
        let mut merged = older.transitions;
        merged.append(&mut self.transitions);

        if merged.len() > MAX_PENDING_TRANSITIONS {
            let excess = merged.len() - MAX_PENDING_TRANSITIONS;
            merged.drain(..excess);
            self.dropped_transitions += excess as u64;
            warn!(dropped = excess, "Renderer behind, oldest event transitions discarded");
        }

        self.dropped_transitions += older.dropped_transitions;
        self.transitions = merged;
    }
}

/// Latest-frame cell shared by one producer and one consumer.
#[derive(Debug, Clone)]
pub struct FrameSlot {
    sender: Sender<Frame>,
    receiver: Receiver<Frame>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// Store `frame`, replacing any frame the consumer has not taken yet.
    pub fn publish(&self, frame: Frame) {
        let mut frame = frame;
        loop {
            match self.sender.try_send(frame) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    frame = rejected;
                    // The consumer may win the race for the old frame; then
                    // the next attempt finds the slot empty.
                    if let Ok(older) = self.receiver.try_recv() {
                        frame.absorb_older(older);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Take the pending frame, if any. Clears the slot.
    pub fn take(&self) -> Option<Frame> {
        self.receiver.try_recv().ok()
    }

    /// True when a frame is waiting to be taken.
    pub fn is_dirty(&self) -> bool {
        !self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{Edge, EventKind};

    fn transition(timestamp: f64) -> EventTransition {
        EventTransition {
            kind: EventKind::Brake,
            edge: Edge::Rising,
            timestamp,
            triggering_value: -9000.0,
        }
    }

    fn frame(occupancy: usize, transitions: Vec<EventTransition>) -> Frame {
        Frame::new(
            SeriesSnapshot::default(),
            transitions,
            Throughput {
                samples_per_second: 0,
                buffer_occupancy: occupancy,
                buffer_capacity: 300,
            },
        )
    }

    #[test]
    fn test_many_publishes_yield_one_frame() {
        let slot = FrameSlot::new();
        assert!(!slot.is_dirty());

        for i in 0..50 {
            slot.publish(frame(i, Vec::new()));
        }

        assert!(slot.is_dirty());
        let latest = slot.take().expect("pending frame");
        assert_eq!(latest.throughput.buffer_occupancy, 49);
        assert!(slot.take().is_none());
        assert!(!slot.is_dirty());
    }

    #[test]
    fn test_replaced_frames_keep_their_transitions() {
        let slot = FrameSlot::new();
        slot.publish(frame(1, vec![transition(1.0)]));
        slot.publish(frame(2, Vec::new()));
        slot.publish(frame(3, vec![transition(3.0)]));

        let latest = slot.take().unwrap();
        assert_eq!(latest.throughput.buffer_occupancy, 3);
        let times: Vec<f64> = latest.transitions.iter().map(|t| t.timestamp).collect();
        assert_eq!(times, vec![1.0, 3.0]);
        assert_eq!(latest.dropped_transitions, 0);
    }

    #[test]
    fn test_pending_transitions_are_bounded() {
        let slot = FrameSlot::new();
        for i in 0..(MAX_PENDING_TRANSITIONS + 10) {
            slot.publish(frame(i, vec![transition(i as f64)]));
        }

        let latest = slot.take().unwrap();
        assert_eq!(latest.transitions.len(), MAX_PENDING_TRANSITIONS);
        assert_eq!(latest.dropped_transitions, 10);
        assert_eq!(latest.transitions[0].timestamp, 10.0);
    }

    #[test]
    fn test_slot_is_shared_across_threads() {
        let slot = FrameSlot::new();
        let producer = slot.clone();

        let handle = std::thread::spawn(move || {
            for i in 0..1_000 {
                producer.publish(frame(i, Vec::new()));
            }
        });
        handle.join().unwrap();

        assert_eq!(slot.take().unwrap().throughput.buffer_occupancy, 999);
        assert!(slot.take().is_none());
    }
}
