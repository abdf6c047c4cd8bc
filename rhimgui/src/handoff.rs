//! Snapshot ownership transfer between the producing and recording contexts.
//!
//! The UI-producing context (where [`capture_frame`] runs) and the
//! render-recording context (where the cache and recorder live) may be the
//! same thread or different threads. Either way, a snapshot moves across
//! exactly once: the producer publishes it, the consumer takes it, and
//! neither side can reach the other's copy because there is none. The slot
//! holds at most one snapshot; there is no queue.
//!
//! The handoff relies on the host's synchronization barrier: the producing
//! context must be quiesced while the consumer adopts a snapshot (the scene
//! graph's sync phase). The mutex below makes the transfer itself safe even
//! without that barrier, but ordering between input processing and capture
//! remains the host's contract.
//!
//! [`capture_frame`]: crate::capture::UiContext::capture_frame

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::snapshot::FrameSnapshot;

struct Slot {
    snapshot: Mutex<Option<FrameSnapshot>>,
}

/// Creates the two halves of a snapshot handoff.
pub struct SnapshotHandoff;

impl SnapshotHandoff {
    pub fn channel() -> (SnapshotProducer, SnapshotConsumer) {
        let slot = Arc::new(Slot {
            snapshot: Mutex::new(None),
        });
        (
            SnapshotProducer { slot: slot.clone() },
            SnapshotConsumer { slot },
        )
    }
}

/// Producing-context half. Owns snapshots until they are published.
pub struct SnapshotProducer {
    slot: Arc<Slot>,
}

impl SnapshotProducer {
    /// Publishes a snapshot for the recording context.
    ///
    /// If the previous snapshot was never consumed it is displaced and
    /// returned, so the caller decides what a missed frame means; nothing
    /// is dropped silently. Under the host's sync contract the slot is
    /// always empty here.
    pub fn publish(&self, snapshot: FrameSnapshot) -> Option<FrameSnapshot> {
        let displaced = self.slot.snapshot.lock().replace(snapshot);
        if displaced.is_some() {
            debug!("snapshot published before the previous one was consumed");
        }
        displaced
    }
}

/// Recording-context half.
pub struct SnapshotConsumer {
    slot: Arc<Slot>,
}

impl SnapshotConsumer {
    /// Takes the pending snapshot, transferring ownership to the recording
    /// context. Returns `None` when no new frame was produced since the
    /// last take.
    pub fn take(&self) -> Option<FrameSnapshot> {
        self.slot.snapshot.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use glam::Mat4;
    use smallvec::SmallVec;

    use super::*;

    fn snapshot(marker: u32) -> FrameSnapshot {
        FrameSnapshot {
            total_vbuf_size: marker,
            total_ibuf_size: 0,
            vbuf: SmallVec::new(),
            ibuf: SmallVec::new(),
            draws: Vec::new(),
            output_pixel_size: [0, 0],
            projection: Mat4::IDENTITY,
            font_atlas: None,
        }
    }

    #[test]
    fn snapshot_moves_across_exactly_once() {
        let (producer, consumer) = SnapshotHandoff::channel();
        assert!(producer.publish(snapshot(1)).is_none());

        let taken = match consumer.take() {
            Some(snapshot) => snapshot,
            None => panic!("published snapshot missing"),
        };
        assert_eq!(taken.total_vbuf_size, 1);
        assert!(consumer.take().is_none());
    }

    #[test]
    fn unconsumed_snapshot_is_displaced_not_queued() {
        let (producer, consumer) = SnapshotHandoff::channel();
        assert!(producer.publish(snapshot(1)).is_none());
        let displaced = match producer.publish(snapshot(2)) {
            Some(snapshot) => snapshot,
            None => panic!("expected the first snapshot back"),
        };
        assert_eq!(displaced.total_vbuf_size, 1);

        // Only the latest frame is in flight.
        assert_eq!(consumer.take().map(|s| s.total_vbuf_size), Some(2));
    }

    #[test]
    fn handoff_works_across_threads() {
        let (producer, consumer) = SnapshotHandoff::channel();
        let worker = std::thread::spawn(move || {
            producer.publish(snapshot(7));
        });
        worker.join().expect("producer thread panicked");
        assert_eq!(consumer.take().map(|s| s.total_vbuf_size), Some(7));
    }
}
