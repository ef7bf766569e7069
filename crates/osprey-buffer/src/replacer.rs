//! Page replacement policies for the buffer pool.

use crate::frame::FrameId;
use parking_lot::Mutex;

/// Trait for page replacement algorithms.
///
/// The pool passes a predicate deciding whether a frame is currently a legal
/// victim (occupied and unpinned); the replacer only chooses among legal ones.
pub trait Replacer: Send + Sync {
    /// Records that the given frame was accessed.
    fn record_access(&self, frame_id: FrameId);

    /// Selects a victim frame for eviction.
    ///
    /// Returns None if no frame satisfies the predicate.
    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId>;

    /// Forgets any access history for a frame.
    fn remove(&self, frame_id: FrameId);

    /// Returns the total frame capacity.
    fn capacity(&self) -> usize;
}

/// Clock replacement algorithm implementation.
///
/// Maintains a circular sweep over frames with reference bits:
/// 1. If the frame under the hand is a legal victim with reference bit 0,
///    select it.
/// 2. If its reference bit is set, clear the bit and advance.
/// 3. Give up after two full rotations.
pub struct ClockReplacer {
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    reference_bits: Vec<bool>,
    clock_hand: usize,
}

impl ClockReplacer {
    /// Creates a new clock replacer with the given number of frames.
    pub fn new(num_frames: usize) -> Self {
        Self {
            inner: Mutex::new(ClockInner {
                reference_bits: vec![false; num_frames],
                clock_hand: 0,
            }),
        }
    }
}

impl Replacer for ClockReplacer {
    fn record_access(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if let Some(bit) = inner.reference_bits.get_mut(frame_id.0 as usize) {
            *bit = true;
        }
    }

    fn evict(&self, can_evict: &dyn Fn(FrameId) -> bool) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        let num_frames = inner.reference_bits.len();
        if num_frames == 0 {
            return None;
        }

        // Two full rotations: the first clears reference bits, the second
        // must then find any legal victim.
        for _ in 0..(2 * num_frames) {
            let hand = inner.clock_hand;
            inner.clock_hand = (hand + 1) % num_frames;

            let frame_id = FrameId(hand as u32);
            if !can_evict(frame_id) {
                continue;
            }

            if inner.reference_bits[hand] {
                inner.reference_bits[hand] = false;
            } else {
                return Some(frame_id);
            }
        }

        None
    }

    fn remove(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        if let Some(bit) = inner.reference_bits.get_mut(frame_id.0 as usize) {
            *bit = false;
        }
    }

    fn capacity(&self) -> usize {
        self.inner.lock().reference_bits.len()
    }
}
