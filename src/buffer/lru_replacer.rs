use std::collections::{HashSet, VecDeque};

use parking_lot::Mutex;

use crate::common::FrameId;

struct LruState {
    /// Evictable frames, most recently unpinned at the front
    queue: VecDeque<FrameId>,
    /// Membership set for O(1) containment checks
    members: HashSet<FrameId>,
}

/// Least-recently-used replacement policy over buffer frames.
///
/// The replacer tracks exactly the frames whose pin count has dropped to
/// zero. A frame enters at the front of the queue when it is unpinned and
/// leaves either through `pin` (someone took it back) or through `victim`,
/// which removes the tail - the frame that has gone longest without being
/// re-pinned.
pub struct LruReplacer {
    state: Mutex<LruState>,
    capacity: usize,
}

impl LruReplacer {
    /// Creates a replacer able to track up to `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState {
                queue: VecDeque::with_capacity(capacity),
                members: HashSet::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Marks the frame evictable. A frame that is already tracked keeps its
    /// position; unpinning is not an access.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if state.members.contains(&frame_id) || state.queue.len() >= self.capacity {
            return;
        }
        state.queue.push_front(frame_id);
        state.members.insert(frame_id);
    }

    /// Removes the frame from the evictable set; no-op when untracked.
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        if !state.members.remove(&frame_id) {
            return;
        }
        if let Some(pos) = state.queue.iter().position(|&f| f == frame_id) {
            state.queue.remove(pos);
        }
    }

    /// Removes and returns the least recently used evictable frame, or None
    /// when nothing is evictable.
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state.queue.pop_back()?;
        state.members.remove(&frame_id);
        Some(frame_id)
    }

    /// Number of frames currently evictable.
    pub fn size(&self) -> usize {
        self.state.lock().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order_is_oldest_first() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_removes_from_tracking() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.pin(FrameId::new(0));

        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_untracked_is_noop() {
        let replacer = LruReplacer::new(10);
        replacer.pin(FrameId::new(7));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_repeated_unpin_keeps_position() {
        let replacer = LruReplacer::new(10);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(0));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_capacity_bound() {
        let replacer = LruReplacer::new(2);

        replacer.unpin(FrameId::new(0));
        replacer.unpin(FrameId::new(1));
        replacer.unpin(FrameId::new(2));

        assert_eq!(replacer.size(), 2);
    }
}
