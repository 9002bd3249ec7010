use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::storage::page::FrameId;

/// Replacer tracks page usage for replacement in case of buffer pool is full.
pub trait Replacer: Send + Sync {
    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    fn record_access(&self, frame_id: FrameId);

    /// Find the frame to evict under the replacement policy. Only frames that
    /// are marked as evictable are candidates for eviction.
    ///
    /// Successful eviction of a frame should decrement the size of replacer and
    /// remove the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no frames
    /// can be evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. this function also
    /// control replacer size. Note that size is equal to number of evictable entries.
    ///
    /// If a frame was previously evictable and is to be set to non-evictable, then
    /// size should decrement. If a frame was previously non-evictable and is to be
    /// set evictable, then size should increment.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Check if a frame is evictable. if the frame is not tracked, return false.
    fn is_evictable(&self, frame_id: FrameId) -> bool;

    /// Remove a frame from replacer, along with its access history, no matter
    /// where the frame sits in the eviction order. This function should also
    /// decrement the replacer size if removal is successful.
    ///
    /// Removing a non-evictable frame is a caller bug and panics. If the
    /// specified frame is not found, do nothing.
    fn remove(&self, frame_id: FrameId);

    /// replacer size, the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRUKReplacer implements the LRU-k replacement policy with two queues.
///
/// Frames with fewer than k recorded accesses sit in the history queue, which
/// is FIFO on the first access: the frame whose first access is oldest goes
/// first. Frames with k or more accesses sit in the cache queue, plain LRU on
/// the most recent access. Victims are taken from the history queue before
/// the cache queue, so a frame touched fewer than k times never outlives one
/// that earned its k accesses.
pub struct LRUKReplacer {
    k: usize,
    replacer_size: usize,
    current_size: usize,
    access_count: HashMap<FrameId, usize>,
    evictable: HashMap<FrameId, bool>,
    /// frames with access_count < k, most recent first access at the front.
    history_queue: VecDeque<FrameId>,
    /// frames with access_count >= k, most recently used at the front.
    cache_queue: VecDeque<FrameId>,
}

impl LRUKReplacer {
    pub fn new(k: usize, size: usize) -> Self {
        assert!(k > 0, "replacer k should be larger than zero");
        LRUKReplacer {
            k,
            replacer_size: size,
            current_size: 0,
            access_count: HashMap::new(),
            evictable: HashMap::new(),
            history_queue: VecDeque::new(),
            cache_queue: VecDeque::new(),
        }
    }

    /// Record the event that the given frame id is accessed at current timestamp.
    /// Create a new entry for access history if frame id has not been seen before.
    ///
    /// The access that brings the count to k promotes the frame from the history
    /// queue to the cache queue; later accesses only refresh its LRU position.
    fn record_access(&mut self, frame_id: FrameId) {
        assert!(frame_id < self.replacer_size, "frame id {} out of range", frame_id);

        self.evictable.entry(frame_id).or_insert(false);
        let count = self.access_count.entry(frame_id).or_insert(0);
        // saturate once warm so a hot frame cannot overflow the counter
        *count = (*count + 1).min(self.k + 1);
        let count = *count;

        if count < self.k {
            if !self.history_queue.contains(&frame_id) {
                self.history_queue.push_front(frame_id);
            }
        } else if count == self.k {
            remove_from(&mut self.history_queue, frame_id);
            self.cache_queue.push_front(frame_id);
        } else {
            remove_from(&mut self.cache_queue, frame_id);
            self.cache_queue.push_front(frame_id);
        }
    }

    /// Find the frame to evict: scan the history queue from the back (oldest
    /// first access) for an evictable frame, then the cache queue from the
    /// back (least recently used). Eviction drops the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no
    /// frames can be evicted.
    fn evict(&mut self) -> Option<FrameId> {
        if self.current_size == 0 {
            return None;
        }

        let evictable = &self.evictable;
        if let Some(pos) = self.history_queue.iter().rposition(|f| evictable[f]) {
            let frame_id = self.history_queue.remove(pos).unwrap();
            self.drop_state(frame_id);
            return Some(frame_id);
        }
        if let Some(pos) = self.cache_queue.iter().rposition(|f| evictable[f]) {
            let frame_id = self.cache_queue.remove(pos).unwrap();
            self.drop_state(frame_id);
            return Some(frame_id);
        }
        None
    }

    /// Toggle whether a frame is evictable or non-evictable. this function also
    /// control replacer size. Note that size is equal to number of evictable entries.
    ///
    /// For a frame the replacer does not track, or a toggle to the state the
    /// frame is already in, this function terminates without modifying anything.
    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        assert!(frame_id < self.replacer_size, "frame id {} out of range", frame_id);

        let flag = self.evictable.get_mut(&frame_id);
        if flag.is_none() {
            return;
        }
        let flag = flag.unwrap();
        if *flag == evictable {
            return;
        }

        *flag = evictable;
        if evictable {
            self.current_size += 1;
        } else {
            self.current_size -= 1;
        }
    }

    /// Check if a frame is evictable. if the frame is not tracked, return false.
    fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.evictable.get(&frame_id).copied().unwrap_or(false)
    }

    /// Remove a frame from the replacer, along with its access history.
    ///
    /// Note that this is different from evicting a frame, which always removes
    /// the victim the policy picks. This function removes the specified frame,
    /// no matter where it sits in the eviction order.
    ///
    /// Removing a non-evictable frame is a caller bug and panics. If the frame
    /// is not found, do nothing.
    fn remove(&mut self, frame_id: FrameId) {
        assert!(frame_id < self.replacer_size, "frame id {} out of range", frame_id);

        let count = match self.access_count.get(&frame_id) {
            None => return,
            Some(count) => *count,
        };
        assert!(
            self.is_evictable(frame_id),
            "remove of non-evictable frame {}",
            frame_id
        );

        if count < self.k {
            remove_from(&mut self.history_queue, frame_id);
        } else {
            remove_from(&mut self.cache_queue, frame_id);
        }
        self.drop_state(frame_id);
    }

    fn size(&self) -> usize {
        self.current_size
    }

    /// Clear the frame's access count and evictable bit. The caller has
    /// already unlinked the frame from its queue.
    fn drop_state(&mut self, frame_id: FrameId) {
        self.access_count.remove(&frame_id);
        self.evictable.remove(&frame_id);
        self.current_size -= 1;
    }
}

fn remove_from(queue: &mut VecDeque<FrameId>, frame_id: FrameId) {
    if let Some(pos) = queue.iter().position(|&f| f == frame_id) {
        queue.remove(pos);
    }
}

/// SyncLRUKReplacer implements the thread-safe version of LRU-k replacement policy,
/// basically all the heavy lifting are happens in the LRUKReplacer.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(k: usize, size: usize) -> Self {
        let inner = Mutex::new(LRUKReplacer::new(k, size));
        SyncLRUKReplacer { inner }
    }
}

impl Replacer for SyncLRUKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock().unwrap();
        guard.record_access(frame_id)
    }

    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock().unwrap();
        guard.evict()
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.inner.lock().unwrap();
        guard.set_evictable(frame_id, evictable)
    }

    fn is_evictable(&self, frame_id: FrameId) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.is_evictable(frame_id)
    }

    fn remove(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(frame_id)
    }

    fn size(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_is_fifo_on_first_access() {
        let mut replacer = LRUKReplacer::new(2, 4);

        // one access each: all in history, eviction follows first-access order
        replacer.record_access(0);
        replacer.record_access(1);
        replacer.record_access(2);
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);
        replacer.set_evictable(2, true);

        // a second access within history does not reorder anything
        replacer.record_access(0);
        // 0 is warm now, so the cold 1 and 2 still go first
        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(0), replacer.evict());
        assert_eq!(None, replacer.evict());
    }

    #[test]
    fn test_cold_frames_evicted_before_warm() {
        let mut replacer = LRUKReplacer::new(2, 4);

        // frame 0 earns its k accesses, frame 1 stays in history
        replacer.record_access(0);
        replacer.record_access(0);
        replacer.record_access(1);
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);

        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(0), replacer.evict());
    }

    #[test]
    fn test_cache_queue_is_lru() {
        let mut replacer = LRUKReplacer::new(2, 4);

        for frame_id in [0, 1, 2] {
            replacer.record_access(frame_id);
            replacer.record_access(frame_id);
            replacer.set_evictable(frame_id, true);
        }
        // refresh frame 0, making frame 1 the least recently used
        replacer.record_access(0);

        assert_eq!(Some(1), replacer.evict());
        assert_eq!(Some(2), replacer.evict());
        assert_eq!(Some(0), replacer.evict());
    }

    #[test]
    fn test_lruk_replacer() {
        let mut lru_replacer = LRUKReplacer::new(2, 7);

        // Scenario: add six elements to the replacer. We have [1,2,3,4,5]. Frame 6 is non-evictable.
        lru_replacer.record_access(1);
        lru_replacer.record_access(2);
        lru_replacer.record_access(3);
        lru_replacer.record_access(4);
        lru_replacer.record_access(5);
        lru_replacer.record_access(6);
        lru_replacer.set_evictable(1, true);
        lru_replacer.set_evictable(2, true);
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        lru_replacer.set_evictable(5, true);
        lru_replacer.set_evictable(6, false);
        assert_eq!(5, lru_replacer.size());

        // Scenario: Insert access history for frame 1. Now frame 1 has two access histories.
        // All other frames are still cold. The order of eviction is [2,3,4,5,1].
        lru_replacer.record_access(1);

        // Scenario: Evict three pages from the replacer. The cold frames should be popped
        // first, oldest first access first.
        assert_eq!(Some(2), lru_replacer.evict());
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(Some(4), lru_replacer.evict());
        assert_eq!(2, lru_replacer.size());

        // Scenario: Now replacer has frames [5,1].
        // Insert new frames 3, 4, and update access history for 5. We should end with [3,1,5,4]
        lru_replacer.record_access(3);
        lru_replacer.record_access(4);
        lru_replacer.record_access(5);
        lru_replacer.record_access(4);
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        assert_eq!(4, lru_replacer.size());

        // Scenario: continue looking for victims. We expect 3 to be evicted next.
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size());

        // Set 6 to be evictable. 6 Should be evicted next since it is the coldest frame.
        lru_replacer.set_evictable(6, true);
        assert_eq!(4, lru_replacer.size());
        assert_eq!(Some(6), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size());

        // Now we have [1,5,4]. Continue looking for victims.
        lru_replacer.set_evictable(1, false);
        assert_eq!(2, lru_replacer.size());
        assert_eq!(Some(5), lru_replacer.evict());
        assert_eq!(1, lru_replacer.size());

        // Update access history for 1. Now we have [4,1]. Next victim is 4.
        lru_replacer.record_access(1);
        lru_replacer.record_access(1);
        lru_replacer.set_evictable(1, true);
        assert_eq!(2, lru_replacer.size());
        assert_eq!(Some(4), lru_replacer.evict());

        assert_eq!(1, lru_replacer.size());
        assert_eq!(Some(1), lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());

        // These operations should not modify size
        assert_eq!(None, lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());
        lru_replacer.remove(1);
        assert_eq!(0, lru_replacer.size());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_record_access_out_of_range() {
        let mut replacer = LRUKReplacer::new(2, 7);
        replacer.record_access(7);
    }

    #[test]
    #[should_panic(expected = "non-evictable")]
    fn test_remove_non_evictable() {
        let mut replacer = LRUKReplacer::new(2, 7);
        replacer.record_access(1);
        replacer.remove(1);
    }

    #[test]
    fn test_remove_unlinks_frame() {
        let mut replacer = LRUKReplacer::new(2, 4);
        replacer.record_access(0);
        replacer.record_access(1);
        replacer.set_evictable(0, true);
        replacer.set_evictable(1, true);
        assert_eq!(2, replacer.size());

        replacer.remove(1);
        assert_eq!(1, replacer.size());
        assert_eq!(Some(0), replacer.evict());
        assert_eq!(None, replacer.evict());
    }
}
