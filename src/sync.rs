use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::hci::SocketId;

/// A boolean written from the interrupt path and polled from the main flow.
pub struct StatusFlag {
    state: AtomicBool,
}
impl StatusFlag {
    pub const fn new() -> Self {
        Self {
            state: AtomicBool::new(false),
        }
    }
    pub fn set(&self) {
        self.state.store(true, Ordering::Release);
    }
    pub fn clear(&self) {
        self.state.store(false, Ordering::Release);
    }
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire)
    }
}

/// A fixed-size set of socket handles, which can be filled from interrupt context.
///
/// Every handle maps to one bit of a single atomic word, so no locking is required. Handles,
/// that don't fit into the word are ignored.
pub struct SocketSet {
    members: AtomicU32,
}
impl SocketSet {
    /// The amount of handles, that can be tracked.
    pub const CAPACITY: usize = u32::BITS as usize;

    pub const fn new() -> Self {
        Self {
            members: AtomicU32::new(0),
        }
    }
    const fn mask(socket: SocketId) -> Option<u32> {
        if (socket.0 as usize) < Self::CAPACITY {
            Some(1 << socket.0)
        } else {
            None
        }
    }
    /// Add a handle to the set.
    ///
    /// Returns `false`, if the handle is out of range and was therefore ignored.
    pub fn insert(&self, socket: SocketId) -> bool {
        let Some(mask) = Self::mask(socket) else {
            return false;
        };
        self.members.fetch_or(mask, Ordering::AcqRel);
        true
    }
    /// Remove a handle from the set.
    pub fn remove(&self, socket: SocketId) {
        if let Some(mask) = Self::mask(socket) {
            self.members.fetch_and(!mask, Ordering::AcqRel);
        }
    }
    pub fn contains(&self, socket: SocketId) -> bool {
        Self::mask(socket).is_some_and(|mask| self.members.load(Ordering::Acquire) & mask != 0)
    }
    /// Returns the raw membership bitmap.
    pub fn bits(&self) -> u32 {
        self.members.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_handles_are_ignored() {
        let set = SocketSet::new();
        assert!(!set.insert(SocketId(32)));
        assert!(!set.insert(SocketId(200)));
        assert_eq!(set.bits(), 0);
        assert!(!set.contains(SocketId(32)));
    }

    #[test]
    fn insert_and_remove() {
        let set = SocketSet::new();
        assert!(set.insert(SocketId(0)));
        assert!(set.insert(SocketId(31)));
        assert!(set.contains(SocketId(0)));
        assert!(set.contains(SocketId(31)));
        assert!(!set.contains(SocketId(7)));

        set.remove(SocketId(0));
        assert!(!set.contains(SocketId(0)));
        assert_eq!(set.bits(), 1 << 31);
    }

    #[test]
    fn flag_transitions() {
        let flag = StatusFlag::new();
        assert!(!flag.is_set());
        flag.set();
        flag.set();
        assert!(flag.is_set());
        flag.clear();
        assert!(!flag.is_set());
    }
}
