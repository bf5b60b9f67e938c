//! The 256-slot future-event ring and its priority tie-break rule.
//!
//! The slot count is fixed at 256 because the ring index is a `u8` and the
//! reshuffle algorithm depends on free-running wraparound — do not
//! parameterize it.

use crate::device_class::{DeviceClass, EventArg};

const QUEUE_LEN: usize = 256;

/// One pending (or empty) event. The default/empty value is
/// `(LowPri, EventArg::None)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSlot {
    pub device: DeviceClass,
    pub arg: EventArg,
}

impl EventSlot {
    const EMPTY: EventSlot = EventSlot {
        device: DeviceClass::LowPri,
        arg: EventArg::None,
    };

    fn is_empty(&self) -> bool {
        self.device == DeviceClass::LowPri
    }
}

/// A fixed-capacity, priority-ordered, ring-indexed future-event queue.
///
/// Slot at logical offset `k` in the future lives at physical index
/// `(head + k) mod 256`. The slot at `head` itself is the just-consumed
/// slot, reset to empty after each pop.
pub struct EventQueue {
    slots: [EventSlot; QUEUE_LEN],
    head: u8,
}

impl EventQueue {
    pub const fn new() -> Self {
        EventQueue {
            slots: [EventSlot::EMPTY; QUEUE_LEN],
            head: 0,
        }
    }

    pub fn head(&self) -> u8 {
        self.head
    }

    /// Enqueue a future event at offset `delay` (`0 < delay < 255`) from the
    /// current head, reshuffling any colliding events per the priority
    /// tie-break rule.
    ///
    /// Behavior is undefined (caller contract, not checked here) if the
    /// queue's live-event count would exceed 255.
    pub fn schedule(&mut self, device: DeviceClass, arg: EventArg, delay: u8) {
        debug_assert!(delay > 0, "schedule: delay must be > 0");
        debug_assert!(delay < 255, "schedule: delay must be < 255");
        #[cfg(debug_assertions)]
        let count_before = self.live_count();

        let mut index = self.head.wrapping_add(delay);
        let mut incoming = EventSlot { device, arg };

        loop {
            while self.slots[index as usize].device <= incoming.device {
                index = index.wrapping_add(1);
            }
            let displaced = self.slots[index as usize];
            self.slots[index as usize] = incoming;
            incoming = displaced;
            if incoming.device == DeviceClass::LowPri {
                break;
            }
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.live_count(),
            count_before + 1,
            "schedule must increase the live-event count by exactly one"
        );
    }

    /// Advance `head` by one and return the event now sitting there,
    /// resetting that slot to empty. Called by the dispatcher's device
    /// phase; the clock phase never calls this.
    pub fn pop_current(&mut self) -> (DeviceClass, EventArg) {
        self.head = self.head.wrapping_add(1);
        let slot = self.slots[self.head as usize];
        self.slots[self.head as usize] = EventSlot::EMPTY;
        (slot.device, slot.arg)
    }

    /// Count of non-sentinel slots currently booked. Used by the debug-only
    /// invariant check in `schedule` and exercised directly by tests.
    #[cfg(any(debug_assertions, test))]
    fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_class::DeviceClass::*;

    #[test]
    fn schedule_then_pop_one_tick_later() {
        let mut q = EventQueue::new();
        q.schedule(Disk, EventArg::Unit(1), 1);
        assert_eq!(q.pop_current(), (Disk, EventArg::Unit(1)));
        assert_eq!(q.pop_current(), (LowPri, EventArg::None));
    }

    #[test]
    fn higher_priority_bumps_lower_to_next_tick() {
        // DISK then ALARM scheduled at the same delay: ALARM outranks DISK,
        // so it keeps the earlier tick and DISK is bumped one tick later.
        let mut q = EventQueue::new();
        q.schedule(Disk, EventArg::Unit(9), 1);
        q.schedule(Alarm, EventArg::Unit(8), 1);
        assert_eq!(q.pop_current(), (Alarm, EventArg::Unit(8)));
        assert_eq!(q.pop_current(), (Disk, EventArg::Unit(9)));
    }

    #[test]
    fn same_class_same_delay_lands_on_consecutive_ticks_in_order() {
        // Three same-class events scheduled at the same delay spread out
        // onto consecutive ticks, preserving submission order.
        let mut q = EventQueue::new();
        q.schedule(Disk, EventArg::Unit(0), 1);
        q.schedule(Disk, EventArg::Unit(1), 1);
        q.schedule(Disk, EventArg::Unit(2), 1);
        assert_eq!(q.pop_current(), (Disk, EventArg::Unit(0)));
        assert_eq!(q.pop_current(), (Disk, EventArg::Unit(1)));
        assert_eq!(q.pop_current(), (Disk, EventArg::Unit(2)));
    }

    #[test]
    fn schedule_preserves_live_event_count() {
        let mut q = EventQueue::new();
        assert_eq!(q.live_count(), 0);
        q.schedule(Disk, EventArg::Unit(0), 5);
        assert_eq!(q.live_count(), 1);
        q.schedule(Alarm, EventArg::Unit(1), 5);
        assert_eq!(q.live_count(), 2);
        q.schedule(Term, EventArg::Unit(2), 5);
        assert_eq!(q.live_count(), 3);
    }

    #[test]
    fn wraps_around_the_ring() {
        let mut q = EventQueue::new();
        // head starts at 0; schedule near the end of the ring and pop
        // through the wraparound.
        q.schedule(Disk, EventArg::Unit(7), 254);
        for _ in 0..253 {
            assert_eq!(q.pop_current(), (LowPri, EventArg::None));
        }
        assert_eq!(q.pop_current(), (Disk, EventArg::Unit(7)));
    }
}
