//! Discrete-event scheduler owning the virtual clock.
//!
//! Events live in a slab and are addressed by a stable [`EventId`]. A
//! reusable event (see [`EventScheduler::create`]) can be rescheduled any
//! number of times after it fired, which is how the MAC layer drives its
//! channel probe and end-of-transmission timers without reallocating.
//! One-shot events (see [`EventScheduler::schedule_once`]) release their
//! slot as soon as they fire.
//!
//! ## Ordering contract
//!
//! Pending events are ordered by `(time, sequence)`. Reusable events carry
//! sequence `0`; one-shot events draw a fresh, monotonically increasing
//! sequence. Events equal on both keys fire in insertion order, so the
//! firing order is fully determined by the insertion order.

use std::collections::BTreeMap;

/// Virtual time in simulator ticks.
pub type SimTime = u64;

/// Number of ticks in one simulated second.
pub const ONE_SECOND: SimTime = 40_000;

/// Stable handle to an event slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(usize);

/// Key for ordering pending events.
///
/// The insertion counter is not part of the public event identity, it
/// only exists to keep exact ties stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    time: SimTime,
    sequence: u64,
    insertion: u64,
}

struct EventSlot<A> {
    time: SimTime,
    sequence: u64,
    action: A,
    reusable: bool,
    /// Key under which the event sits in the pending set, if scheduled.
    pending_key: Option<EventKey>,
}

/// An event handed out by [`EventScheduler::pop_next`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredEvent<A> {
    pub id: EventId,
    pub time: SimTime,
    pub action: A,
}

/// Ordered pending-event set plus the virtual clock.
pub struct EventScheduler<A> {
    now: SimTime,
    pending: BTreeMap<EventKey, EventId>,
    slots: Vec<Option<EventSlot<A>>>,
    free_slots: Vec<usize>,
    next_sequence: u64,
    next_insertion: u64,
}

impl<A: Clone> Default for EventScheduler<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Clone> EventScheduler<A> {
    pub fn new() -> Self {
        Self {
            now: 0,
            pending: BTreeMap::new(),
            slots: Vec::new(),
            free_slots: Vec::new(),
            // Sequence 0 is reserved for reusable events.
            next_sequence: 1,
            next_insertion: 0,
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Time of the next pending event, if any.
    pub fn peek_time(&self) -> Option<SimTime> {
        self.pending.keys().next().map(|key| key.time)
    }

    /// Create a reusable event that is not yet scheduled.
    ///
    /// The slot is never released; schedule it with [`EventScheduler::schedule`]
    /// as often as needed, one pending instance at a time.
    pub fn create(&mut self, action: A) -> EventId {
        self.allocate(EventSlot {
            time: 0,
            sequence: 0,
            action,
            reusable: true,
            pending_key: None,
        })
    }

    /// Create a one-shot event at `time` and schedule it right away.
    pub fn schedule_once(&mut self, time: SimTime, action: A) -> EventId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let id = self.allocate(EventSlot {
            time,
            sequence,
            action,
            reusable: false,
            pending_key: None,
        });
        self.schedule(id, time);
        id
    }

    /// Submit an event to the pending set at `time`.
    ///
    /// # Panics
    ///
    /// Panics if the event is unknown or already pending. Both mean the
    /// caller lost track of its own timers.
    pub fn schedule(&mut self, id: EventId, time: SimTime) {
        if time < self.now {
            log::warn!("Event {:?} scheduled in the past: {} < {}", id, time, self.now);
        }
        let insertion = self.next_insertion;
        self.next_insertion += 1;

        let slot = self.slot_mut(id);
        assert!(slot.pending_key.is_none(), "event {id:?} is already scheduled");
        slot.time = time;
        let key = EventKey {
            time,
            sequence: slot.sequence,
            insertion,
        };
        slot.pending_key = Some(key);
        self.pending.insert(key, id);
    }

    /// Whether the event currently sits in the pending set.
    pub fn is_scheduled(&self, id: EventId) -> bool {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .is_some_and(|slot| slot.pending_key.is_some())
    }

    /// Scheduled (or last scheduled) time of an event.
    pub fn time_of(&self, id: EventId) -> Option<SimTime> {
        self.slots.get(id.0).and_then(Option::as_ref).map(|slot| slot.time)
    }

    /// Remove the minimum pending event and advance the clock to its time.
    ///
    /// One-shot events give their slot back here; reusable events stay
    /// allocated and may be rescheduled by the handler.
    pub fn pop_next(&mut self) -> Option<FiredEvent<A>> {
        let (_, id) = self.pending.pop_first()?;
        let slot = self.slots[id.0].as_mut().expect("pending event without a slot");
        slot.pending_key = None;
        let time = slot.time;
        let action = slot.action.clone();
        if !slot.reusable {
            self.slots[id.0] = None;
            self.free_slots.push(id.0);
        }
        self.now = time;
        Some(FiredEvent { id, time, action })
    }

    /// Remove `id` from the pending set without firing it.
    ///
    /// Only the head of the pending set may be removed.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not the current head.
    pub fn remove_head(&mut self, id: EventId) {
        let head = self.pending.first_key_value().map(|(_, head)| *head);
        assert_eq!(head, Some(id), "only the head event can be removed");
        self.pending.pop_first();
        let slot = self.slot_mut(id);
        slot.pending_key = None;
        if !slot.reusable {
            self.slots[id.0] = None;
            self.free_slots.push(id.0);
        }
    }

    /// Move the clock forward to `time` without firing anything.
    ///
    /// Used when a bounded run ends before the next event. The clock never
    /// moves backwards and never passes a pending event.
    pub fn advance_to(&mut self, time: SimTime) {
        if let Some(head) = self.peek_time() {
            assert!(time <= head, "cannot advance past pending event at {head}");
        }
        self.now = self.now.max(time);
    }

    fn allocate(&mut self, slot: EventSlot<A>) -> EventId {
        match self.free_slots.pop() {
            Some(index) => {
                self.slots[index] = Some(slot);
                EventId(index)
            }
            None => {
                self.slots.push(Some(slot));
                EventId(self.slots.len() - 1)
            }
        }
    }

    fn slot_mut(&mut self, id: EventId) -> &mut EventSlot<A> {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(slot) => slot,
            None => panic!("unknown event {id:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(scheduler: &mut EventScheduler<u32>) -> Vec<(SimTime, u32)> {
        let mut fired = Vec::new();
        while let Some(event) = scheduler.pop_next() {
            fired.push((event.time, event.action));
        }
        fired
    }

    #[test]
    fn distinct_times_fire_in_ascending_order() {
        let mut scheduler = EventScheduler::new();
        scheduler.schedule_once(300, 3);
        scheduler.schedule_once(100, 1);
        scheduler.schedule_once(200, 2);
        assert_eq!(drain(&mut scheduler), vec![(100, 1), (200, 2), (300, 3)]);
        assert_eq!(scheduler.now(), 300);
    }

    #[test]
    fn equal_keys_fire_in_enqueue_order() {
        let mut scheduler = EventScheduler::new();
        // Reusable events share sequence 0, so only insertion order separates them.
        let first = scheduler.create(1);
        let second = scheduler.create(2);
        scheduler.schedule(first, 100);
        scheduler.schedule(second, 100);
        assert_eq!(drain(&mut scheduler), vec![(100, 1), (100, 2)]);

        scheduler.schedule(second, 150);
        scheduler.schedule(first, 150);
        assert_eq!(drain(&mut scheduler), vec![(150, 2), (150, 1)]);
    }

    #[test]
    fn sequence_breaks_ties_before_insertion() {
        let mut scheduler = EventScheduler::new();
        scheduler.schedule_once(50, 7);
        let reusable = scheduler.create(9);
        scheduler.schedule(reusable, 50);
        // The reusable event has sequence 0 and wins the tie.
        assert_eq!(drain(&mut scheduler), vec![(50, 9), (50, 7)]);
    }

    #[test]
    fn reusable_event_can_be_rescheduled_after_firing() {
        let mut scheduler = EventScheduler::new();
        let tick = scheduler.create(1);
        scheduler.schedule(tick, 10);
        let fired = scheduler.pop_next().unwrap();
        assert_eq!(fired.id, tick);
        assert!(!scheduler.is_scheduled(tick));
        scheduler.schedule(tick, fired.time + 10);
        assert_eq!(scheduler.peek_time(), Some(20));
        assert_eq!(scheduler.time_of(tick), Some(20));
    }

    #[test]
    fn one_shot_slots_are_recycled() {
        let mut scheduler = EventScheduler::new();
        let first = scheduler.schedule_once(1, 1);
        scheduler.pop_next();
        let second = scheduler.schedule_once(2, 2);
        assert_eq!(first, second);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already scheduled")]
    fn double_enqueue_is_fatal() {
        let mut scheduler = EventScheduler::new();
        let event = scheduler.create(1);
        scheduler.schedule(event, 5);
        scheduler.schedule(event, 6);
    }

    #[test]
    fn head_can_be_removed() {
        let mut scheduler = EventScheduler::new();
        let head = scheduler.schedule_once(5, 1);
        scheduler.schedule_once(6, 2);
        scheduler.remove_head(head);
        assert_eq!(drain(&mut scheduler), vec![(6, 2)]);
    }

    #[test]
    #[should_panic(expected = "only the head event can be removed")]
    fn removing_a_non_head_event_is_fatal() {
        let mut scheduler = EventScheduler::new();
        scheduler.schedule_once(5, 1);
        let tail = scheduler.schedule_once(6, 2);
        scheduler.remove_head(tail);
    }

    proptest! {
        #[test]
        fn firing_order_is_time_then_insertion(times in proptest::collection::vec(0u64..50, 1..64)) {
            let mut scheduler = EventScheduler::new();
            let ids: Vec<EventId> = (0..times.len()).map(|i| scheduler.create(i as u32)).collect();
            for (id, time) in ids.iter().zip(&times) {
                scheduler.schedule(*id, *time);
            }
            let fired: Vec<u32> = drain(&mut scheduler).into_iter().map(|(_, action)| action).collect();

            let mut expected: Vec<u32> = (0..times.len() as u32).collect();
            expected.sort_by_key(|&i| times[i as usize]);
            prop_assert_eq!(fired, expected);
        }
    }
}
