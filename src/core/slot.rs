//! Task slots and the registry the pool books from.
//!
//! Nothing here is synchronized. The pool keeps the whole [`Registry`]
//! behind one mutex so the booking scan, cursor movement, flag changes and
//! list mutation are atomic together.

use uuid::Uuid;

use super::task::Task;

/// Identifier of a slot inside a registry.
pub(crate) type SlotId = Uuid;

/// Scheduling metadata for one registered task.
#[derive(Debug)]
pub(crate) struct TaskSlot {
    id: SlotId,
    task: Task,
    booked: bool,
    going_to_stop: bool,
}

impl TaskSlot {
    pub(crate) fn new(task: Task) -> Self {
        Self {
            id: Uuid::new_v4(),
            task,
            booked: false,
            going_to_stop: false,
        }
    }

    pub(crate) const fn id(&self) -> SlotId {
        self.id
    }

    pub(crate) const fn task(&self) -> &Task {
        &self.task
    }

    pub(crate) const fn is_booked(&self) -> bool {
        self.booked
    }

    pub(crate) const fn is_going_to_stop(&self) -> bool {
        self.going_to_stop
    }

    pub(crate) fn book(&mut self) -> &mut Self {
        self.booked = true;
        self
    }

    pub(crate) fn release(&mut self) {
        self.booked = false;
    }

    /// One-way: a slot marked for stop is never booked again.
    pub(crate) fn mark_for_stop(&mut self) {
        self.going_to_stop = true;
    }

    fn is_bookable(&self) -> bool {
        !self.booked && !self.going_to_stop && self.task.can_be_executed()
    }
}

/// A slot claimed by one worker for one execution.
#[derive(Debug, Clone)]
pub(crate) struct Booking {
    pub slot_id: SlotId,
    pub task: Task,
}

/// What a worker must do after an execution.
#[derive(Debug)]
pub(crate) enum Reconciliation {
    /// The task recorded a failure and was dropped.
    Failed(Task),
    /// The task was marked for stop during execution and was dropped.
    Stopped(Task),
    /// The booking was released; the task stays registered.
    Released,
    /// The slot vanished while booked.
    Missing,
}

/// Outcome of a removal request.
#[derive(Debug)]
pub(crate) enum Removal {
    /// The task is not registered.
    NotFound,
    /// The slot was idle and has been dropped.
    Removed(Task),
    /// The slot is booked; the owning worker drops it after execution.
    Deferred,
}

/// Ordered slot list plus the shared round-robin cursor.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    slots: Vec<TaskSlot>,
    cursor: usize,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn booked_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_booked()).count()
    }

    pub(crate) fn contains(&self, task: &Task) -> bool {
        self.slots.iter().any(|s| s.task().same_task(task))
    }

    /// Register `task` in a new slot. A task that is already registered
    /// keeps its single slot and `None` is returned.
    pub(crate) fn insert(&mut self, task: Task) -> Option<SlotId> {
        if self.contains(&task) {
            return None;
        }
        let slot = TaskSlot::new(task);
        let id = slot.id();
        self.slots.push(slot);
        Some(id)
    }

    /// Book the next ready, unbooked slot after the cursor.
    ///
    /// Every slot is examined at most once per call; the slot under the
    /// cursor is examined last.
    pub(crate) fn book(&mut self) -> Option<Booking> {
        let len = self.slots.len();
        if len == 0 {
            return None;
        }
        self.cursor %= len;
        let start = self.cursor;
        loop {
            self.cursor = (self.cursor + 1) % len;
            let slot = &mut self.slots[self.cursor];
            if slot.is_bookable() {
                let slot = slot.book();
                return Some(Booking {
                    slot_id: slot.id(),
                    task: slot.task().clone(),
                });
            }
            if self.cursor == start {
                return None;
            }
        }
    }

    /// Settle a booking after execution. A recorded failure wins over a
    /// pending stop.
    pub(crate) fn reconcile(&mut self, slot_id: SlotId) -> Reconciliation {
        let Some(index) = self.position(slot_id) else {
            return Reconciliation::Missing;
        };
        let slot = &mut self.slots[index];
        if slot.task().state().has_failed() {
            Reconciliation::Failed(self.remove_at(index).task)
        } else if slot.is_going_to_stop() {
            Reconciliation::Stopped(self.remove_at(index).task)
        } else {
            slot.release();
            Reconciliation::Released
        }
    }

    /// Drop an idle slot now, or mark a booked one for stop.
    pub(crate) fn remove_task(&mut self, task: &Task) -> Removal {
        let Some(index) = self.slots.iter().position(|s| s.task().same_task(task)) else {
            return Removal::NotFound;
        };
        let slot = &mut self.slots[index];
        if slot.is_booked() {
            slot.mark_for_stop();
            Removal::Deferred
        } else {
            Removal::Removed(self.remove_at(index).task)
        }
    }

    fn position(&self, slot_id: SlotId) -> Option<usize> {
        self.slots.iter().position(|s| s.id() == slot_id)
    }

    fn remove_at(&mut self, index: usize) -> TaskSlot {
        let slot = self.slots.remove(index);
        // Keep the rotation where it was: slots after `index` shifted down by
        // one, and the scan starts after the cursor, so step back and wrap.
        if index <= self.cursor {
            self.cursor = match self.cursor {
                0 => self.slots.len().saturating_sub(1),
                cursor => cursor - 1,
            };
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskFn;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn ready_task(name: &str) -> Task {
        TaskFn::new(|| true, || Ok(())).with_name(name).into_task()
    }

    fn gated_task(gate: &Arc<AtomicBool>) -> Task {
        let gate = Arc::clone(gate);
        TaskFn::new(move || gate.load(Ordering::SeqCst), || Ok(())).into_task()
    }

    fn release(registry: &mut Registry, booking: &Booking) {
        assert!(matches!(
            registry.reconcile(booking.slot_id),
            Reconciliation::Released
        ));
    }

    #[test]
    fn test_slot_flags() {
        let mut slot = TaskSlot::new(ready_task("a"));
        assert!(!slot.is_booked());
        assert!(slot.book().is_booked());
        slot.release();
        assert!(!slot.is_booked());
        slot.mark_for_stop();
        assert!(slot.is_going_to_stop());
        assert!(!slot.is_bookable());
    }

    #[test]
    fn test_empty_registry_books_nothing() {
        let mut registry = Registry::new();
        assert!(registry.book().is_none());
    }

    #[test]
    fn test_round_robin_books_each_task_once_per_rotation() {
        let mut registry = Registry::new();
        for name in ["a", "b", "c", "d"] {
            registry.insert(ready_task(name));
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            let booking = registry.book().expect("a ready task");
            seen.push(booking.task.name().to_string());
            release(&mut registry, &booking);
        }
        seen.sort();
        assert_eq!(seen, ["a", "b", "c", "d"]);

        // The next rotation again books every task once.
        let first = registry.book().expect("a ready task");
        release(&mut registry, &first);
        let mut again = vec![first.task.name().to_string()];
        for _ in 0..3 {
            let booking = registry.book().expect("a ready task");
            again.push(booking.task.name().to_string());
            release(&mut registry, &booking);
        }
        again.sort();
        assert_eq!(again, ["a", "b", "c", "d"]);
    }

    #[test]
    fn test_booked_slot_is_skipped() {
        let mut registry = Registry::new();
        registry.insert(ready_task("only"));
        let booking = registry.book().expect("booked");
        assert!(registry.book().is_none());
        assert_eq!(registry.booked_count(), 1);
        release(&mut registry, &booking);
        assert!(registry.book().is_some());
    }

    #[test]
    fn test_unready_task_is_never_booked_until_gate_opens() {
        let gate = Arc::new(AtomicBool::new(false));
        let mut registry = Registry::new();
        registry.insert(gated_task(&gate));
        assert!(registry.book().is_none());
        gate.store(true, Ordering::SeqCst);
        assert!(registry.book().is_some());
    }

    #[test]
    fn test_remove_idle_slot_is_immediate() {
        let mut registry = Registry::new();
        let task = ready_task("a");
        registry.insert(task.clone());
        assert!(matches!(registry.remove_task(&task), Removal::Removed(_)));
        assert!(registry.is_empty());
        assert!(matches!(registry.remove_task(&task), Removal::NotFound));
    }

    #[test]
    fn test_remove_booked_slot_is_deferred() {
        let mut registry = Registry::new();
        let task = ready_task("a");
        registry.insert(task.clone());
        let booking = registry.book().expect("booked");

        assert!(matches!(registry.remove_task(&task), Removal::Deferred));
        assert!(registry.contains(&task));
        assert!(matches!(
            registry.reconcile(booking.slot_id),
            Reconciliation::Stopped(_)
        ));
        assert!(!registry.contains(&task));
    }

    #[test]
    fn test_marked_slot_is_not_rebooked() {
        let mut registry = Registry::new();
        let task = ready_task("a");
        registry.insert(task.clone());
        let booking = registry.book().expect("booked");
        registry.remove_task(&task);

        // Simulate a release path that only clears the booked flag.
        let index = registry.position(booking.slot_id).expect("still registered");
        registry.slots[index].release();
        assert!(registry.book().is_none());
    }

    #[test]
    fn test_failure_wins_over_stop() {
        let mut registry = Registry::new();
        let task = TaskFn::new(|| true, || Err(anyhow::anyhow!("broken"))).into_task();
        registry.insert(task.clone());
        let booking = registry.book().expect("booked");
        registry.remove_task(&task);
        if let Task::Blocking(t) = &booking.task {
            crate::core::run_blocking(t.as_ref());
        }
        assert!(matches!(
            registry.reconcile(booking.slot_id),
            Reconciliation::Failed(_)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cursor_survives_removal_of_tail() {
        let mut registry = Registry::new();
        let tasks: Vec<Task> = ["a", "b", "c"].into_iter().map(ready_task).collect();
        for task in &tasks {
            registry.insert(task.clone());
        }
        // Leave the cursor on the last slot, then drop it and the first one.
        for _ in 0..2 {
            let booking = registry.book().expect("booked");
            release(&mut registry, &booking);
        }
        registry.remove_task(&tasks[0]);
        registry.remove_task(&tasks[2]);
        let booking = registry.book().expect("remaining task is bookable");
        assert!(booking.task.same_task(&tasks[1]));
    }

    #[test]
    fn test_cursor_wraps_when_head_slot_removed() {
        let mut registry = Registry::new();
        let tasks: Vec<Task> = ["a", "b", "c"].into_iter().map(ready_task).collect();
        for task in &tasks {
            registry.insert(task.clone());
        }
        // b, c, then a: the cursor ends on the head slot.
        for _ in 0..3 {
            let booking = registry.book().expect("booked");
            release(&mut registry, &booking);
        }
        assert!(matches!(registry.remove_task(&tasks[0]), Removal::Removed(_)));

        let next = registry.book().expect("b is next in the rotation");
        assert!(next.task.same_task(&tasks[1]));
        release(&mut registry, &next);
        let after = registry.book().expect("c follows b");
        assert!(after.task.same_task(&tasks[2]));
    }

    #[test]
    fn test_cursor_resets_when_last_slot_removed() {
        let mut registry = Registry::new();
        let task = ready_task("only");
        registry.insert(task.clone());
        let booking = registry.book().expect("booked");
        release(&mut registry, &booking);
        registry.remove_task(&task);
        assert_eq!(registry.cursor, 0);

        let fresh = ready_task("fresh");
        registry.insert(fresh.clone());
        let booking = registry.book().expect("new task is bookable");
        assert!(booking.task.same_task(&fresh));
    }

    #[test]
    fn test_duplicate_insert_is_ignored() {
        let mut registry = Registry::new();
        let task = ready_task("twice");
        assert!(registry.insert(task.clone()).is_some());
        assert!(registry.insert(task.clone()).is_none());
        assert_eq!(registry.len(), 1);

        // A single slot means a single booking at a time.
        let booking = registry.book().expect("booked");
        assert!(registry.book().is_none());
        release(&mut registry, &booking);

        // A distinct task with the same name is still a different task.
        assert!(registry.insert(ready_task("twice")).is_some());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_reconcile_missing_slot() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.reconcile(Uuid::new_v4()),
            Reconciliation::Missing
        ));
    }
}
