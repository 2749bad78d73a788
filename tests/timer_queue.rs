use nice::timer::{TimerKind, TimerQueue};

const TICK: TimerKind = TimerKind::Interrupt { recurring: false };
const EVERY: TimerKind = TimerKind::Interrupt { recurring: true };

#[test]
fn cells_store_delays_relative_to_their_predecessor() {
    let mut q = TimerQueue::new();
    let a = q.insert(10, TICK);
    let b = q.insert(4, TICK);
    let c = q.insert(10, TimerKind::Timeout);
    let d = q.insert(7, TICK);

    // Firing order 4, 7, 10 (a), 10 (c); equal fire times keep insertion order.
    assert_eq!(q.pending(), vec![(b, 4), (d, 3), (a, 3), (c, 0)]);
    assert_eq!(q.next_delay(), Some(4));
    assert_eq!(q.fire_time(a), Some(10));
    assert_eq!(q.fire_time(c), Some(10));
}

#[test]
fn removal_hands_delay_to_successor() {
    let mut q = TimerQueue::new();
    let a = q.insert(3, TICK);
    let b = q.insert(8, TICK);
    let c = q.insert(12, TICK);

    assert!(q.remove(b));
    assert_eq!(q.pending(), vec![(a, 3), (c, 9)]);
    assert_eq!(q.fire_time(c), Some(12));

    assert!(!q.remove(b), "second removal is a no-op");
    assert!(q.remove(c));
    assert_eq!(q.pending(), vec![(a, 3)]);
}

#[test]
fn advance_fires_due_cells_and_rearms_recurring_ones() {
    let mut q = TimerQueue::new();
    let beat = q.insert(5, EVERY);
    let once = q.insert(7, TICK);

    assert!(q.advance(4).is_empty());
    assert_eq!(q.next_delay(), Some(1));

    let fired = q.advance(1);
    assert_eq!(fired.len(), 1);
    assert_eq!(fired[0].id, beat);
    assert_eq!(q.fire_time(once), Some(2));
    assert_eq!(q.fire_time(beat), Some(5));

    // One long gap can fire several cells at once.
    let fired: Vec<_> = q.advance(6).into_iter().map(|f| f.id).collect();
    assert_eq!(fired, vec![once, beat]);
    assert!(!q.contains(once));
    // Re-armed from the moment it was serviced.
    assert_eq!(q.fire_time(beat), Some(5));
    assert_eq!(q.len(), 1);
}

#[test]
fn insert_with_delay_uses_interval_on_rearm() {
    let mut q = TimerQueue::new();
    let id = q.insert_with_delay(1, 30, EVERY);
    assert_eq!(q.advance(1)[0].id, id);
    assert_eq!(q.fire_time(id), Some(30));
}
