use std::time::Duration;

use nice::timer::{ChurnTracker, Timers};
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn one_shot_interrupt_arrives_after_its_interval() {
    let (timers, mut rx) = Timers::<&'static str>::spawn();
    let start = Instant::now();
    timers.set_interrupt(Duration::from_secs(3), "measure", false);

    let tick = rx.recv().await.expect("driver alive");
    assert_eq!(tick.payload, "measure");
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(timers.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn recurring_interrupt_keeps_ticking() {
    let (timers, mut rx) = Timers::spawn();
    let start = Instant::now();
    let id = timers.set_interrupt(Duration::from_secs(2), 7u32, true);

    for _ in 0..3 {
        let tick = rx.recv().await.expect("driver alive");
        assert_eq!(tick.id, id);
        assert_eq!(tick.payload, 7);
    }
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert_eq!(timers.pending(), 1);
}

#[tokio::test(start_paused = true)]
async fn cleared_interrupt_never_fires() {
    let (timers, mut rx) = Timers::spawn();
    let id = timers.set_interrupt(Duration::from_secs(2), (), false);
    assert!(timers.clear(id));
    assert!(!timers.clear(id));

    let waited = tokio::time::timeout(Duration::from_secs(30), rx.recv()).await;
    assert!(waited.is_err(), "no tick expected");
}

#[tokio::test(start_paused = true)]
async fn deadline_resolves_and_cancels_on_drop() {
    let (timers, _rx) = Timers::<()>::spawn();
    let start = Instant::now();
    timers.set_timeout(Duration::from_secs(5)).await;
    assert!(start.elapsed() >= Duration::from_secs(5));

    let deadline = timers.set_timeout(Duration::from_secs(60));
    assert_eq!(timers.pending(), 1);
    drop(deadline);
    assert_eq!(timers.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn deadline_abandons_slow_work() {
    let (timers, _rx) = Timers::<()>::spawn();
    let slow = tokio::time::sleep(Duration::from_secs(120));
    let outcome = tokio::select! {
        _ = slow => "finished",
        _ = timers.set_timeout(Duration::from_secs(10)) => "timed out",
    };
    assert_eq!(outcome, "timed out");
}

#[tokio::test(start_paused = true)]
async fn ticks_come_out_in_schedule_order() {
    let (timers, mut rx) = Timers::spawn();
    timers.set_interrupt(Duration::from_secs(9), "late", false);
    tokio::time::advance(Duration::from_millis(1500)).await;
    timers.set_interrupt(Duration::from_secs(2), "early", false);

    assert_eq!(rx.recv().await.map(|t| t.payload), Some("early"));
    assert_eq!(rx.recv().await.map(|t| t.payload), Some("late"));
}

#[tokio::test(start_paused = true)]
async fn queue_churn_does_not_hold_back_pending_cells() {
    let (timers, mut rx) = Timers::spawn();
    timers.set_interrupt(Duration::from_secs(3), "exchange", true);

    // Twenty seconds of a caller arming and cancelling a deadline twice a second.
    for _ in 0..40 {
        tokio::time::advance(Duration::from_millis(500)).await;
        drop(timers.set_timeout(Duration::from_secs(30)));
    }

    let mut ticks = 0;
    while rx.try_recv().is_ok() {
        ticks += 1;
    }
    assert_eq!(ticks, 6, "due at 3, 6, 9, 12, 15 and 18 seconds");
    assert_eq!(timers.pending(), 1);
}

#[tokio::test(start_paused = true)]
async fn cells_inserted_between_seconds_never_fire_early() {
    let (timers, _rx) = Timers::<()>::spawn();
    tokio::time::advance(Duration::from_millis(300)).await;
    let start = Instant::now();
    timers.set_timeout(Duration::from_secs(2)).await;
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[test]
fn churn_shaves_a_second_only_above_one_mutation_per_second() {
    let t0 = Instant::now();

    let mut calm = ChurnTracker::new(7);
    for i in 0..5 {
        calm.record(t0 + Duration::from_secs(2 * i));
    }
    assert_eq!(calm.rate(), 1);
    assert!((0..100).all(|_| calm.compensate(10) == 10));

    let mut busy = ChurnTracker::new(7);
    for i in 0..5 {
        busy.record(t0 + Duration::from_millis(100 * i));
    }
    assert_eq!(busy.rate(), 5);
    let delays: Vec<u64> = (0..100).map(|_| busy.compensate(10)).collect();
    assert!(delays.iter().all(|d| *d == 9 || *d == 10));
    assert!(delays.contains(&9));
    assert!(delays.contains(&10));
    // A one-second delay is never shaved to nothing.
    assert!((0..100).all(|_| busy.compensate(1) == 1));
}
