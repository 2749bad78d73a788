//! Background task that drives a [`TimerQueue`] with a single sleep.
//!
//! Interrupt cells are delivered as [`TimerEvent`]s on a channel the owner
//! selects on, so timer work always runs on the owner's loop and never from
//! inside whatever the owner happens to be awaiting. Timeout cells resolve a
//! [`Deadline`] instead.

use super::queue::{Fired, TimerId, TimerKind, TimerQueue};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEvent<T> {
    pub id: TimerId,
    pub payload: T,
}

enum Action<T> {
    Tick(T),
    Wake(oneshot::Sender<()>),
}

/// Counts queue mutations over the trailing second.
///
/// The driver clock moves in whole seconds, so a cell inserted between two
/// boundaries is rounded up and runs up to a second late. Above one
/// mutation per second, newly inserted delays lose a second with
/// probability `1 - 1/rate`.
pub struct ChurnTracker {
    recent: VecDeque<Instant>,
    rng: StdRng,
}

impl ChurnTracker {
    pub fn new(seed: u64) -> Self {
        Self {
            recent: VecDeque::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn record(&mut self, now: Instant) {
        self.recent.push_back(now);
        while let Some(&t) = self.recent.front() {
            if now.saturating_duration_since(t) > Duration::from_secs(1) {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Mutations seen in the trailing second.
    pub fn rate(&self) -> usize {
        self.recent.len()
    }

    pub fn compensate(&mut self, delay: u64) -> u64 {
        let rate = self.rate();
        if rate > 1 && delay > 1 && self.rng.gen_bool(1.0 - 1.0 / rate as f64) {
            delay - 1
        } else {
            delay
        }
    }
}

struct Shared<T> {
    queue: TimerQueue,
    actions: HashMap<TimerId, Action<T>>,
    armed_at: Instant,
    churn: ChurnTracker,
    tx: mpsc::UnboundedSender<TimerEvent<T>>,
}

impl<T: Clone> Shared<T> {
    /// Bring the queue up to `now` in whole seconds. The fractional second
    /// stays on the clock so mutations never hold back pending cells.
    fn sync(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.armed_at).as_secs();
        let fired = self.queue.advance(elapsed);
        self.armed_at += Duration::from_secs(elapsed);
        self.deliver(fired);
    }

    /// Delay, counted from the last whole-second boundary, for a cell due
    /// `secs` from `now`.
    fn delay_from(&mut self, now: Instant, secs: u64) -> u64 {
        let lag = u64::from(now > self.armed_at);
        self.churn.compensate(secs) + lag
    }

    fn deliver(&mut self, fired: Vec<Fired>) {
        for f in fired {
            let recurring = f.kind.recurring();
            let action = if recurring {
                match self.actions.get(&f.id) {
                    Some(Action::Tick(payload)) => Some(Action::Tick(payload.clone())),
                    _ => None,
                }
            } else {
                self.actions.remove(&f.id)
            };
            match action {
                Some(Action::Tick(payload)) => {
                    let _ = self.tx.send(TimerEvent { id: f.id, payload });
                }
                Some(Action::Wake(waker)) => {
                    let _ = waker.send(());
                }
                None => {}
            }
        }
    }
}

/// Handle to the timer task. Cheap to clone.
pub struct Timers<T> {
    shared: Arc<Mutex<Shared<T>>>,
    notify: Arc<Notify>,
}

impl<T> Clone for Timers<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            notify: self.notify.clone(),
        }
    }
}

fn whole_secs(interval: Duration) -> u64 {
    interval.as_secs().max(1)
}

impl<T: Clone + Send + 'static> Timers<T> {
    /// Start the driver task. Ticks arrive on the returned receiver.
    pub fn spawn() -> (Self, mpsc::UnboundedReceiver<TimerEvent<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            queue: TimerQueue::new(),
            actions: HashMap::new(),
            armed_at: Instant::now(),
            churn: ChurnTracker::new(u64::from(std::process::id())),
            tx,
        }));
        let notify = Arc::new(Notify::new());
        tokio::spawn(drive(shared.clone(), notify.clone()));
        (Self { shared, notify }, rx)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Shared<T>, Instant) -> R) -> R {
        let out = {
            let mut s = self.shared.lock();
            let now = Instant::now();
            s.sync(now);
            s.churn.record(now);
            f(&mut s, now)
        };
        self.notify.notify_one();
        out
    }

    /// Deliver `payload` after `interval` (whole seconds, at least one), and
    /// every `interval` thereafter when `recurring`.
    pub fn set_interrupt(&self, interval: Duration, payload: T, recurring: bool) -> TimerId {
        let secs = whole_secs(interval);
        self.mutate(|s, now| {
            let delay = s.delay_from(now, secs);
            let id = s
                .queue
                .insert_with_delay(delay, secs, TimerKind::Interrupt { recurring });
            s.actions.insert(id, Action::Tick(payload));
            id
        })
    }

    /// Arm a one-shot deadline. Awaiting the returned value completes when it
    /// expires; dropping it cancels the cell.
    pub fn set_timeout(&self, interval: Duration) -> Deadline<T> {
        let secs = whole_secs(interval);
        let (waker, rx) = oneshot::channel();
        let id = self.mutate(|s, now| {
            let delay = s.delay_from(now, secs);
            let id = s.queue.insert_with_delay(delay, secs, TimerKind::Timeout);
            s.actions.insert(id, Action::Wake(waker));
            id
        });
        Deadline {
            id,
            rx,
            timers: self.clone(),
        }
    }

    /// Cancel a pending cell. Unknown ids are a no-op.
    pub fn clear(&self, id: TimerId) -> bool {
        self.mutate(|s, _| {
            s.actions.remove(&id);
            s.queue.remove(id)
        })
    }

    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Seconds until `id` fires, as currently scheduled.
    pub fn fire_time(&self, id: TimerId) -> Option<u64> {
        self.shared.lock().queue.fire_time(id)
    }
}

async fn drive<T: Clone + Send + 'static>(shared: Arc<Mutex<Shared<T>>>, notify: Arc<Notify>) {
    loop {
        let deadline = {
            let mut s = shared.lock();
            s.sync(Instant::now());
            if s.tx.is_closed() {
                return;
            }
            s.queue
                .next_delay()
                .map(|secs| s.armed_at + Duration::from_secs(secs))
        };
        match deadline {
            Some(at) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = notify.notified() => {}
                }
            }
            None => notify.notified().await,
        }
    }
}

/// One-shot timeout armed through [`Timers::set_timeout`].
pub struct Deadline<T: Clone + Send + 'static> {
    id: TimerId,
    rx: oneshot::Receiver<()>,
    timers: Timers<T>,
}

impl<T: Clone + Send + 'static> Deadline<T> {
    pub fn id(&self) -> TimerId {
        self.id
    }
}

impl<T: Clone + Send + 'static> Future for Deadline<T> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A vanished driver means nobody will ever fire us; treat as expired.
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}

impl<T: Clone + Send + 'static> Drop for Deadline<T> {
    fn drop(&mut self) {
        if self.timers.shared.lock().queue.contains(self.id) {
            self.timers.clear(self.id);
        }
    }
}
