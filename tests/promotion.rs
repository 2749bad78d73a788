mod common;

use std::sync::Arc;

use common::*;
use parking_lot::Mutex;

use nice::events::{dispatcher, model::LogEvent, sink::LogSink};
use nice::network::RegState;

struct MemorySink {
    events: Arc<Mutex<Vec<LogEvent>>>,
}

#[async_trait::async_trait]
impl LogSink for MemorySink {
    async fn handle(&self, event: &LogEvent) {
        self.events.lock().push(event.clone());
    }
}

#[tokio::test]
async fn child_is_handed_up_to_grandparent() {
    let mem = Arc::new(MemorySink {
        events: Arc::new(Mutex::new(Vec::new())),
    });
    dispatcher::init_events(vec![mem.clone()], 256).await;

    let (d1, _t1) = start(root(2)).await;
    let (d2, _t2) = start(child(d1.local_addr(), 1)).await;
    wait_for(&d2, "d2 registered", |r| r.state == RegState::Active).await;

    let mut s3 = child(d2.local_addr(), 1);
    s3.root = Some(d1.local_addr());
    let (d3, _t3) = start(s3).await;
    let r3 = wait_for(&d3, "d3 registered", |r| r.state == RegState::Active).await;
    assert_eq!(parent_addr(&r3), Some(d2.local_addr()));

    let promoted = d2.elect_now(true).await.unwrap();
    assert_eq!(promoted, Some(d3.local_addr()));
    let r2 = status(&d2).await;
    assert!(r2.children.is_empty());
    assert_eq!(r2.depth, 0);

    wait_for(&d3, "d3 re-registered with d1", |r| {
        r.state == RegState::Active && parent_addr(r) == Some(d1.local_addr())
    })
    .await;
    let r1 = status(&d1).await;
    assert_eq!(r1.children.len(), 2);

    let child = d3.local_addr().to_string();
    until("promotion event", || {
        mem.events
            .lock()
            .iter()
            .any(|e| matches!(e, LogEvent::Promotion(p) if p.child == child && p.success))
    })
    .await;
}

#[tokio::test]
async fn root_and_childless_daemons_never_promote() {
    let (d1, _t1) = start(root(2)).await;
    assert_eq!(d1.elect_now(true).await.unwrap(), None);

    let (d2, _t2) = start(child(d1.local_addr(), 2)).await;
    wait_for(&d2, "d2 registered", |r| r.state == RegState::Active).await;
    assert_eq!(d2.elect_now(true).await.unwrap(), None);
}
