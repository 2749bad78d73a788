mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use parking_lot::Mutex;

use nice::daemon::Daemon;
use nice::error::{NiceError, Result};
use nice::host::{TransferAgent, TransferQueue};
use nice::network::{RegState, Wish, WishKind};

#[derive(Default)]
struct Recording {
    seen: Mutex<Vec<(Wish, SocketAddr)>>,
}

#[async_trait]
impl TransferAgent for Recording {
    async fn transfer(&self, wish: &Wish, peer: SocketAddr) -> Result<()> {
        self.seen.lock().push((wish.clone(), peer));
        Ok(())
    }
}

fn wish(app: &str, kind: WishKind) -> Wish {
    Wish {
        app: app.to_string(),
        kind,
    }
}

#[tokio::test]
async fn child_wishes_reach_the_parents_agent() {
    let agent = Arc::new(Recording::default());
    let (root_h, _root) = Daemon::bind(root(2))
        .await
        .unwrap()
        .with_transfer_agent(agent.clone())
        .spawn();
    let (a, _ta) = start(child(root_h.local_addr(), 2)).await;
    wait_for(&a, "a registered", |r| r.state == RegState::Active).await;

    a.request_transfer(wish("render", WishKind::Get)).await.unwrap();
    a.request_transfer(wish("render", WishKind::Put)).await.unwrap();
    // Commands are handled in order, so the wishes are queued once this answers.
    status(&a).await;

    root_h.exchange_now().await.unwrap();
    until("both wishes handled", || agent.seen.lock().len() == 2).await;
    let seen = agent.seen.lock().clone();
    assert!(seen.iter().all(|(_, peer)| *peer == a.local_addr()));
    assert!(seen.contains(&(wish("render", WishKind::Get), a.local_addr())));
    assert!(seen.contains(&(wish("render", WishKind::Put), a.local_addr())));

    // Reported wishes are not sent twice.
    root_h.exchange_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(agent.seen.lock().len(), 2);
}

struct Stuck;

#[async_trait]
impl TransferAgent for Stuck {
    async fn transfer(&self, _wish: &Wish, _peer: SocketAddr) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn queue_dedupes_in_flight_and_times_out() {
    let mut q = TransferQueue::new(Arc::new(Stuck), Duration::from_secs(30));
    let peer: SocketAddr = "10.0.0.5:4400".parse().unwrap();
    assert!(q.enqueue(wish("sim", WishKind::Get), peer));
    assert!(!q.enqueue(wish("sim", WishKind::Get), peer), "already in flight");
    assert!(q.enqueue(wish("sim", WishKind::Put), peer));
    assert_eq!(q.in_flight(), 2);

    tokio::time::sleep(Duration::from_secs(31)).await;
    let done = q.cull();
    assert_eq!(done.len(), 2);
    assert!(done
        .iter()
        .all(|d| matches!(d.result, Err(NiceError::Timeout { .. }))));
    assert_eq!(q.in_flight(), 0);
}

#[test]
fn outbound_wishes_are_taken_once() {
    let mut q = TransferQueue::new(Arc::new(Recording::default()), Duration::from_secs(5));
    q.request(wish("a", WishKind::Put));
    q.request(wish("b", WishKind::Get));
    q.request(wish("a", WishKind::Put));
    assert_eq!(q.take_outbound().len(), 2);
    assert!(q.take_outbound().is_empty());
}
