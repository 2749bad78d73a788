mod common;

use std::time::Duration;

use common::*;
use nice::network::{Ack, Connection, ExchangeReply, RegState, Request};
use nice::topology::SchedWindow;

fn active(r: &nice::network::StatusReport) -> bool {
    r.state == RegState::Active
}

#[tokio::test]
async fn graceful_child_exit_frees_its_slot() {
    let (root_h, _root) = start(root(2)).await;
    let (a, task) = start(child(root_h.local_addr(), 2)).await;
    wait_for(&a, "a registered", active).await;
    wait_for(&root_h, "root sees a", |r| r.children.len() == 1).await;

    a.shutdown().await.unwrap();
    let ended = tokio::time::timeout(Duration::from_secs(10), task).await;
    assert!(matches!(ended, Ok(Ok(Ok(())))));
    wait_for(&root_h, "root forgets a", |r| r.children.is_empty()).await;
}

#[tokio::test]
async fn parent_exit_orphans_children() {
    let (root_h, root_task) = start(root(2)).await;
    let (a, _ta) = start(child(root_h.local_addr(), 2)).await;
    wait_for(&a, "a registered", active).await;

    root_h.shutdown().await.unwrap();
    let _ = tokio::time::timeout(Duration::from_secs(10), root_task).await;

    wait_for(&a, "a orphaned", |r| r.state == RegState::Orphan).await;
}

#[tokio::test]
async fn disowned_child_goes_back_and_is_readmitted() {
    let (root_h, _root) = start(root(2)).await;
    let root_addr = root_h.local_addr();
    let (a, _ta) = start(child(root_addr, 2)).await;
    wait_for(&a, "a registered", active).await;

    let mut conn = Connection::connect(a.local_addr(), fast_timeouts())
        .await
        .unwrap();
    conn.send(&Request::Orphan {
        port: root_addr.port(),
    })
    .await
    .unwrap();
    let ack: Ack = conn.recv_first().await.unwrap();
    assert_eq!(ack, Ack::Ok);
    conn.finish().await;

    let back = wait_for(&a, "a re-registered", active).await;
    assert_eq!(parent_addr(&back), Some(root_addr));
    let r = status(&root_h).await;
    assert_eq!(child_addrs(&r), vec![a.local_addr()], "no duplicate slot");
}

#[tokio::test]
async fn orphan_notice_from_a_stranger_is_only_acknowledged() {
    let (root_h, _root) = start(root(2)).await;
    let (a, _ta) = start(child(root_h.local_addr(), 2)).await;
    wait_for(&a, "a registered", active).await;

    let mut conn = Connection::connect(a.local_addr(), fast_timeouts())
        .await
        .unwrap();
    conn.send(&Request::Orphan { port: 1 }).await.unwrap();
    let ack: Ack = conn.recv_first().await.unwrap();
    assert_eq!(ack, Ack::Ok);
    conn.finish().await;

    let r = status(&a).await;
    assert_eq!(r.state, RegState::Active);
    assert_eq!(parent_addr(&r), Some(root_h.local_addr()));
}

#[tokio::test]
async fn exchange_from_a_non_parent_is_disowned() {
    let (root_h, _root) = start(root(2)).await;
    let (a, _ta) = start(child(root_h.local_addr(), 2)).await;
    wait_for(&a, "a registered", active).await;

    let mut conn = Connection::connect(a.local_addr(), fast_timeouts())
        .await
        .unwrap();
    conn.send(&Request::Exchange {
        port: 1,
        depth: 0,
        load: 1,
        max_children: 1,
        window: SchedWindow::ALWAYS,
    })
    .await
    .unwrap();
    let reply: ExchangeReply = conn.recv_first().await.unwrap();
    assert_eq!(reply, ExchangeReply::NotYourChild);
    assert_eq!(status(&a).await.max_children, 2);
}

#[tokio::test]
async fn silent_children_are_dropped() {
    let mut impatient = root(2);
    impatient.timing.exchange = Duration::from_secs(1);
    impatient.timing.child_drop = Duration::from_secs(2);
    let (root_h, _root) = start(impatient).await;

    // Registers, then goes quiet without unregistering.
    let (a, task) = start(child(root_h.local_addr(), 2)).await;
    wait_for(&a, "a registered", active).await;
    wait_for(&root_h, "root sees a", |r| r.children.len() == 1).await;
    task.abort();

    wait_for(&root_h, "a timed out", |r| r.children.is_empty()).await;
}

#[tokio::test]
async fn unreachable_child_waits_for_the_liveness_timeout() {
    let (root_h, _root) = start(root(2)).await;
    let (a, task) = start(child(root_h.local_addr(), 2)).await;
    wait_for(&a, "a registered", active).await;
    wait_for(&root_h, "root sees a", |r| r.children.len() == 1).await;
    task.abort();
    let _ = task.await;

    // The exchange fails, but a single miss is no reason to drop the slot.
    root_h.exchange_now().await.unwrap();
    let r = status(&root_h).await;
    assert_eq!(child_addrs(&r), vec![a.local_addr()]);
}
