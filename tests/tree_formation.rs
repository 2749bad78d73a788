mod common;

use std::time::Duration;

use common::*;
use nice::constants::PROTOCOL_VERSION;
use nice::daemon::{query_status, walk_tree};
use nice::error::NiceError;
use nice::network::{Connection, ExchangeReply, RegState, RegisterReply, Request};
use nice::topology::SchedWindow;

fn active(r: &nice::network::StatusReport) -> bool {
    r.state == RegState::Active
}

#[tokio::test]
async fn full_root_redirects_newcomers_into_the_tree() {
    let (root_h, _root) = start(root(2)).await;
    let root_addr = root_h.local_addr();

    let (a, _ta) = start(child(root_addr, 5)).await;
    let a_report = wait_for(&a, "a registered", active).await;
    assert_eq!(parent_addr(&a_report), Some(root_addr));
    assert_eq!(a_report.max_children, 2, "parent's smaller limit wins");

    let (b, _tb) = start(child(root_addr, 2)).await;
    wait_for(&b, "b registered", active).await;

    let (c, _tc) = start(child(root_addr, 2)).await;
    let c_report = wait_for(&c, "c registered", active).await;
    let c_parent = parent_addr(&c_report).expect("c has a parent");
    assert!(
        c_parent == a.local_addr() || c_parent == b.local_addr(),
        "c should sit under a or b, got {}",
        c_parent
    );

    let r = status(&root_h).await;
    let mut kids = child_addrs(&r);
    kids.sort();
    let mut expected = vec![a.local_addr(), b.local_addr()];
    expected.sort();
    assert_eq!(kids, expected);
    assert_eq!(r.depth, 0, "depth is only refreshed by an exchange");

    root_h.exchange_now().await.unwrap();
    assert_eq!(status(&root_h).await.depth, 1);

    let tree = walk_tree(root_addr, fast_timeouts()).await;
    assert_eq!(tree.len(), 4);
    assert!(tree.iter().all(|(_, _, res)| res.is_ok()));
    let deepest = tree.iter().find(|(_, addr, _)| *addr == c.local_addr()).unwrap();
    assert_eq!(deepest.0, 2);

    let remote = query_status(root_addr, fast_timeouts()).await.unwrap();
    assert_eq!(remote.listen, root_addr);
    assert!(remote.is_root);
    assert_eq!(remote.children.len(), 2);
}

#[tokio::test]
async fn loopback_registrant_is_rejected_for_good() {
    let mut strict = root(2);
    strict.allow_loopback = false;
    let (root_h, _root) = start(strict).await;

    let (_a, task) = start(child(root_h.local_addr(), 2)).await;
    let ended = tokio::time::timeout(Duration::from_secs(10), task)
        .await
        .expect("daemon exits")
        .expect("task not cancelled");
    assert!(matches!(ended, Err(NiceError::Rejected { .. })), "{:?}", ended);
    assert!(status(&root_h).await.children.is_empty());
}

#[tokio::test]
async fn version_mismatch_is_rejected() {
    let (root_h, _root) = start(root(2)).await;
    let mut conn = Connection::connect(root_h.local_addr(), fast_timeouts())
        .await
        .unwrap();
    conn.send(&Request::Register {
        version: "nice/0".into(),
        port: 1,
        load: 1,
        barrier: false,
        depth: 0,
        window: SchedWindow::ALWAYS,
    })
    .await
    .unwrap();
    let reply: RegisterReply = conn.recv_first().await.unwrap();
    assert!(matches!(reply, RegisterReply::Rejected { .. }), "{:?}", reply);
    assert_ne!(PROTOCOL_VERSION, "nice/0");
    assert!(status(&root_h).await.children.is_empty());
}

#[tokio::test]
async fn shrinking_branching_factor_pushes_a_child_down() {
    let (root_h, _root) = start(root(4)).await;
    let root_addr = root_h.local_addr();
    let (a, _ta) = start(child(root_addr, 4)).await;
    wait_for(&a, "a registered", active).await;

    let (b, _tb) = start(child(a.local_addr(), 2)).await;
    wait_for(&b, "b registered", active).await;
    let (c, _tc) = start(child(a.local_addr(), 2)).await;
    wait_for(&c, "c registered", active).await;
    wait_for(&a, "a has two children", |r| r.children.len() == 2).await;

    // The root lowers its advertised limit.
    let mut conn = Connection::connect(a.local_addr(), fast_timeouts())
        .await
        .unwrap();
    conn.send(&Request::Exchange {
        port: root_addr.port(),
        depth: 0,
        load: 10,
        max_children: 1,
        window: SchedWindow::ALWAYS,
    })
    .await
    .unwrap();
    let reply: ExchangeReply = conn.recv_first().await.unwrap();
    assert!(matches!(reply, ExchangeReply::Report { .. }), "{:?}", reply);
    conn.finish().await;
    assert_eq!(status(&a).await.max_children, 1);

    a.exchange_now().await.unwrap();
    wait_for(&a, "a trimmed to one child", |r| r.children.len() == 1).await;

    let tree = wait_for_tree(root_addr, 4).await;
    assert_eq!(tree, vec![0, 1, 2, 3]);
}

/// Levels of every daemon reachable from `root`, once `count` are reachable.
async fn wait_for_tree(root: std::net::SocketAddr, count: usize) -> Vec<usize> {
    for _ in 0..400 {
        let tree = walk_tree(root, fast_timeouts()).await;
        if tree.len() == count && tree.iter().all(|(_, _, r)| r.is_ok()) {
            let mut levels: Vec<usize> = tree.into_iter().map(|(l, _, _)| l).collect();
            levels.sort();
            return levels;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("tree never reached {} daemons", count);
}
