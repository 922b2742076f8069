/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Integration tests driving four-replica networks (n = 4, f = 1, all weights 1, quorum 3) over
//! the channel-based mock front service.
//!
//! The replicas use a mock [`FrontStub`](common::front::FrontStub), an in-memory
//! [`MemLedger`](common::ledger::MemLedger), and an auto-approving proposal validator. These use
//! channels to simulate the transport and a map to simulate persistence, and thus never leave
//! any artifacts.

mod common;

use std::time::{Duration, Instant};

use log::LevelFilter;
use rand_core::OsRng;

use pbft_rs::types::crypto_primitives::SigningKey;
use pbft_rs::types::data_types::ViewNumber;

use common::front::mock_front_net;
use common::node::{consensus_node_list, Node};
use common::setup_logger;

fn four_nodes(consensus_timeout: Duration) -> Vec<Node> {
    let mut csprg = OsRng {};
    let keys: Vec<SigningKey> = (0..4).map(|_| SigningKey::generate(&mut csprg)).collect();
    let nodes = consensus_node_list(&keys);
    let fronts = mock_front_net(keys.iter().map(|key| key.verifying_key()));

    keys.into_iter()
        .zip(fronts)
        .map(|(key, front)| Node::new(key, front, nodes.clone(), consensus_timeout))
        .collect()
}

/// Poll until `predicate` holds on every node, panicking after `deadline`.
fn wait_until(nodes: &[Node], deadline: Duration, what: &str, predicate: impl Fn(&Node) -> bool) {
    let started = Instant::now();
    while !nodes.iter().all(&predicate) {
        if started.elapsed() > deadline {
            panic!("timed out waiting for: {}", what);
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Every replica committed the same hash at `index`.
fn assert_agreement(nodes: &[Node], index: u64) {
    let reference = nodes[0]
        .committed_at(index)
        .expect("node 0 has not committed at this index");
    for node in nodes {
        let committed = node
            .committed_at(index)
            .expect("a node has not committed at this index");
        assert_eq!(
            committed.hash, reference.hash,
            "replicas committed different hashes at index {}",
            index
        );
    }
}

#[test]
fn happy_path_integration_test() {
    setup_logger(LevelFilter::Info);

    let nodes = four_nodes(Duration::from_secs(10));

    // At view 0 with committed index 0, node 0 leads index 1.
    log::debug!("Submitting a proposal for index 1 to node 0.");
    nodes[0].submit(1, b"transfer 5 from a to b");
    wait_until(&nodes, Duration::from_secs(30), "commit at index 1", |node| {
        node.committed_at(1).is_some()
    });
    assert_agreement(&nodes, 1);

    // The rotation moves on: node 1 leads index 2.
    log::debug!("Submitting a proposal for index 2 to node 1.");
    nodes[1].submit(2, b"transfer 3 from b to c");
    wait_until(&nodes, Duration::from_secs(30), "commit at index 2", |node| {
        node.committed_at(2).is_some() && node.ledger.stable_index() >= 2
    });
    assert_agreement(&nodes, 2);
}

#[test]
fn view_change_on_silent_leader_integration_test() {
    setup_logger(LevelFilter::Info);

    // Nothing is submitted to node 0 (the leader for index 1): every replica times out,
    // exchanges view changes, and converges on a new view with a new leader.
    let nodes = four_nodes(Duration::from_millis(600));

    wait_until(
        &nodes,
        Duration::from_secs(30),
        "every replica to move past view 0",
        |node| node.view() >= ViewNumber::new(1),
    );

    // Consensus stays live under the new leader. Views may keep rotating while nothing commits,
    // so the submission is repeated towards every node; only the current leader acts on it.
    let started = Instant::now();
    while !nodes.iter().all(|node| node.committed_at(1).is_some()) {
        if started.elapsed() > Duration::from_secs(30) {
            panic!("timed out waiting for a commit after the view change");
        }
        for node in &nodes {
            node.submit(1, b"post-view-change proposal");
        }
        std::thread::sleep(Duration::from_millis(300));
    }
    assert_agreement(&nodes, 1);
}

#[test]
fn committed_hashes_agree_across_a_run_of_proposals() {
    setup_logger(LevelFilter::Info);

    let nodes = four_nodes(Duration::from_secs(10));

    // Walk the leader rotation: with committed index advancing by one per proposal, the leader
    // for index i at view 0 is node (i - 1) mod 4.
    for index in 1..=4u64 {
        let leader = ((index - 1) % 4) as usize;
        let payload = format!("proposal number {}", index);
        nodes[leader].submit(index, payload.as_bytes());
        wait_until(
            &nodes,
            Duration::from_secs(30),
            "commit of the next proposal",
            |node| node.committed_at(index).is_some() && node.ledger.stable_index() >= index,
        );
        assert_agreement(&nodes, index);
    }
}
