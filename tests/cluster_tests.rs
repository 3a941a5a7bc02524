//! Multi-server tests over real HTTP listeners
//!
//! Every server runs in this process on its own port and reaches its peers
//! through the pooled HTTP transport, the way a deployed cluster does.

use branchkv_client::BranchClient;
use branchkv_core::{
    rpc::{GlobalMergeFunctionRequest, SetRequest},
    Location, Node, NodeRef,
};
use branchkv_server::{serve, AppState, ServerConfig};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Cluster {
    clients: Vec<BranchClient>,
}

/// Start `count` servers; the last `spares` ones start without a range
async fn spawn_cluster(count: usize, spares: usize, threshold: usize, action_host: Option<String>) -> Cluster {
    let mut listeners = Vec::with_capacity(count);
    for _ in 0..count {
        listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
    }
    let addresses: Vec<String> = listeners
        .iter()
        .map(|l| l.local_addr().unwrap().to_string())
        .collect();

    for (listener, address) in listeners.into_iter().zip(&addresses) {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
            self_address: address.clone(),
            servers: addresses.clone(),
            available_servers: addresses[count - spares..].to_vec(),
            initial: addresses[0].clone(),
            threshold,
            retry_backoff_ms: 10,
            action_host: action_host.clone(),
            ..ServerConfig::default()
        };
        spawn(listener, config);
    }

    let clients = addresses
        .iter()
        .map(|a| BranchClient::with_endpoint(a).unwrap())
        .collect();
    Cluster { clients }
}

/// Start a server that owns the whole key space and knows no peers
async fn spawn_replica() -> (String, BranchClient) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: listener.local_addr().unwrap().port(),
        self_address: address.clone(),
        ..ServerConfig::default()
    };
    spawn(listener, config);
    let client = BranchClient::with_endpoint(&address).unwrap();
    (address, client)
}

fn spawn(listener: TcpListener, config: ServerConfig) {
    let state = Arc::new(AppState::new(config).unwrap());
    tokio::spawn(async move {
        serve(listener, state, std::future::pending()).await.unwrap();
    });
}

fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cluster_splits_under_load() {
    const THRESHOLD: usize = 8;
    const WRITES: usize = 24;
    let cluster = spawn_cluster(3, 2, THRESHOLD, None).await;
    let entry = &cluster.clients[0];

    let mut written = Vec::new();
    for i in 0..WRITES {
        let key = format!("key-{i}");
        let location = entry
            .set(NodeRef::Root, data(&[(key.as_str(), "v")]))
            .await
            .unwrap();
        written.push((key, location));
    }

    // No node lost or duplicated by the splits
    let mut total = 0;
    let mut splits = 0;
    for client in &cluster.clients {
        let status = client.status().await.unwrap();
        total += status.nodes;
        splits += status.splits;
    }
    assert_eq!(total, WRITES);
    assert!(splits >= 1);

    // Every server ends up with the same complete routing table
    let index = entry.index().await.unwrap();
    assert!(index.is_complete());
    assert_eq!(index.len() as u64, splits + 1);
    for client in &cluster.clients[1..] {
        assert_eq!(client.index().await.unwrap(), index);
    }

    // Every key is readable through every server
    for (key, location) in &written {
        for client in &cluster.clients {
            let value = client.get_key((*location).into(), key).await.unwrap();
            assert_eq!(value.as_deref(), Some("v"));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cross_shard_chain_after_split() {
    let cluster = spawn_cluster(2, 1, 4, None).await;
    let (a, b) = (&cluster.clients[0], &cluster.clients[1]);

    // Build a long chain, enough to split it across both servers
    let mut tip = Location::ROOT;
    for i in 0..12 {
        let key = format!("field-{i}");
        tip = a.set(tip.into(), data(&[(key.as_str(), "x")])).await.unwrap();
    }
    assert_eq!(a.status().await.unwrap().splits, 1);
    assert!(b.status().await.unwrap().nodes > 0);

    let keys: Vec<String> = (0..12).map(|i| format!("field-{i}")).collect();
    for client in [a, b] {
        let found = client.get(0, tip.into(), Some(keys.clone())).await.unwrap();
        assert_eq!(found.len(), 12);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_merge_action_over_http() {
    let actions = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces/guest/actions/merge-doc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "nodes": [{ "data": { "doc": "merged" } }] })),
        )
        .expect(1)
        .mount(&actions)
        .await;

    let cluster = spawn_cluster(2, 0, 10_000, Some(actions.uri())).await;
    let (a, b) = (&cluster.clients[0], &cluster.clients[1]);
    b.set_global_merge_function(&GlobalMergeFunctionRequest::new("merge-doc"))
        .await
        .unwrap();

    let parent = a.set(NodeRef::Root, data(&[("doc", "v0")])).await.unwrap();
    a.set(parent.into(), data(&[("doc", "left")])).await.unwrap();
    b.set(parent.into(), data(&[("doc", "right")])).await.unwrap();

    let merged = Node::new(parent, data(&[("doc", "merged")])).unwrap().location;
    let node = a.get_node(parent).await.unwrap();
    let children: Vec<Location> = node.children.iter().map(|c| c.location).collect();
    assert_eq!(children, vec![merged]);

    let value = b.get_key(merged.into(), "doc").await.unwrap();
    assert_eq!(value.as_deref(), Some("merged"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_virtual_sessions_span_servers() {
    let cluster = spawn_cluster(2, 0, 10_000, None).await;
    let (a, b) = (&cluster.clients[0], &cluster.clients[1]);
    let session = 42;

    let first = SetRequest::new(NodeRef::Root, data(&[("step", "1")])).with_virtual(session, 1);
    let stored = b.set_raw(&first).await.unwrap().location;
    assert_eq!(a.resolve_virtual(session, 1).await.unwrap(), stored);

    let second = SetRequest::new(NodeRef::Virtual(1), data(&[("next", "2")]))
        .with_virtual(session, 2)
        .with_session(session);
    b.set_raw(&second).await.unwrap();

    let found = b
        .get(session, NodeRef::Virtual(2), Some(vec!["step".into(), "next".into()]))
        .await
        .unwrap();
    assert_eq!(found, data(&[("next", "2"), ("step", "1")]));

    b.end_session(session, true).await.unwrap();
    let err = a.resolve_virtual(session, 1).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pull_between_replicas() {
    let (source_address, source) = spawn_replica().await;
    let (_, replica) = spawn_replica().await;

    let base = source.set(NodeRef::Root, data(&[("x", "1")])).await.unwrap();
    let top = source.set(base.into(), data(&[("y", "2")])).await.unwrap();

    let pulled = replica.pull(&source_address, Location::ROOT).await.unwrap();
    assert_eq!(pulled.outdated, 1);
    assert_eq!(pulled.inserted, 2);

    assert_eq!(
        replica.merkle_tree(Location::ROOT).await.unwrap(),
        source.merkle_tree(Location::ROOT).await.unwrap()
    );
    let value = replica.get_key(top.into(), "x").await.unwrap();
    assert_eq!(value.as_deref(), Some("1"));

    let again = replica.pull(&source_address, Location::ROOT).await.unwrap();
    assert_eq!(again.outdated, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_spare_defers_split() {
    // The spare is configured but nothing listens there
    let dead = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_address = dead.local_addr().unwrap().to_string();
    drop(dead);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: listener.local_addr().unwrap().port(),
        self_address: address.clone(),
        servers: vec![address.clone(), dead_address.clone()],
        available_servers: vec![dead_address.clone()],
        initial: address.clone(),
        threshold: 3,
        retry_attempts: 1,
        peer_timeout_ms: 500,
        ..ServerConfig::default()
    };
    spawn(listener, config);
    let client = BranchClient::with_endpoint(&address).unwrap();

    for i in 0..6 {
        let key = format!("key-{i}");
        client.set(NodeRef::Root, data(&[(key.as_str(), "v")])).await.unwrap();
    }
    let status = client.status().await.unwrap();
    assert_eq!(status.nodes, 6);
    assert_eq!(status.splits, 0);
    assert_eq!(status.available_servers, vec![dead_address]);
    assert_eq!(client.index().await.unwrap().len(), 1);
}
