//! Local cluster example
//!
//! Starts three servers in this process, one owning the key space and two
//! spares, writes past the split threshold and shows how the key space is
//! partitioned afterwards.
//!
//! Run with: cargo run --example local_cluster

use branchkv_client::BranchClient;
use branchkv_core::NodeRef;
use branchkv_server::{serve, AppState, ServerConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;

const SERVERS: usize = 3;
const THRESHOLD: usize = 50;
const WRITES: usize = 150;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("branchkv_server=info")
        .init();

    let mut listeners = Vec::with_capacity(SERVERS);
    for _ in 0..SERVERS {
        listeners.push(TcpListener::bind("127.0.0.1:0").await?);
    }
    let addresses = listeners
        .iter()
        .map(|l| l.local_addr().map(|a| a.to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    for (listener, address) in listeners.into_iter().zip(&addresses) {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr()?.port(),
            self_address: address.clone(),
            servers: addresses.clone(),
            available_servers: addresses[1..].to_vec(),
            initial: addresses[0].clone(),
            threshold: THRESHOLD,
            ..ServerConfig::default()
        };
        let state = Arc::new(AppState::new(config)?);
        tokio::spawn(async move {
            if let Err(e) = serve(listener, state, std::future::pending()).await {
                eprintln!("server stopped: {}", e);
            }
        });
    }
    println!("Started {} servers: {:?}\n", SERVERS, addresses);

    let client = BranchClient::with_endpoint(&addresses[0])?;
    for i in 0..WRITES {
        let data = BTreeMap::from([(format!("word-{i}"), i.to_string())]);
        client.set(NodeRef::Root, data).await?;
    }
    println!("Wrote {} nodes through {}", WRITES, addresses[0]);

    println!("\nRouting table:");
    for mapping in client.index().await?.mappings() {
        println!("   {} -> {}", mapping.range, mapping.address);
    }

    println!("\nServers:");
    for address in &addresses {
        let status = client.at(address).status().await?;
        println!(
            "   {} holds {:>3} node(s), {} split(s), range {}",
            status.address,
            status.nodes,
            status.splits,
            status
                .range
                .map(|r| r.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}
