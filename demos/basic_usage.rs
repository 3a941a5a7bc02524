//! Basic usage example for a branchkv server
//!
//! This example demonstrates:
//! - Writing versions on top of each other
//! - Resolving keys along a dependency chain
//! - Branching and merge-function bindings
//! - Virtual locations within a session
//!
//! Start a server first (`cargo run -p branchkv-server`), then
//! run with: cargo run --example basic_usage

use branchkv_client::BranchClient;
use branchkv_core::{
    rpc::{MergeFunctionRequest, SetRequest},
    NodeRef,
};
use std::collections::BTreeMap;

fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let endpoint = std::env::var("BRANCHKV_ENDPOINT").unwrap_or_else(|_| "127.0.0.1:7000".to_string());
    println!("branchkv - basic usage against {}\n", endpoint);

    let client = BranchClient::with_endpoint(&endpoint)?;
    client.health().await?;

    // ==================== Versions ====================

    println!("Writing a document...");
    let draft = client
        .set(NodeRef::Root, data(&[("title", "Notes"), ("body", "first draft")]))
        .await?;
    println!("   draft stored at {}", draft);

    let edit = client
        .set(draft.into(), data(&[("body", "second draft")]))
        .await?;
    println!("   edit stored at {}", edit);

    let doc = client
        .get(0, edit.into(), Some(vec!["title".into(), "body".into()]))
        .await?;
    println!("   resolved from the edit: {:?}", doc);

    // ==================== Branches ====================

    println!("\nBinding a merge function for 'body'...");
    match client
        .set_merge_function(&MergeFunctionRequest::for_key("body", "merge-body"))
        .await
    {
        Ok(()) => println!("   bound"),
        Err(e) => println!("   failed: {}", e),
    }

    println!("Creating two concurrent edits of the draft...");
    let left = client.set(draft.into(), data(&[("body", "left edit")])).await?;
    let right = client.set(draft.into(), data(&[("body", "right edit")])).await?;
    println!("   left {} / right {}", left, right);

    let node = client.get_node(draft).await?;
    println!("   the draft now has {} child(ren)", node.children.len());

    // ==================== Sessions ====================

    println!("\nWriting through virtual locations...");
    let session = 1;
    let first = SetRequest::new(NodeRef::Root, data(&[("step", "1")])).with_virtual(session, 10);
    client.set_raw(&first).await?;
    let second = SetRequest::new(NodeRef::Virtual(10), data(&[("step", "2")])).with_virtual(session, 11);
    client.set_raw(&second).await?;

    let resolved = client.resolve_virtual(session, 11).await?;
    println!("   virtual 11 is {}", resolved);
    client.end_session(session, true).await?;
    println!("   session ended");

    // ==================== Status ====================

    let status = client.status().await?;
    println!(
        "\nServer {} holds {} node(s), {} split(s), {} merge(s)",
        status.address, status.nodes, status.splits, status.merges
    );

    Ok(())
}
