//! # branchkv client
//!
//! HTTP client for branchkv servers and the transport servers use to reach
//! their peers.
//!
//! ## Features
//!
//! - **Typed RPCs**: every server operation as an async method
//! - **Pooled connections**: one `reqwest` client shared by all peers
//! - **Retry**: bounded retry with exponential backoff for unreachable peers
//!
//! ## Example
//!
//! ```rust,ignore
//! use branchkv_client::BranchClient;
//! use branchkv_core::NodeRef;
//! use std::collections::BTreeMap;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BranchClient::with_endpoint("127.0.0.1:7000")?;
//!
//!     let data = BTreeMap::from([("word".to_string(), "1".to_string())]);
//!     let location = client.set(NodeRef::Root, data).await?;
//!
//!     let value = client.get_key(location.into(), "word").await?;
//!     println!("word = {:?}", value);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod transport;

pub use client::BranchClient;
pub use config::{endpoint_for, Config};
pub use error::{ClientError, Result, PEER_UNREACHABLE};
pub use transport::{with_retry, HttpTransport, PeerTransport};
