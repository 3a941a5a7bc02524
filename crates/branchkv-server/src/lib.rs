//! # branchkv server
//!
//! One shard of the branchkv store: a coordinator owning a node store and
//! a copy of the cluster routing table, served over HTTP/JSON.
//!
//! This crate provides:
//! - **Coordinator**: routing, forwarding, range splits and conflict merges
//! - **RPC surface**: axum routes for clients and peers
//! - **Action invoker**: merge functions run as serverless actions
//! - **Configuration**: file plus `BRANCHKV_*` environment layering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Clients / peer servers (HTTP)             │
//! └──────────────────────────┬───────────────────────────┘
//!                            │
//! ┌──────────────────────────▼───────────────────────────┐
//! │     Request id │ Access log │ Trace │ Body limit      │
//! ├──────────────────────────────────────────────────────┤
//! │                   RPC handlers                       │
//! ├──────────────────────────────────────────────────────┤
//! │                   Coordinator                        │
//! │   routing │ split protocol │ merges │ anti-entropy   │
//! ├────────────────────────┬─────────────────────────────┤
//! │  branchkv-core         │  PeerTransport / invoker    │
//! │  (Store, RangeIndex)   │  (pooled HTTP clients)      │
//! └────────────────────────┴─────────────────────────────┘
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod invoker;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod transport;

pub use config::ServerConfig;
pub use coordinator::{Coordinator, MergeBindings};
pub use error::{ApiError, ErrorCode};
pub use invoker::{ActionInvoker, HttpActionInvoker, InvokerError};
pub use server::{run_server, run_server_with_shutdown, serve};
pub use state::AppState;
pub use transport::LocalTransport;
