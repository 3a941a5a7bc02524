//! RPC request handlers

pub mod cluster;
pub mod kv;
pub mod merge;
pub mod nodes;
pub mod service;
pub mod sessions;
pub mod sync;

pub use cluster::*;
pub use kv::*;
pub use merge::*;
pub use nodes::*;
pub use service::*;
pub use sessions::*;
pub use sync::*;
