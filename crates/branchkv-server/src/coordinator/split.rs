//! Range split protocol
//!
//! When the nodes inside a server's range outgrow its threshold, the owner
//! halves the range at the median key hash and hands the smaller half to a
//! spare server. Replicas of foreign nodes pulled in by anti-entropy do not
//! count. Steps:
//!
//! 1. `AddNodes` of the relocated nodes to the spare
//! 2. `Split` to the spare, which now owns its half
//! 3. local index update, tombstones, spare leaves the pool
//! 4. `Split` broadcast to the other servers and transfer of merge bindings
//!
//! A failure in steps 1-2 aborts with no local change; the split is retried
//! on the next overflow. Step 4 retries and then logs what is left.

use super::Coordinator;
use crate::error::{ApiError, ErrorCode, Result};
use branchkv_client::with_retry;
use branchkv_core::{rpc::MergeFunctionRequest, rpc::SplitRequest, KeyRange, Location, Node};
use rand::seq::SliceRandom;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

/// A split decided under the exclusive phase
struct Plan {
    range: KeyRange,
    mid: u32,
    spare: String,
    request: SplitRequest,
    nodes: Vec<Node>,
}

impl Coordinator {
    /// Split when this server's range holds more than `threshold` nodes
    pub(crate) async fn check_overflow(&self) {
        if self.owned_len() <= self.threshold {
            return;
        }
        if let Err(e) = self.split().await {
            warn!(code = ErrorCode::SplitAborted.as_str(), error = %e, "split aborted");
        }
    }

    /// Hand the smaller half of this server's range to a spare server
    pub async fn split(&self) -> Result<()> {
        let _phase = self.phase.write().await;

        let Some(plan) = self.plan_split() else {
            return Ok(());
        };
        let moved: Vec<Location> = plan.nodes.iter().map(|n| n.location).collect();

        self.transport
            .add_nodes(&plan.spare, plan.nodes)
            .await
            .map_err(|e| aborted(&plan.spare, "AddNodes", e))?;
        self.transport
            .split(&plan.spare, plan.request.clone())
            .await
            .map_err(|e| aborted(&plan.spare, "Split", e))?;

        self.index.write().apply_split(
            plan.range,
            plan.mid,
            &plan.request.left_server,
            &plan.request.right_server,
        )?;
        {
            let mut store = self.store.write();
            for &location in &moved {
                if let Err(e) = store.remove_node(location) {
                    debug!(%location, error = %e, "relocated node already gone");
                }
            }
        }
        self.available.lock().retain(|s| *s != plan.spare);
        self.splits.fetch_add(1, Ordering::Relaxed);

        let targets: Vec<String> = self
            .peers
            .iter()
            .filter(|p| **p != plan.spare)
            .cloned()
            .collect();
        let transport = &self.transport;
        let request = &plan.request;
        let failed = self
            .broadcast("split", targets, |peer| async move {
                transport.split(&peer, request.clone()).await
            })
            .await;

        let bindings = self.bindings.take_locations(&moved);
        let transferred = bindings.len();
        for (location, name) in bindings {
            let binding = MergeFunctionRequest::for_location(location, name);
            let result = with_retry(self.retry_attempts, self.retry_backoff, || {
                self.transport.set_merge_function(&plan.spare, binding.clone())
            })
            .await;
            if let Err(e) = result {
                error!(%location, spare = %plan.spare, error = %e, "merge binding transfer failed");
            }
        }

        info!(
            range = %plan.range,
            mid = plan.mid,
            spare = %plan.spare,
            moved = moved.len(),
            bindings = transferred,
            unreachable = failed,
            "split range"
        );
        Ok(())
    }

    /// Decide range, midpoint, spare and relocated nodes
    fn plan_split(&self) -> Option<Plan> {
        let store = self.store.read();
        let index = self.index.read();
        let Some(range) = index.range_of(&self.address) else {
            warn!(address = %self.address, "no range owned, cannot split");
            return None;
        };
        let owned = store.count_in(range.low, range.high);
        if owned <= self.threshold {
            return None;
        }
        let mid = store.split_point(range.low, range.high)?;
        let left = store.locations_in(range.low, mid);
        let right = store.locations_in(mid + 1, range.high);

        let spare = {
            let available = self.available.lock();
            let candidates: Vec<&String> = available
                .iter()
                .filter(|s| index.range_of(s).is_none())
                .collect();
            candidates.choose(&mut rand::thread_rng()).map(|s| s.to_string())
        };
        let Some(spare) = spare else {
            warn!(nodes = owned, threshold = self.threshold, "no spare server available");
            return None;
        };

        // Relocate the smaller side to keep the transfer small
        let spare_takes_left = left.len() < right.len();
        let moved = if spare_takes_left { left } else { right };
        if moved.is_empty() {
            warn!(range = %range, "all nodes share one key hash, cannot split");
            return None;
        }
        let (left_server, right_server) = if spare_takes_left {
            (spare.as_str(), self.address.as_str())
        } else {
            (self.address.as_str(), spare.as_str())
        };
        let request = SplitRequest::new(range, mid, left_server, right_server);

        let nodes = moved
            .iter()
            .filter_map(|&location| store.node(location).cloned())
            .collect();

        Some(Plan {
            range,
            mid,
            spare,
            request,
            nodes,
        })
    }

    /// Apply a routing-table split announced by another server
    pub async fn apply_split(&self, request: SplitRequest) -> Result<()> {
        self.index.write().apply_split(
            request.range(),
            request.mid,
            &request.left_server,
            &request.right_server,
        )?;
        self.available
            .lock()
            .retain(|s| *s != request.left_server && *s != request.right_server);
        info!(
            range = %request.range(),
            mid = request.mid,
            left = %request.left_server,
            right = %request.right_server,
            "applied split"
        );

        if request.propagate {
            let forwarded = SplitRequest {
                propagate: false,
                ..request
            };
            let transport = &self.transport;
            let forwarded = &forwarded;
            self.broadcast("split", self.peers.clone(), |peer| async move {
                transport.split(&peer, forwarded.clone()).await
            })
            .await;
        }
        Ok(())
    }
}

fn aborted(spare: &str, step: &str, e: branchkv_client::ClientError) -> ApiError {
    ApiError::new(
        ErrorCode::SplitAborted,
        format!("{} to {} failed: {}", step, spare, e),
    )
}
