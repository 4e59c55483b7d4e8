//! Wire-format JSON types, mirroring SPEC_FULL.md §6 exactly.

use crate::clock::VectorClock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PutBody {
    pub val: String,
    #[serde(rename = "causal-metadata", default)]
    pub causal_metadata: Option<VectorClock>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeleteBody {
    #[serde(rename = "causal-metadata", default)]
    pub causal_metadata: Option<VectorClock>,
}

#[derive(Debug, Serialize)]
pub struct GetResponse {
    pub val: String,
    #[serde(rename = "causal-metadata")]
    pub causal_metadata: VectorClock,
}

#[derive(Debug, Serialize)]
pub struct ClockOnlyResponse {
    #[serde(rename = "causal-metadata")]
    pub causal_metadata: VectorClock,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub shard_id: usize,
    pub count: usize,
    pub keys: Vec<String>,
    #[serde(rename = "causal-metadata")]
    pub causal_metadata: VectorClock,
}

/// `{ "num_shards": int, "nodes": [string], "time": RFC3339 }` — the
/// orchestrator's view-admin contract. `time` is optional; its absence
/// means "unversioned candidate", always accepted (§4.3).
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ViewBody {
    pub num_shards: usize,
    pub nodes: Vec<String>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NodeShards {
    pub shard_id: usize,
    pub nodes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ViewListResponse {
    pub view: Vec<NodeShards>,
}
