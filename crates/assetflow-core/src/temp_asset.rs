//! Assets hosted on a non-central node.

use uuid::Uuid;

use crate::asset::AgentId;

/// An asset that physically lives on a simulator-style node instead of the
/// central asset service. Registered when a local upload succeeds; texture
/// downloads for a recorded asset are redirected to the recorded host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAssetRecord {
    pub asset_id: Uuid,
    pub agent_id: AgentId,
    pub host_name: String,
}

impl TempAssetRecord {
    /// Base URL serving assets on the recorded host.
    pub fn base_url(&self) -> String {
        format!("http://{}/asset", self.host_name)
    }
}
