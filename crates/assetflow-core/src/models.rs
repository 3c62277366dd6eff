//! Transfer direction and queue priority.

use serde::{Deserialize, Serialize};

/// The three independent transfer pipelines. Each direction has its own
/// pending queue, running set, and capacity slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Download,
    Upload,
    /// Upload to the localhost-scoped endpoint; the asset stays on this node
    /// and is registered as a temp asset on success.
    LocalUpload,
}

impl Direction {
    pub const ALL: [Direction; 3] = [Direction::Download, Direction::Upload, Direction::LocalUpload];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Download => "download",
            Direction::Upload => "upload",
            Direction::LocalUpload => "local_upload",
        }
    }

    /// Stable index for per-direction state tables.
    pub fn index(&self) -> usize {
        match self {
            Direction::Download => 0,
            Direction::Upload => 1,
            Direction::LocalUpload => 2,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, Direction::Upload | Direction::LocalUpload)
    }
}

/// Queue priority. `High` jumps to the front of the pending queue, except
/// for texture downloads, which always sink to the back.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
}
