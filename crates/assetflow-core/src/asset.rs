//! Asset identity: a 128-bit id plus a type tag.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Agent (end user) identifier.
pub type AgentId = Uuid;

/// Asset types moved by the transfer service.
///
/// The type tag participates in the wire name (`{uuid}.{name}`) and in two
/// routing rules: texture downloads always sink to the back of the pending
/// queue, and object uploads are gzip-compressed in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Texture,
    Sound,
    Animation,
    Object,
    Notecard,
}

impl AssetType {
    /// Short name used in URLs and content-store object names.
    pub fn wire_name(&self) -> &'static str {
        match self {
            AssetType::Texture => "texture",
            AssetType::Sound => "sound",
            AssetType::Animation => "animation",
            AssetType::Object => "object",
            AssetType::Notecard => "notecard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "texture" => Some(AssetType::Texture),
            "sound" => Some(AssetType::Sound),
            "animation" => Some(AssetType::Animation),
            "object" => Some(AssetType::Object),
            "notecard" => Some(AssetType::Notecard),
            _ => None,
        }
    }

    pub fn is_texture(&self) -> bool {
        matches!(self, AssetType::Texture)
    }

    /// Only object assets are compressed on upload; their serialized form is
    /// highly redundant and everything else is either already packed or too
    /// small to matter.
    pub fn compress_on_upload(&self) -> bool {
        matches!(self, AssetType::Object)
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Identity of one asset: UUID plus type tag.
///
/// Not unique across concurrent requests; two in-flight transfers for the
/// same `AssetId` are permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId {
    pub uuid: Uuid,
    pub kind: AssetType,
}

impl AssetId {
    pub fn new(uuid: Uuid, kind: AssetType) -> Self {
        Self { uuid, kind }
    }

    pub fn is_nil(&self) -> bool {
        self.uuid.is_nil()
    }

    /// Object name used on the wire and in the content store.
    pub fn object_name(&self) -> String {
        format!("{}.{}", self.uuid, self.kind.wire_name())
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.uuid, self.kind.wire_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_round_trips() {
        for kind in [
            AssetType::Texture,
            AssetType::Sound,
            AssetType::Animation,
            AssetType::Object,
            AssetType::Notecard,
        ] {
            assert_eq!(AssetType::parse(kind.wire_name()), Some(kind));
        }
        assert_eq!(AssetType::parse("bogus"), None);
    }

    #[test]
    fn only_objects_compress() {
        assert!(AssetType::Object.compress_on_upload());
        assert!(!AssetType::Texture.compress_on_upload());
        assert!(!AssetType::Sound.compress_on_upload());
    }

    #[test]
    fn object_name_format() {
        let id = AssetId::new(Uuid::nil(), AssetType::Sound);
        assert_eq!(
            id.object_name(),
            "00000000-0000-0000-0000-000000000000.sound"
        );
        assert!(id.is_nil());
    }
}
