//! Resources as seen by the resource resolver.

use serde::{Deserialize, Serialize};

use super::ids::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    DoesNotExist,
    Allocated,
    Ready,
}

/// A resource slot in the external resource store.
///
/// The scheduler only ever reads `status`; `data` is carried for completeness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub status: ResourceStatus,
    #[serde(default)]
    pub data: Vec<u8>,
}

impl Resource {
    pub fn missing(id: ResourceId) -> Self {
        Self {
            id,
            status: ResourceStatus::DoesNotExist,
            data: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status == ResourceStatus::Ready
    }
}
