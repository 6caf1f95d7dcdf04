use serde::{Deserialize, Serialize};

/// Payload stored in every candidate node, identifying who is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateOwner {
    pub owner: String,
    pub pid: u32,
}

impl CandidateOwner {
    pub fn new(owner: impl Into<String>) -> Self {
        CandidateOwner {
            owner: owner.into(),
            pid: std::process::id(),
        }
    }

    /// Default owner label for this process.
    pub fn process_label() -> String {
        format!("pid-{}", std::process::id())
    }

    pub fn encode(&self) -> Result<Vec<u8>, bitcode::Error> {
        bitcode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, bitcode::Error> {
        bitcode::deserialize(bytes)
    }
}
