use crate::sim::ReadyModel;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub control: u32,
    pub ready_model: ReadyModel,
    pub wire: Vec<u8>,
    pub wire_text: String,
    pub polls: u64,
    pub acks: u64,
    pub overruns: u64,
    pub protocol_violations: u64,
    pub pending: bool,
}

impl DeviceSnapshot {
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}
