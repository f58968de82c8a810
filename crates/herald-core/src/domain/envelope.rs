//! Invocation envelope - dispatcher と target の間のワイヤ形式
//!
//! - request:  `{ "correlationToken": string, "context": any }`
//! - response: `{ "correlationToken": string, "success": bool, "result": any }`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::CorrelationToken;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRequest {
    pub correlation_token: CorrelationToken,
    pub context: Value,
}

impl InvocationRequest {
    pub fn new(correlation_token: CorrelationToken, context: Value) -> Self {
        Self {
            correlation_token,
            context,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// What a target answers.
///
/// A missing `success` counts as `false`; a missing `result` stays `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub correlation_token: CorrelationToken,
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl InvocationResponse {
    pub fn success(correlation_token: CorrelationToken, result: Value) -> Self {
        Self {
            correlation_token,
            success: true,
            result: Some(result),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
