//! TargetInvoker port - 外部 target の呼び出し
//!
//! # 設計原則
//! - 1 回の request/response 呼び出しだけを抽象化する
//! - 失敗は `Err` として返す（panic でジョブ境界を越えない）

use async_trait::async_trait;

use crate::domain::{EndpointId, InvokeError};

#[async_trait]
pub trait TargetInvoker: Send + Sync {
    /// Calls `endpoint` with an encoded `InvocationRequest` and returns the
    /// raw response bytes.
    ///
    /// `endpoint` is `None` when the job's target type was not registered;
    /// implementations are expected to fail fast with
    /// `InvokeError::TargetNotRegistered`.
    async fn invoke(
        &self,
        endpoint: Option<&EndpointId>,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, InvokeError>;
}
