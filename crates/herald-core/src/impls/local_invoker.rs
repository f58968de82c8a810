//! LocalInvoker - プロセス内の handler を target として呼び出す
//!
//! endpoint -> handler の対応を持ち、リクエストを decode して handler に渡す。
//! handler の戻り値（JSON）はそのままレスポンス本文になる。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{EndpointId, InvocationRequest, InvokeError};
use crate::ports::TargetInvoker;

/// An in-process target.
///
/// The returned value is the raw response body; it is expected (but not
/// required) to have the `InvocationResponse` shape.
#[async_trait]
pub trait TargetHandler: Send + Sync {
    async fn handle(&self, request: InvocationRequest) -> Result<Value, String>;
}

/// Adapts an async closure into a `TargetHandler`.
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(InvocationRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> TargetHandler for FnHandler<F>
where
    F: Fn(InvocationRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    async fn handle(&self, request: InvocationRequest) -> Result<Value, String> {
        (self.0)(request).await
    }
}

#[derive(Default)]
pub struct LocalInvoker {
    handlers: HashMap<EndpointId, Arc<dyn TargetHandler>>,
}

impl LocalInvoker {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Binds `endpoint` to `handler`. Last registration wins.
    pub fn register(mut self, endpoint: &str, handler: impl TargetHandler + 'static) -> Self {
        self.handlers
            .insert(EndpointId::new(endpoint), Arc::new(handler));
        self
    }
}

#[async_trait]
impl TargetInvoker for LocalInvoker {
    async fn invoke(
        &self,
        endpoint: Option<&EndpointId>,
        payload: Vec<u8>,
    ) -> Result<Vec<u8>, InvokeError> {
        let endpoint = endpoint.ok_or(InvokeError::TargetNotRegistered)?;
        let handler = self
            .handlers
            .get(endpoint)
            .ok_or_else(|| InvokeError::UnknownEndpoint(endpoint.clone()))?;

        let request = InvocationRequest::decode(&payload)?;
        let body = handler
            .handle(request)
            .await
            .map_err(|message| InvokeError::Target {
                endpoint: endpoint.clone(),
                message,
            })?;
        Ok(serde_json::to_vec(&body)?)
    }
}
