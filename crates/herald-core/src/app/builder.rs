//! DispatcherBuilder - Dispatcher の構築とワイヤリング
//!
//! # 起動時検証（Fail-fast）
//! - store / invoker が未設定なら build() で失敗
//! - expect_targets() で期待した target_type が registry に無ければ失敗
//! - 同時実行数 0 は設定ミスとして扱う

use std::sync::Arc;

use super::dispatcher::Dispatcher;
use crate::domain::{EndpointId, TargetType};
use crate::ports::{Clock, JobStore, SystemClock, TargetInvoker};
use crate::registry::{RegistryError, TargetRegistry};

/// DispatcherBuilder は Dispatcher を構築
///
/// # 使用例
/// ```ignore
/// let dispatcher = DispatcherBuilder::new()
///     .store(store)
///     .invoker(invoker)
///     .target("orders", "fn-orders")?
///     .expect_targets(&["orders"])
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    store: Option<Arc<dyn JobStore>>,
    invoker: Option<Arc<dyn TargetInvoker>>,
    registry: TargetRegistry,
    clock: Option<Arc<dyn Clock>>,
    max_concurrent_invocations: Option<usize>,
    expected_targets: Option<Vec<String>>,
}

/// BuildError は Dispatcher 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no job store configured")]
    MissingStore,

    #[error("no target invoker configured")]
    MissingInvoker,

    #[error("Missing target types: {0:?}. These targets were expected but not registered.")]
    MissingTargets(Vec<String>),

    #[error("max_concurrent_invocations must be at least 1")]
    ZeroConcurrency,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            invoker: None,
            registry: TargetRegistry::new(),
            clock: None,
            max_concurrent_invocations: None,
            expected_targets: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn invoker(mut self, invoker: Arc<dyn TargetInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    /// Replaces the whole registry, e.g. one built from configuration.
    pub fn registry(mut self, registry: TargetRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Target を登録
    pub fn target(mut self, target_type: &str, endpoint: &str) -> Result<Self, RegistryError> {
        self.registry
            .register(TargetType::new(target_type), EndpointId::new(endpoint))?;
        Ok(self)
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Unbounded when never called.
    pub fn max_concurrent_invocations(mut self, limit: usize) -> Self {
        self.max_concurrent_invocations = Some(limit);
        self
    }

    /// 期待される target_type のリストを設定
    pub fn expect_targets(mut self, target_types: &[&str]) -> Self {
        self.expected_targets = Some(target_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let invoker = self.invoker.ok_or(BuildError::MissingInvoker)?;

        if let Some(expected) = &self.expected_targets {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingTargets(missing));
            }
        }

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let dispatcher = Dispatcher::new(store, invoker, Arc::new(self.registry), clock);

        match self.max_concurrent_invocations {
            Some(0) => Err(BuildError::ZeroConcurrency),
            Some(limit) => Ok(dispatcher.with_concurrency_limit(limit)),
            None => Ok(dispatcher),
        }
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
