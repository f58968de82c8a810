//! Config - figment で読み込む設定
//!
//! 優先順位（後勝ち）: 既定値 → TOML ファイル → `HERALD_` 環境変数（ネストは `__`）
//!
//! ```toml
//! [targets]
//! orders = "/usr/local/bin/close-order"
//!
//! [dispatcher]
//! tick_interval_secs = 60
//! max_concurrent_invocations = 16
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{Figment, Metadata, Profile, Provider, providers, providers::Format, value};
use serde::{Deserialize, Serialize};

use crate::app::{IntakePolicy, MAX_LEAD_MINUTES, TickConfig};
use crate::registry::TargetRegistry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// Target type to endpoint.
    pub targets: BTreeMap<String, String>,
    pub dispatcher: DispatcherConfig,
    pub store: StoreConfig,
    pub invoker: InvokerConfig,
    pub intake: IntakeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub tick_interval_secs: u64,
    pub align_to_minute: bool,
    /// Unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_invocations: Option<usize>,
    pub query_page_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokerConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeConfig {
    pub min_lead_minutes: i64,
    pub max_schedules_per_request: usize,
}

impl HeraldConfig {
    /// Reads the configuration from the file (TOML) and merges it with the
    /// default values and the environment. A missing file is not an error.
    pub fn read_from_file(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(HeraldConfig::default());
        if let Some(path) = path {
            figment = figment.merge(providers::Toml::file(path));
        }
        let config: Self = figment
            .merge(providers::Env::prefixed("HERALD_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), figment::Error> {
        if self.dispatcher.tick_interval_secs == 0 {
            return Err("dispatcher.tick_interval_secs must be at least 1".to_string().into());
        }
        if self.dispatcher.query_page_size == 0 {
            return Err("dispatcher.query_page_size must be at least 1".to_string().into());
        }
        if self.dispatcher.max_concurrent_invocations == Some(0) {
            return Err("dispatcher.max_concurrent_invocations must be at least 1"
                .to_string()
                .into());
        }
        if !(0..=MAX_LEAD_MINUTES).contains(&self.intake.min_lead_minutes) {
            return Err(
                format!("intake.min_lead_minutes must be between 0 and {MAX_LEAD_MINUTES}").into(),
            );
        }
        if self.intake.max_schedules_per_request == 0 {
            return Err("intake.max_schedules_per_request must be at least 1"
                .to_string()
                .into());
        }
        Ok(())
    }

    pub fn registry(&self) -> TargetRegistry {
        TargetRegistry::from(&self.targets)
    }

    pub fn tick_config(&self) -> TickConfig {
        TickConfig {
            interval: Duration::from_secs(self.dispatcher.tick_interval_secs),
            align_to_minute: self.dispatcher.align_to_minute,
        }
    }

    pub fn intake_policy(&self) -> IntakePolicy {
        IntakePolicy {
            min_lead_minutes: self.intake.min_lead_minutes,
            max_schedules_per_request: self.intake.max_schedules_per_request,
        }
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoker.timeout_secs)
    }
}

impl Default for HeraldConfig {
    fn default() -> Self {
        let intake = IntakePolicy::default();
        Self {
            targets: BTreeMap::new(),
            dispatcher: DispatcherConfig {
                tick_interval_secs: 60,
                align_to_minute: true,
                max_concurrent_invocations: None,
                query_page_size: crate::impls::inmem_store::DEFAULT_PAGE_SIZE,
            },
            store: StoreConfig {
                path: PathBuf::from("herald-jobs.json"),
            },
            invoker: InvokerConfig { timeout_secs: 30 },
            intake: IntakeConfig {
                min_lead_minutes: intake.min_lead_minutes,
                max_schedules_per_request: intake.max_schedules_per_request,
            },
        }
    }
}

impl Provider for HeraldConfig {
    fn metadata(&self) -> Metadata {
        Metadata::named("Herald configuration")
    }

    fn data(&self) -> Result<value::Map<Profile, value::Dict>, figment::Error> {
        providers::Serialized::defaults(Self::default()).data()
    }
}
