//! TargetRegistry - target_type から endpoint への対応表
//!
//! 設定時に組み立てて、実行時は不変のまま `Arc` で共有する。
//! ディスパッチャはサイクル開始時に 1 回だけスナップショットを取る。

use std::collections::{BTreeMap, HashMap};

use crate::domain::{EndpointId, TargetType};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("target type '{0}' is already registered")]
    AlreadyRegistered(TargetType),
}

/// Immutable `target type -> endpoint` mapping.
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during dispatch (immutable, shared).
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    endpoints: HashMap<TargetType, EndpointId>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self {
            endpoints: HashMap::new(),
        }
    }

    /// Registers an endpoint for a target type. A second registration of the
    /// same type is an error.
    pub fn register(
        &mut self,
        target_type: TargetType,
        endpoint: EndpointId,
    ) -> Result<(), RegistryError> {
        if self.endpoints.contains_key(&target_type) {
            return Err(RegistryError::AlreadyRegistered(target_type));
        }
        self.endpoints.insert(target_type, endpoint);
        Ok(())
    }

    /// Chaining form of `register`.
    pub fn with(mut self, target_type: &str, endpoint: &str) -> Result<Self, RegistryError> {
        self.register(TargetType::new(target_type), EndpointId::new(endpoint))?;
        Ok(self)
    }

    pub fn resolve(&self, target_type: &TargetType) -> Option<&EndpointId> {
        self.endpoints.get(target_type)
    }

    pub fn contains(&self, target_type: &str) -> bool {
        self.endpoints.contains_key(&TargetType::new(target_type))
    }

    /// Registered target types, sorted.
    pub fn target_types(&self) -> Vec<TargetType> {
        let mut types: Vec<TargetType> = self.endpoints.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl From<&BTreeMap<String, String>> for TargetRegistry {
    /// Map keys are unique, so this never hits `AlreadyRegistered`.
    fn from(targets: &BTreeMap<String, String>) -> Self {
        Self {
            endpoints: targets
                .iter()
                .map(|(target_type, endpoint)| {
                    (TargetType::new(target_type), EndpointId::new(endpoint))
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_resolve() {
        let registry = TargetRegistry::new().with("A", "fn-a").unwrap();
        assert_eq!(
            registry.resolve(&TargetType::new("A")),
            Some(&EndpointId::new("fn-a"))
        );
        assert!(registry.resolve(&TargetType::new("B")).is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let result = TargetRegistry::new().with("A", "fn-a").unwrap().with("A", "fn-b");
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(t)) if t.as_str() == "A"));
    }

    #[test]
    fn built_from_config_map() {
        let mut targets = BTreeMap::new();
        targets.insert("b".to_string(), "fn-b".to_string());
        targets.insert("a".to_string(), "fn-a".to_string());

        let registry = TargetRegistry::from(&targets);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.target_types(),
            vec![TargetType::new("a"), TargetType::new("b")]
        );
        assert!(registry.contains("b"));
    }

    #[test]
    fn empty_registry() {
        let registry = TargetRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.target_types().is_empty());
    }
}
