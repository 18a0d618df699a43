//! Algorithm catalog for explicit dependency injection.
//!
//! The [`AlgorithmCatalog`] maps algorithm type names (`INLINE`, `SNOWFLAKE`,
//! ...) to constructors. It is built explicitly and handed to
//! [`ShardingRule::new`](crate::rule::ShardingRule::new) rather than living
//! in a global registry, so tests can register their own algorithms and
//! swap the clock or worker id source.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut catalog = AlgorithmCatalog::with_builtins();
//! catalog.register_sharding("MOD_TEN", |_props| {
//!     Ok(ShardingAlgorithm::Standard(Arc::new(ModTen)))
//! });
//! let rule = ShardingRule::new(&config, &catalog, &InlineDataNodeExpander)?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AlgorithmConfig;
use crate::error::{Result, ShardingError};
use crate::keygen::{
    snowflake, Clock, KeyGenerator, KeyGeneratorContext, SnowflakeKeyGenerator, WorkerIdProvider,
};

use super::audit::{self, DmlShardingConditionsAuditor, ShardingAuditAlgorithm};
use super::props::Properties;
use super::{
    auto_interval, complex_inline, hint_inline, inline, volume_range,
    AutoIntervalShardingAlgorithm, ComplexInlineShardingAlgorithm, HintInlineShardingAlgorithm,
    InlineShardingAlgorithm, ShardingAlgorithm, VolumeRangeShardingAlgorithm,
};

type ShardingFactory = Arc<dyn Fn(&Properties) -> Result<ShardingAlgorithm> + Send + Sync>;
type KeyGeneratorFactory =
    Arc<dyn Fn(&Properties, &KeyGeneratorContext) -> Result<Arc<dyn KeyGenerator>> + Send + Sync>;
type AuditorFactory = Arc<dyn Fn(&Properties) -> Result<Arc<dyn ShardingAuditAlgorithm>> + Send + Sync>;

/// Registry of sharding, key generation and audit algorithms.
#[derive(Default)]
pub struct AlgorithmCatalog {
    /// Sharding algorithm constructors by uppercase type name.
    sharding: HashMap<String, ShardingFactory>,

    key_generators: HashMap<String, KeyGeneratorFactory>,

    auditors: HashMap<String, AuditorFactory>,

    /// Clock and worker id source handed to key generators.
    key_context: KeyGeneratorContext,
}

impl AlgorithmCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog with every built-in algorithm registered.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        catalog.register_sharding(inline::TYPE, |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(
                InlineShardingAlgorithm::new(props)?,
            )))
        });
        catalog.register_sharding(auto_interval::TYPE, |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(
                AutoIntervalShardingAlgorithm::new(props)?,
            )))
        });
        catalog.register_sharding(volume_range::TYPE, |props| {
            Ok(ShardingAlgorithm::Standard(Arc::new(
                VolumeRangeShardingAlgorithm::new(props)?,
            )))
        });
        catalog.register_sharding(complex_inline::TYPE, |props| {
            Ok(ShardingAlgorithm::Complex(Arc::new(
                ComplexInlineShardingAlgorithm::new(props)?,
            )))
        });
        catalog.register_sharding(hint_inline::TYPE, |props| {
            Ok(ShardingAlgorithm::Hint(Arc::new(
                HintInlineShardingAlgorithm::new(props)?,
            )))
        });

        catalog.register_key_generator(snowflake::TYPE, |props, context| {
            Ok(Arc::new(SnowflakeKeyGenerator::new(props, context)?))
        });

        catalog.register_auditor(audit::DML_SHARDING_CONDITIONS, |props| {
            Ok(Arc::new(DmlShardingConditionsAuditor::new(props)?))
        });

        catalog
    }

    /// Use `clock` for key generators created from now on.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.key_context.clock = clock;
        self
    }

    /// Resolve key generator worker ids through `provider`.
    pub fn with_worker_id_provider(mut self, provider: Arc<dyn WorkerIdProvider>) -> Self {
        self.key_context.worker_id_provider = Some(provider);
        self
    }

    /// Register a sharding algorithm type, replacing any existing one.
    pub fn register_sharding<F>(&mut self, algorithm_type: &str, factory: F)
    where
        F: Fn(&Properties) -> Result<ShardingAlgorithm> + Send + Sync + 'static,
    {
        self.sharding
            .insert(normalize(algorithm_type), Arc::new(factory));
    }

    /// Register a key generator type, replacing any existing one.
    pub fn register_key_generator<F>(&mut self, algorithm_type: &str, factory: F)
    where
        F: Fn(&Properties, &KeyGeneratorContext) -> Result<Arc<dyn KeyGenerator>>
            + Send
            + Sync
            + 'static,
    {
        self.key_generators
            .insert(normalize(algorithm_type), Arc::new(factory));
    }

    /// Register an audit algorithm type, replacing any existing one.
    pub fn register_auditor<F>(&mut self, algorithm_type: &str, factory: F)
    where
        F: Fn(&Properties) -> Result<Arc<dyn ShardingAuditAlgorithm>> + Send + Sync + 'static,
    {
        self.auditors
            .insert(normalize(algorithm_type), Arc::new(factory));
    }

    /// Instantiate a configured sharding algorithm.
    ///
    /// # Errors
    ///
    /// `AlgorithmInit` if the type is unknown or rejects its properties.
    pub fn create_sharding(&self, config: &AlgorithmConfig) -> Result<ShardingAlgorithm> {
        let factory = lookup(&self.sharding, &config.algorithm_type, "sharding")?;
        factory(&config.props)
    }

    pub fn create_key_generator(&self, config: &AlgorithmConfig) -> Result<Arc<dyn KeyGenerator>> {
        let factory = lookup(&self.key_generators, &config.algorithm_type, "key generate")?;
        factory(&config.props, &self.key_context)
    }

    pub fn create_auditor(&self, config: &AlgorithmConfig) -> Result<Arc<dyn ShardingAuditAlgorithm>> {
        let factory = lookup(&self.auditors, &config.algorithm_type, "audit")?;
        factory(&config.props)
    }

    /// Check if a sharding algorithm type is registered.
    pub fn has_sharding(&self, algorithm_type: &str) -> bool {
        self.sharding.contains_key(&normalize(algorithm_type))
    }

    /// Registered sharding algorithm types, sorted.
    pub fn sharding_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.sharding.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Registered key generator types, sorted.
    pub fn key_generator_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.key_generators.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

fn normalize(algorithm_type: &str) -> String {
    algorithm_type.trim().to_ascii_uppercase()
}

fn lookup<'a, F: ?Sized>(
    registry: &'a HashMap<String, Arc<F>>,
    algorithm_type: &str,
    family: &str,
) -> Result<&'a Arc<F>> {
    registry.get(&normalize(algorithm_type)).ok_or_else(|| {
        let mut known: Vec<&str> = registry.keys().map(String::as_str).collect();
        known.sort_unstable();
        ShardingError::algorithm_init(
            algorithm_type,
            format!(
                "unknown {} algorithm type (registered: {})",
                family,
                known.join(", ")
            ),
        )
    })
}

impl std::fmt::Debug for AlgorithmCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmCatalog")
            .field("sharding", &self.sharding_types())
            .field("key_generators", &self.key_generator_types())
            .field("auditors", &self.auditors.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{AlgorithmKind, StandardShardingAlgorithm};
    use crate::core::{ShardingRange, ShardingValue};
    use crate::keygen::{ManualClock, StaticWorkerId};

    fn config(algorithm_type: &str, props: Properties) -> AlgorithmConfig {
        AlgorithmConfig {
            algorithm_type: algorithm_type.to_string(),
            props,
        }
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = AlgorithmCatalog::new();
        assert!(!catalog.has_sharding("INLINE"));
        assert!(catalog.sharding_types().is_empty());
    }

    #[test]
    fn test_builtins_registered() {
        let catalog = AlgorithmCatalog::with_builtins();
        assert_eq!(
            catalog.sharding_types(),
            vec![
                "AUTO_INTERVAL",
                "COMPLEX_INLINE",
                "HINT_INLINE",
                "INLINE",
                "VOLUME_RANGE"
            ]
        );
        assert!(catalog.has_sharding("inline"));
        assert_eq!(catalog.key_generator_types(), vec!["SNOWFLAKE"]);
    }

    #[test]
    fn test_create_dispatches_by_kind() {
        let catalog = AlgorithmCatalog::with_builtins();
        let alg = catalog
            .create_sharding(&config(
                "complex_inline",
                Properties::new()
                    .with("sharding-columns", "a,b")
                    .with("algorithm-expression", "t_${a + b}"),
            ))
            .unwrap();
        assert_eq!(alg.kind(), AlgorithmKind::Complex);
        assert_eq!(alg.algorithm_type(), "COMPLEX_INLINE");
    }

    #[test]
    fn test_unknown_type_is_init_error() {
        let catalog = AlgorithmCatalog::with_builtins();
        let err = catalog
            .create_sharding(&config("MOD", Properties::new()))
            .unwrap_err();
        assert!(err.to_string().contains("unknown sharding algorithm type"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_custom_registration() {
        #[derive(Debug)]
        struct First;

        impl StandardShardingAlgorithm for First {
            fn algorithm_type(&self) -> &str {
                "FIRST"
            }

            fn select_precise(
                &self,
                candidates: &[String],
                _column: &str,
                _value: &ShardingValue,
            ) -> Result<Option<String>> {
                Ok(candidates.first().cloned())
            }

            fn select_range(
                &self,
                candidates: &[String],
                _column: &str,
                _range: &ShardingRange,
            ) -> Result<Vec<String>> {
                Ok(candidates.iter().take(1).cloned().collect())
            }
        }

        let mut catalog = AlgorithmCatalog::new();
        catalog.register_sharding("first", |_| Ok(ShardingAlgorithm::Standard(Arc::new(First))));
        let alg = catalog
            .create_sharding(&config("FIRST", Properties::new()))
            .unwrap();
        assert_eq!(alg.kind(), AlgorithmKind::Standard);
    }

    #[test]
    fn test_key_generator_uses_injected_context() {
        let clock = Arc::new(ManualClock::new(snowflake::EPOCH_MILLIS + 1));
        let catalog = AlgorithmCatalog::with_builtins()
            .with_clock(clock)
            .with_worker_id_provider(Arc::new(StaticWorkerId(3)));
        let generator = catalog
            .create_key_generator(&config("snowflake", Properties::new()))
            .unwrap();
        let key = generator.generate_key().unwrap();
        assert_eq!(key, (1 << 22) | (3 << 12));
    }
}
