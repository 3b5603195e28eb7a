use std::time::Duration;

use graphql_stitching_schema::TypeConflictStrategy;

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StitchingConfig {
    pub batching: BatchingConfig,
    /// Bound on the follow-up rounds completing partially resolved objects.
    pub max_resolution_rounds: usize,
    /// Executor timeout for subschemas that do not set their own.
    #[serde(deserialize_with = "duration_str::deserialize_option_duration")]
    pub default_timeout: Option<Duration>,
    /// What to do when subschemas disagree on the kind of a type.
    pub type_conflict: TypeConflictStrategy,
}

impl Default for StitchingConfig {
    fn default() -> Self {
        Self {
            batching: BatchingConfig::default(),
            max_resolution_rounds: 8,
            default_timeout: None,
            type_conflict: TypeConflictStrategy::default(),
        }
    }
}

impl StitchingConfig {
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatchingConfig {
    /// When false, every subschema is treated as non-batchable.
    pub enabled: bool,
    /// Larger groups are split into several combined operations.
    pub max_batch_size: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults() {
        let config = StitchingConfig::from_toml("").unwrap();
        assert_eq!(config, StitchingConfig::default());
        assert!(config.batching.enabled);
        assert_eq!(config.batching.max_batch_size, 100);
        assert_eq!(config.max_resolution_rounds, 8);
        assert_eq!(config.default_timeout, None);
        assert_eq!(config.type_conflict, TypeConflictStrategy::Error);
    }

    #[test]
    fn full() {
        let config = StitchingConfig::from_toml(
            r#"
            max_resolution_rounds = 3
            default_timeout = "30s"
            type_conflict = "last_wins"

            [batching]
            enabled = false
            max_batch_size = 10
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            StitchingConfig {
                batching: BatchingConfig {
                    enabled: false,
                    max_batch_size: 10,
                },
                max_resolution_rounds: 3,
                default_timeout: Some(Duration::from_secs(30)),
                type_conflict: TypeConflictStrategy::LastWins,
            }
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = StitchingConfig::from_toml("[batching]\nsize = 3").unwrap_err();
        assert!(error.to_string().contains("unknown field `size`"), "{error}");
    }
}
