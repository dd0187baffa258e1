//! 🔧 Handler configuration: the static half of every resolution strategy.
//!
//! Everything in here is plain serde, so it can come from a TOML file, from env vars,
//! or from a struct literal in someone's test. The dynamic half (resolver closures,
//! lifecycle hooks) can't be written in TOML and lives on the `HandlerBuilder` instead.
//!
//! Validated once, at construction. Immutable after that. Like a tattoo.

use std::collections::BTreeMap;
use std::time::Duration;

use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::fields::{FieldSpec, ImageKind, default_lookup_order};

/// 📦 Options that decide how each change record becomes a bulk action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// 📡 Extra bulk-call parameters (`refresh`, `pipeline`, `timeout`, ...), sent with every submission.
    #[serde(default)]
    pub bulk: BTreeMap<String, String>,
    /// 🧵 Joins multi-field ids, index names and type names.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// 📎 Prepended to computed index names. Not to static ones.
    #[serde(default)]
    pub index_prefix: String,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub id_field: Option<FieldSpec>,
    #[serde(default)]
    pub index_field: Option<FieldSpec>,
    #[serde(default)]
    pub type_field: Option<FieldSpec>,
    #[serde(default)]
    pub parent_field: Option<String>,
    #[serde(default)]
    pub version_field: Option<String>,
    /// 🔎 Where the field resolver looks, in order.
    #[serde(default = "default_lookup_order")]
    pub lookup_order: Vec<ImageKind>,
    /// 🧺 Keep only these fields of the new image in the indexed document.
    #[serde(default)]
    pub pick_fields: Option<Vec<String>>,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_separator() -> String {
    ".".to_string()
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            bulk: BTreeMap::new(),
            separator: default_separator(),
            index_prefix: String::new(),
            index: None,
            doc_type: None,
            id_field: None,
            index_field: None,
            type_field: None,
            parent_field: None,
            version_field: None,
            lookup_order: default_lookup_order(),
            pick_fields: None,
            retry: RetryConfig::default(),
        }
    }
}

impl HandlerConfig {
    /// 🔒 The construction-time guard. Returns the first problem it finds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.as_deref().is_none_or(str::is_empty) && self.index_field.is_none() {
            return Err(ConfigError::MissingIndex);
        }
        if self.separator.is_empty() {
            return Err(ConfigError::EmptySeparator);
        }
        for (option, spec) in [
            ("id_field", &self.id_field),
            ("index_field", &self.index_field),
            ("type_field", &self.type_field),
        ] {
            if spec.as_ref().is_some_and(|spec| !spec.is_valid()) {
                return Err(ConfigError::EmptyFieldSpec { option });
            }
        }
        for (option, field) in [
            ("parent_field", &self.parent_field),
            ("version_field", &self.version_field),
        ] {
            if field.as_deref().is_some_and(str::is_empty) {
                return Err(ConfigError::EmptyFieldSpec { option });
            }
        }
        if let Some(pick_fields) = &self.pick_fields {
            if pick_fields.iter().any(String::is_empty) {
                return Err(ConfigError::EmptyFieldSpec {
                    option: "pick_fields",
                });
            }
        }
        let mut seen = Vec::with_capacity(self.lookup_order.len());
        for kind in &self.lookup_order {
            if seen.contains(kind) {
                break;
            }
            seen.push(*kind);
        }
        if self.lookup_order.is_empty() || seen.len() != self.lookup_order.len() {
            return Err(ConfigError::InvalidLookupOrder {
                got: self.lookup_order.iter().map(|k| format!("{k:?}")).collect(),
            });
        }
        self.retry.validate()
    }
}

/// 🔄 How hard to try the bulk call before giving up.
///
/// `retries` is the number of *extra* attempts: 0 means one attempt, no second chances.
/// Delays grow by `factor` from `min_timeout_ms`, capped at `max_timeout_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_factor")]
    pub factor: f64,
    #[serde(default = "default_min_timeout_ms")]
    pub min_timeout_ms: u64,
    #[serde(default = "default_max_timeout_ms")]
    pub max_timeout_ms: u64,
    /// 🎲 Jitter each delay by up to 50% in either direction.
    #[serde(default)]
    pub randomize: bool,
}

const MAX_RETRIES: u32 = 100;

fn default_factor() -> f64 {
    2.0
}

fn default_min_timeout_ms() -> u64 {
    1000
}

fn default_max_timeout_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            factor: default_factor(),
            min_timeout_ms: default_min_timeout_ms(),
            max_timeout_ms: default_max_timeout_ms(),
            randomize: false,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let reason = if self.retries > MAX_RETRIES {
            format!("retries must be at most {MAX_RETRIES}, got {}", self.retries)
        } else if !self.factor.is_finite() || self.factor < 1.0 {
            format!("factor must be a finite number >= 1, got {}", self.factor)
        } else if self.min_timeout_ms > self.max_timeout_ms {
            format!(
                "min_timeout_ms ({}) must not exceed max_timeout_ms ({})",
                self.min_timeout_ms, self.max_timeout_ms
            )
        } else {
            return Ok(());
        };
        Err(ConfigError::InvalidRetry { reason })
    }

    /// ⏳ A fresh backoff schedule for one submission. Never gives up on its own;
    /// the attempt counter decides when we stop.
    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.min_timeout_ms))
            .with_multiplier(self.factor)
            .with_max_interval(Duration::from_millis(self.max_timeout_ms))
            .with_randomization_factor(if self.randomize { 0.5 } else { 0.0 })
            .with_max_elapsed_time(None)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Backoff;

    fn with_index() -> HandlerConfig {
        HandlerConfig {
            index: Some("things".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn the_one_where_a_minimal_config_passes_inspection() {
        assert_eq!(with_index().validate(), Ok(()));
        let computed = HandlerConfig {
            index_field: Some("table".into()),
            ..Default::default()
        };
        assert_eq!(computed.validate(), Ok(()));
    }

    #[test]
    fn the_one_where_no_index_means_no_entry() {
        assert_eq!(HandlerConfig::default().validate(), Err(ConfigError::MissingIndex));
        let blank = HandlerConfig {
            index: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(blank.validate(), Err(ConfigError::MissingIndex));
    }

    #[test]
    fn the_one_where_empty_specs_are_turned_away_at_the_door() {
        let cases = [
            (
                HandlerConfig {
                    id_field: Some(FieldSpec::Many(vec![])),
                    ..with_index()
                },
                "id_field",
            ),
            (
                HandlerConfig {
                    type_field: Some("".into()),
                    ..with_index()
                },
                "type_field",
            ),
            (
                HandlerConfig {
                    version_field: Some(String::new()),
                    ..with_index()
                },
                "version_field",
            ),
            (
                HandlerConfig {
                    pick_fields: Some(vec!["ok".to_string(), String::new()]),
                    ..with_index()
                },
                "pick_fields",
            ),
        ];
        for (config, option) in cases {
            assert_eq!(config.validate(), Err(ConfigError::EmptyFieldSpec { option }));
        }
    }

    #[test]
    fn the_one_where_separator_and_lookup_order_have_standards() {
        let no_separator = HandlerConfig {
            separator: String::new(),
            ..with_index()
        };
        assert_eq!(no_separator.validate(), Err(ConfigError::EmptySeparator));

        let twice = HandlerConfig {
            lookup_order: vec![ImageKind::Keys, ImageKind::Keys],
            ..with_index()
        };
        assert!(matches!(
            twice.validate(),
            Err(ConfigError::InvalidLookupOrder { .. })
        ));

        let nowhere = HandlerConfig {
            lookup_order: vec![],
            ..with_index()
        };
        assert!(matches!(
            nowhere.validate(),
            Err(ConfigError::InvalidLookupOrder { .. })
        ));
    }

    #[test]
    fn the_one_where_retry_policies_must_make_sense() {
        for retry in [
            RetryConfig {
                retries: 101,
                ..Default::default()
            },
            RetryConfig {
                factor: 0.5,
                ..Default::default()
            },
            RetryConfig {
                min_timeout_ms: 10,
                max_timeout_ms: 5,
                ..Default::default()
            },
        ] {
            let config = HandlerConfig { retry, ..with_index() };
            assert!(matches!(config.validate(), Err(ConfigError::InvalidRetry { .. })));
        }
    }

    #[test]
    fn the_one_where_backoff_grows_then_hits_the_ceiling() {
        let retry = RetryConfig {
            retries: 5,
            factor: 2.0,
            min_timeout_ms: 100,
            max_timeout_ms: 300,
            randomize: false,
        };
        let mut backoff = retry.backoff();
        let delays: Vec<u128> = (0..4)
            .filter_map(|_| backoff.next_backoff())
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 300, 300]);
    }

    #[test]
    fn the_one_where_defaults_match_the_fine_print() -> anyhow::Result<()> {
        let config: HandlerConfig = serde_json::from_value(serde_json::json!({"index": "x"}))?;
        assert_eq!(config.separator, ".");
        assert_eq!(config.index_prefix, "");
        assert_eq!(config.retry.retries, 0);
        assert_eq!(config.lookup_order, default_lookup_order());
        assert_eq!(config, HandlerConfig { index: Some("x".to_string()), ..Default::default() });
        Ok(())
    }
}
