//! Per-call request configuration, credentials and budget.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{BudgetError, Result};
use crate::provider::ChatMessage;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BUDGET_ENV: &str = "OPENAI_BUDGET";

/// Keys accepted by [`RequestOptions::from_overrides`].
pub const ALLOWED_KEYS: &[&str] = &["model", "temperature", "max_tokens", "messages"];

/// Sampling settings and seed messages for a completion session.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: usize,
    /// Messages placed ahead of every query's own messages.
    pub messages: Vec<ChatMessage>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.0,
            max_tokens: 1000,
            messages: Vec::new(),
        }
    }
}

impl RequestOptions {
    /// Defaults with `overrides` applied. Unknown keys and mistyped values are
    /// rejected.
    pub fn from_overrides(overrides: &BTreeMap<String, Value>) -> Result<Self> {
        let mut opts = Self::default();
        for (key, value) in overrides {
            match key.as_str() {
                "model" => opts.model = typed(key, value)?,
                "temperature" => opts.temperature = typed(key, value)?,
                "max_tokens" => opts.max_tokens = typed(key, value)?,
                "messages" => opts.messages = typed(key, value)?,
                other => {
                    return Err(BudgetError::Config(format!(
                        "unrecognized option `{other}` (allowed: {})",
                        ALLOWED_KEYS.join(", ")
                    )))
                }
            }
        }
        if opts.model.is_empty() {
            return Err(BudgetError::Config("model must not be empty".into()));
        }
        if !opts.temperature.is_finite() || opts.temperature < 0.0 {
            return Err(BudgetError::Config(format!(
                "temperature must be a non-negative number, got {}",
                opts.temperature
            )));
        }
        Ok(opts)
    }
}

fn typed<T: for<'de> Deserialize<'de>>(key: &str, value: &Value) -> Result<T> {
    T::deserialize(value).map_err(|e| BudgetError::Config(format!("invalid value for `{key}`: {e}")))
}

/// Parse `key=value` into an override entry. The value is read as JSON when
/// it parses, otherwise taken as a plain string.
pub fn parse_override(arg: &str) -> Result<(String, Value)> {
    let (key, raw) = arg
        .split_once('=')
        .ok_or_else(|| BudgetError::Config(format!("expected key=value, got `{arg}`")))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

/// Use `explicit` when non-empty, otherwise `$OPENAI_API_KEY`.
pub fn resolve_api_key(explicit: Option<&str>) -> Result<String> {
    resolve_api_key_with(explicit, |k| std::env::var(k).ok())
}

pub fn resolve_api_key_with(
    explicit: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    explicit
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| env(API_KEY_ENV).filter(|k| !k.is_empty()))
        .ok_or_else(|| {
            BudgetError::Config(format!(
                "no API key: pass one explicitly or set ${API_KEY_ENV}"
            ))
        })
}

/// Read the dollar budget from `$OPENAI_BUDGET`.
pub fn read_budget() -> Result<f64> {
    parse_budget(std::env::var(BUDGET_ENV).ok().as_deref())
}

pub fn parse_budget(raw: Option<&str>) -> Result<f64> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| BudgetError::Config(format!("no budget: set ${BUDGET_ENV}")))?;
    let budget: f64 = raw
        .parse()
        .map_err(|_| BudgetError::Config(format!("${BUDGET_ENV} is not a number: `{raw}`")))?;
    if !budget.is_finite() {
        return Err(BudgetError::Config(format!("${BUDGET_ENV} must be finite, got {raw}")));
    }
    Ok(budget)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn overrides(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn defaults() {
        let opts = RequestOptions::from_overrides(&BTreeMap::new()).unwrap();
        assert_eq!(opts, RequestOptions::default());
        assert_eq!(opts.model, "gpt-3.5-turbo");
        assert_eq!(opts.max_tokens, 1000);
        assert!(opts.messages.is_empty());
    }

    #[test]
    fn applies_overrides() {
        let opts = RequestOptions::from_overrides(&overrides(&[
            ("model", json!("gpt-4")),
            ("temperature", json!(0.7)),
            ("max_tokens", json!(256)),
            ("messages", json!([{"role": "system", "content": "be terse"}])),
        ]))
        .unwrap();
        assert_eq!(opts.model, "gpt-4");
        assert_eq!(opts.temperature, 0.7);
        assert_eq!(opts.max_tokens, 256);
        assert_eq!(opts.messages, vec![ChatMessage::system("be terse")]);
    }

    #[test]
    fn rejects_unknown_key() {
        let err = RequestOptions::from_overrides(&overrides(&[("top_p", json!(0.9))])).unwrap_err();
        assert!(err.to_string().contains("top_p"), "{err}");
    }

    #[test]
    fn rejects_mistyped_value() {
        let err =
            RequestOptions::from_overrides(&overrides(&[("max_tokens", json!("lots"))])).unwrap_err();
        assert!(matches!(err, BudgetError::Config(_)));
        assert!(RequestOptions::from_overrides(&overrides(&[("max_tokens", json!(-1))])).is_err());
        assert!(RequestOptions::from_overrides(&overrides(&[("temperature", json!(-0.5))])).is_err());
    }

    #[test]
    fn parse_override_values() {
        assert_eq!(parse_override("max_tokens=200").unwrap(), ("max_tokens".into(), json!(200)));
        assert_eq!(parse_override("model=gpt-4").unwrap(), ("model".into(), json!("gpt-4")));
        assert!(parse_override("model").is_err());
    }

    #[test]
    fn explicit_key_wins() {
        let key = resolve_api_key_with(Some("sk-explicit"), |_| Some("sk-env".into())).unwrap();
        assert_eq!(key, "sk-explicit");
    }

    #[test]
    fn empty_explicit_key_falls_back_to_env() {
        let key = resolve_api_key_with(Some(""), |k| {
            assert_eq!(k, API_KEY_ENV);
            Some("sk-env".into())
        })
        .unwrap();
        assert_eq!(key, "sk-env");
    }

    #[test]
    fn missing_key_is_config_error() {
        assert!(matches!(resolve_api_key_with(None, |_| None), Err(BudgetError::Config(_))));
        assert!(matches!(
            resolve_api_key_with(Some(""), |_| Some(String::new())),
            Err(BudgetError::Config(_))
        ));
    }

    #[test]
    fn budget_parsing() {
        assert_eq!(parse_budget(Some("10")).unwrap(), 10.0);
        assert_eq!(parse_budget(Some(" 0.25 ")).unwrap(), 0.25);
        assert!(matches!(parse_budget(None), Err(BudgetError::Config(_))));
        assert!(parse_budget(Some("")).is_err());
        assert!(parse_budget(Some("ten")).is_err());
        assert!(parse_budget(Some("inf")).is_err());
    }
}
