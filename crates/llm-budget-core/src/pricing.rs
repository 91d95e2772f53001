use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BudgetError, Result};

/// A chat model tier from pricing.toml.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ModelTier {
    pub model: String,
    /// USD per prompt token.
    pub input_cost_per_token: f64,
    /// USD per completion token.
    pub output_cost_per_token: f64,
    /// Position in the table, 0 = cheapest. Assigned at load time.
    #[serde(skip)]
    pub rank: usize,
}

impl ModelTier {
    pub fn cost(&self, input_tokens: usize, output_tokens: usize) -> f64 {
        self.input_cost_per_token * input_tokens as f64
            + self.output_cost_per_token * output_tokens as f64
    }
}

#[derive(Debug, Deserialize)]
struct PricingFile {
    tier: Vec<ModelTier>,
}

/// Ordered model tiers, cheapest first.
#[derive(Debug, Clone)]
pub struct PriceTable {
    tiers: Vec<ModelTier>,
}

impl PriceTable {
    /// Build a table from tiers already in ascending price order.
    pub fn new(tiers: Vec<ModelTier>) -> Result<Self> {
        let tiers: Vec<ModelTier> = tiers
            .into_iter()
            .enumerate()
            .map(|(rank, t)| ModelTier { rank, ..t })
            .collect();
        validate(&tiers)?;
        Ok(Self { tiers })
    }

    pub fn get(&self, model: &str) -> Result<&ModelTier> {
        self.tiers
            .iter()
            .find(|t| t.model == model)
            .ok_or_else(|| BudgetError::UnknownModel(model.to_string()))
    }

    pub fn contains(&self, model: &str) -> bool {
        self.tiers.iter().any(|t| t.model == model)
    }

    pub fn tiers(&self) -> &[ModelTier] {
        &self.tiers
    }

    pub fn cheapest(&self) -> Option<&ModelTier> {
        self.tiers.first()
    }

    pub fn most_expensive(&self) -> Option<&ModelTier> {
        self.tiers.last()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

fn validate(tiers: &[ModelTier]) -> Result<()> {
    if tiers.is_empty() {
        return Err(BudgetError::Config("price table has no tiers".into()));
    }
    let mut seen = HashSet::new();
    for t in tiers {
        if t.model.is_empty() {
            return Err(BudgetError::Config(format!("tier {} has an empty model id", t.rank)));
        }
        if !seen.insert(t.model.as_str()) {
            return Err(BudgetError::Config(format!("duplicate tier: {}", t.model)));
        }
        for (label, price) in [
            ("input_cost_per_token", t.input_cost_per_token),
            ("output_cost_per_token", t.output_cost_per_token),
        ] {
            if !price.is_finite() || price < 0.0 {
                return Err(BudgetError::Config(format!(
                    "{}: {label} must be a non-negative number, got {price}",
                    t.model
                )));
            }
        }
    }
    for w in tiers.windows(2) {
        if w[1].input_cost_per_token < w[0].input_cost_per_token
            || w[1].output_cost_per_token < w[0].output_cost_per_token
        {
            return Err(BudgetError::Config(format!(
                "tiers must be listed cheapest first: {} is cheaper than {}",
                w[1].model, w[0].model
            )));
        }
    }
    Ok(())
}

/// Load the price table from a pricing.toml file.
pub fn load_pricing(path: &Path) -> Result<PriceTable> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| BudgetError::Io(format!("{}: {e}", path.display())))?;
    parse_pricing(&content)
}

/// Parse and validate a price table from a TOML string.
pub fn parse_pricing(toml_str: &str) -> Result<PriceTable> {
    let file: PricingFile = toml::from_str(toml_str)
        .map_err(|e| BudgetError::Config(format!("bad pricing.toml: {e}")))?;
    PriceTable::new(file.tier)
}

/// Load the bundled pricing.toml from the data/ directory.
pub fn load_bundled_pricing() -> Result<PriceTable> {
    let toml_str = include_str!("../../../data/pricing.toml");
    parse_pricing(toml_str)
}

/// `<config dir>/llm-budget/pricing.toml`, e.g. `~/.config/llm-budget/pricing.toml`.
pub fn user_pricing_path() -> Option<std::path::PathBuf> {
    Some(dirs::config_dir()?.join("llm-budget").join("pricing.toml"))
}

/// Load the user's pricing.toml if one exists, otherwise the bundled table.
///
/// A user file that exists but fails validation is an error, not a silent
/// fallback.
pub fn load_pricing_cached() -> Result<PriceTable> {
    match user_pricing_path() {
        Some(path) if path.exists() => {
            tracing::debug!(path = %path.display(), "loading user price table");
            load_pricing(&path)
        }
        _ => load_bundled_pricing(),
    }
}
