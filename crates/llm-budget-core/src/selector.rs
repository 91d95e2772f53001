//! Budget-aware model tier selection.
//!
//! For the query at `position`, tiers are tried cheapest first. A tier is
//! accepted when its worst-case cost for this query, plus the worst-case
//! cost of every later query at the most expensive tier, fits the remaining
//! budget. The tail is always priced at the top tier, whatever the current
//! query ends up using.

use tracing::{debug, info, warn};

use crate::batch::QueryBatch;
use crate::error::{BudgetError, Result};
use crate::estimate::CostEstimator;
use crate::pricing::ModelTier;

/// Outcome of selecting a tier for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub tier: ModelTier,
    /// Worst-case cost of the current query on `tier`.
    pub query_cost: f64,
    /// Worst-case cost of all later queries at the most expensive tier.
    pub rest_cost: f64,
    /// False when no tier fit and the most expensive one was used anyway.
    pub within_budget: bool,
}

impl Selection {
    pub fn worst_case_cost(&self) -> f64 {
        self.query_cost + self.rest_cost
    }
}

/// Pick the cheapest tier whose worst-case total stays within
/// `remaining_budget`, or the most expensive tier when none does.
pub fn select_model(
    estimator: &CostEstimator<'_>,
    position: usize,
    remaining_budget: f64,
    batch: &QueryBatch,
    prompt: Option<&str>,
) -> Result<Selection> {
    let prices = estimator.prices();
    let top = prices.most_expensive().ok_or(BudgetError::BudgetExhausted)?;
    let query = batch.get(position).ok_or_else(|| {
        BudgetError::Config(format!(
            "query position {position} out of range for a batch of {}",
            batch.len()
        ))
    })?;

    let rest_cost = rest_cost(estimator, &top.model, position, batch)?;

    let mut query_cost = 0.0;
    for tier in prices.tiers() {
        query_cost = estimator
            .estimate_max_cost(&tier.model, prompt, &query.text, &query.context)?
            .dollars;
        let slack = remaining_budget - (query_cost + rest_cost);
        debug!(
            position,
            model = %tier.model,
            query_cost,
            rest_cost,
            slack,
            "evaluated tier"
        );
        if slack >= 0.0 {
            info!(position, model = %tier.model, remaining_budget, "selected tier");
            return Ok(Selection {
                tier: tier.clone(),
                query_cost,
                rest_cost,
                within_budget: true,
            });
        }
    }

    warn!(
        position,
        model = %top.model,
        remaining_budget,
        "no tier fits the remaining budget, falling back to most expensive"
    );
    Ok(Selection {
        tier: top.clone(),
        query_cost,
        rest_cost,
        within_budget: false,
    })
}

/// Worst-case cost of every query after `position`, all on `model`, each
/// with the default system prompt.
fn rest_cost(
    estimator: &CostEstimator<'_>,
    model: &str,
    position: usize,
    batch: &QueryBatch,
) -> Result<f64> {
    batch
        .iter()
        .skip(position + 1)
        .map(|q| {
            estimator
                .estimate_max_cost(model, None, &q.text, &q.context)
                .map(|e| e.dollars)
        })
        .sum()
}

/// One row of a dry-run plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub position: usize,
    pub selection: Selection,
    /// Budget left after charging this query's worst-case cost.
    pub remaining_after: f64,
}

/// Walk the batch without calling a provider, charging each query its
/// worst-case cost on the selected tier.
pub fn plan(
    estimator: &CostEstimator<'_>,
    batch: &QueryBatch,
    prompt: Option<&str>,
    budget: f64,
) -> Result<Vec<PlanStep>> {
    let mut remaining = budget;
    let mut steps = Vec::with_capacity(batch.len());
    for position in 0..batch.len() {
        let selection = select_model(estimator, position, remaining, batch, prompt)?;
        remaining -= selection.query_cost;
        steps.push(PlanStep {
            position,
            selection,
            remaining_after: remaining,
        });
    }
    Ok(steps)
}
