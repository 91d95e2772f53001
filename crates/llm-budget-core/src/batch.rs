use serde::{Deserialize, Serialize};

use crate::error::{BudgetError, Result};

/// One task plus the supporting context it should be answered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub context: String,
}

impl Query {
    pub fn new(text: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            context: context.into(),
        }
    }
}

/// Ordered queries submitted to one `generate` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryBatch {
    #[serde(rename = "query", default)]
    queries: Vec<Query>,
}

impl QueryBatch {
    pub fn new(queries: Vec<Query>) -> Self {
        Self { queries }
    }

    /// Zip parallel query and context lists. Lengths must match.
    pub fn from_parallel<Q, C>(queries: Vec<Q>, contexts: Vec<C>) -> Result<Self>
    where
        Q: Into<String>,
        C: Into<String>,
    {
        if queries.len() != contexts.len() {
            return Err(BudgetError::Config(format!(
                "{} queries but {} contexts",
                queries.len(),
                contexts.len()
            )));
        }
        Ok(Self::new(
            queries
                .into_iter()
                .zip(contexts)
                .map(|(q, c)| Query::new(q, c))
                .collect(),
        ))
    }

    /// Parse a batch file: `[[query]]` tables with `text` and `context`.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| BudgetError::Config(format!("bad batch file: {e}")))
    }

    pub fn queries(&self) -> &[Query] {
        &self.queries
    }

    pub fn get(&self, idx: usize) -> Option<&Query> {
        self.queries.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Query> {
        self.queries.iter()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
