use crate::provider::ProviderError;

#[derive(Debug, thiserror::Error)]
pub enum BudgetError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown model: {0} (no entry in the price table)")]
    UnknownModel(String),

    #[error("tokenizer failed for {model}: {message}")]
    Tokenization { model: String, message: String },

    #[error("budget exceeded: no model tier could be selected")]
    BudgetExhausted,

    #[error("provider failed after {attempts} attempts: {source}")]
    ProviderFatal {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("provider error: {0}")]
    Provider(#[source] ProviderError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, BudgetError>;
