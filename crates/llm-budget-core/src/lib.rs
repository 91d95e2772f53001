pub mod batch;
pub mod config;
pub mod error;
pub mod estimate;
#[cfg(feature = "network")]
pub mod openai;
pub mod pricing;
pub mod provider;
pub mod retry;
pub mod selector;
pub mod session;
pub mod tokenizer;

pub use batch::{Query, QueryBatch};
pub use config::RequestOptions;
pub use error::{BudgetError, Result};
pub use estimate::{CostEstimator, Estimate, TokenCost};
pub use pricing::{ModelTier, PriceTable};
pub use provider::{ChatMessage, ChatProvider, ChatRequest, ChatResponse, ProviderError};
pub use retry::RetryPolicy;
pub use selector::{select_model, Selection};
pub use session::{BudgetLedger, CompletionSession, Generation, HistoryMode};
#[cfg(feature = "network")]
pub use session::OpenAiSession;
pub use tokenizer::{TiktokenTokenizer, Tokenizer};
