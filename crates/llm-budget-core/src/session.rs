//! Batch orchestration: select a tier, build the request, call the provider
//! with retries, then charge the realized cost against the budget.

use tracing::{info, warn};

use crate::batch::{Query, QueryBatch};
use crate::config::{self, RequestOptions};
use crate::error::{BudgetError, Result};
use crate::estimate::{CostEstimator, DEFAULT_PROMPT};
use crate::pricing::PriceTable;
use crate::provider::{ChatMessage, ChatProvider, ChatRequest};
use crate::retry::{retry, RetryError, RetryPolicy};
use crate::selector::{self, PlanStep, Selection};
use crate::tokenizer::Tokenizer;

/// How messages carry over between queries of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryMode {
    /// Each query sees only the seed messages plus its own.
    #[default]
    Isolated,
    /// Every query's messages are appended to one list for the whole batch.
    Cumulative,
}

/// Running spend for one batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetLedger {
    pub initial: f64,
    pub spent: f64,
}

impl BudgetLedger {
    pub fn new(initial: f64) -> Self {
        Self { initial, spent: 0.0 }
    }

    pub fn remaining(&self) -> f64 {
        self.initial - self.spent
    }

    pub fn charge(&mut self, dollars: f64) {
        self.spent += dollars;
    }
}

/// Results of a batch, index-aligned with the input queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub responses: Vec<String>,
    pub models: Vec<String>,
    pub ledger: BudgetLedger,
}

pub struct CompletionSession<P> {
    provider: P,
    tokenizer: Box<dyn Tokenizer>,
    prices: PriceTable,
    options: RequestOptions,
    retry: RetryPolicy,
    history: HistoryMode,
}

impl<P: ChatProvider> CompletionSession<P> {
    pub fn new(
        provider: P,
        tokenizer: Box<dyn Tokenizer>,
        prices: PriceTable,
        options: RequestOptions,
    ) -> Result<Self> {
        if !prices.contains(&options.model) {
            return Err(BudgetError::Config(format!(
                "model `{}` is not in the price table",
                options.model
            )));
        }
        Ok(Self {
            provider,
            tokenizer,
            prices,
            options,
            retry: RetryPolicy::default(),
            history: HistoryMode::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_history(mut self, history: HistoryMode) -> Self {
        self.history = history;
        self
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn prices(&self) -> &PriceTable {
        &self.prices
    }

    fn estimator(&self) -> CostEstimator<'_> {
        CostEstimator::new(&self.prices, self.tokenizer.as_ref(), self.options.max_tokens)
    }

    /// Run the batch against the budget in `$OPENAI_BUDGET`.
    pub async fn generate(&self, batch: &QueryBatch, prompt: Option<&str>) -> Result<Generation> {
        let budget = config::read_budget()?;
        self.generate_within(batch, prompt, budget).await
    }

    /// Run the batch one query at a time against `budget` dollars. The first
    /// unrecoverable failure aborts the batch and discards its results.
    pub async fn generate_within(
        &self,
        batch: &QueryBatch,
        prompt: Option<&str>,
        budget: f64,
    ) -> Result<Generation> {
        let estimator = self.estimator();
        let mut ledger = BudgetLedger::new(budget);
        let mut history = self.options.messages.clone();
        let mut responses = Vec::with_capacity(batch.len());
        let mut models = Vec::with_capacity(batch.len());

        for (idx, query) in batch.iter().enumerate() {
            let selection = selector::select_model(&estimator, idx, ledger.remaining(), batch, prompt)?;
            let request = self.build_request(&selection, query, prompt, &mut history);

            let response = retry(&self.retry, || self.provider.complete(&request))
                .await
                .map_err(|e| match e {
                    RetryError::Permanent(source) => BudgetError::Provider(source),
                    RetryError::Exhausted { attempts, last } => BudgetError::ProviderFatal {
                        attempts,
                        source: last,
                    },
                })?;

            let realized = estimator.estimate(
                &request.model,
                prompt,
                &query.text,
                &query.context,
                Some(&response.content),
            )?;
            ledger.charge(realized.dollars);
            info!(
                position = idx,
                model = %request.model,
                cost = realized.dollars,
                input_tokens = realized.tokens.input,
                output_tokens = realized.tokens.output,
                remaining = ledger.remaining(),
                "query completed"
            );
            if ledger.remaining() < 0.0 {
                warn!(
                    spent = ledger.spent,
                    budget = ledger.initial,
                    "spend has exceeded the budget"
                );
            }

            responses.push(response.content);
            models.push(request.model);
        }

        Ok(Generation {
            responses,
            models,
            ledger,
        })
    }

    fn build_request(
        &self,
        selection: &Selection,
        query: &Query,
        prompt: Option<&str>,
        history: &mut Vec<ChatMessage>,
    ) -> ChatRequest {
        let turn = [
            ChatMessage::system(prompt.unwrap_or(DEFAULT_PROMPT)),
            ChatMessage::user(format!("Here is some context : {}", query.context)),
            ChatMessage::user(format!("Complete the following task: {}", query.text)),
        ];
        let messages = match self.history {
            HistoryMode::Isolated => {
                let mut messages = self.options.messages.clone();
                messages.extend(turn);
                messages
            }
            HistoryMode::Cumulative => {
                history.extend(turn);
                history.clone()
            }
        };
        ChatRequest {
            model: selection.tier.model.clone(),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            messages,
        }
    }

    /// Dry-run the selector over the batch without calling the provider.
    pub fn plan(&self, batch: &QueryBatch, prompt: Option<&str>, budget: f64) -> Result<Vec<PlanStep>> {
        selector::plan(&self.estimator(), batch, prompt, budget)
    }
}

#[cfg(feature = "network")]
pub type OpenAiSession = CompletionSession<crate::openai::OpenAiClient>;

#[cfg(feature = "network")]
impl OpenAiSession {
    /// Session against the OpenAI API using the user or bundled price table.
    ///
    /// Fails before the HTTP client is built when no API key can be resolved
    /// or an override is not recognized.
    pub fn openai(
        api_key: Option<&str>,
        overrides: &std::collections::BTreeMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let api_key = config::resolve_api_key(api_key)?;
        let options = RequestOptions::from_overrides(overrides)?;
        let client = crate::openai::OpenAiClient::new(api_key)?;
        Self::new(
            client,
            Box::new(crate::tokenizer::TiktokenTokenizer::new()),
            crate::pricing::load_pricing_cached()?,
            options,
        )
    }
}
