#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use llm_budget_core::error::Result;
use llm_budget_core::pricing::{ModelTier, PriceTable};
use llm_budget_core::provider::{
    ChatProvider, ChatRequest, ChatResponse, ProviderError, ProviderErrorKind,
};
use llm_budget_core::tokenizer::Tokenizer;

/// One token per whitespace-separated word, for every model.
pub struct Words;

impl Tokenizer for Words {
    fn count(&self, _model: &str, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }
}

pub fn tier(model: &str, input: f64, output: f64) -> ModelTier {
    ModelTier {
        model: model.to_string(),
        input_cost_per_token: input,
        output_cost_per_token: output,
        rank: 0,
    }
}

/// Three tiers, each twice the price of the one before.
pub fn three_tiers() -> PriceTable {
    PriceTable::new(vec![
        tier("cheap", 0.001, 0.002),
        tier("mid", 0.002, 0.004),
        tier("top", 0.004, 0.008),
    ])
    .unwrap()
}

/// Provider that fails `failures` times with `kind`, then answers every
/// request with `answer`. Records every request it sees.
pub struct ScriptedProvider {
    failures: usize,
    kind: ProviderErrorKind,
    answer: String,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn answering(answer: &str) -> Self {
        Self::failing(0, ProviderErrorKind::ServerError, answer)
    }

    pub fn failing(failures: usize, kind: ProviderErrorKind, answer: &str) -> Self {
        Self {
            failures,
            kind,
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, request: &ChatRequest) -> std::result::Result<ChatResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());
        if n <= self.failures {
            return Err(ProviderError::new(self.kind, format!("scripted failure {n}")));
        }
        Ok(ChatResponse {
            content: format!("{} {n}", self.answer),
            usage: None,
        })
    }
}
