//! Token counting seam.
//!
//! Cost estimation only needs "how many tokens is this text for that model",
//! so the tokenizer is a trait. [`TiktokenTokenizer`] is the real one; tests
//! swap in something deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tiktoken_rs::CoreBPE;

use crate::error::{BudgetError, Result};

pub trait Tokenizer: Send + Sync {
    /// Number of tokens `text` encodes to under `model`'s encoding.
    fn count(&self, model: &str, text: &str) -> Result<usize>;
}

/// BPE token counts via `tiktoken-rs`, one encoder cached per model id.
#[derive(Default)]
pub struct TiktokenTokenizer {
    encoders: Mutex<HashMap<String, Arc<CoreBPE>>>,
}

impl TiktokenTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn encoder(&self, model: &str) -> Result<Arc<CoreBPE>> {
        let mut encoders = self.encoders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(bpe) = encoders.get(model) {
            return Ok(Arc::clone(bpe));
        }
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| BudgetError::Tokenization {
            model: model.to_string(),
            message: e.to_string(),
        })?;
        let bpe = Arc::new(bpe);
        encoders.insert(model.to_string(), Arc::clone(&bpe));
        Ok(bpe)
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count(&self, model: &str, text: &str) -> Result<usize> {
        Ok(self.encoder(model)?.encode_ordinary(text).len())
    }
}
