use crate::error::Result;
use crate::pricing::PriceTable;
use crate::tokenizer::Tokenizer;

/// System prompt used when the caller supplies none.
pub const DEFAULT_PROMPT: &str = "You are a helpful assistant that accomplishes user tasks.";

/// Token counts behind a cost estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenCost {
    /// Prompt + query + content tokens.
    pub input: usize,
    /// Response tokens, or the max-output-token limit for a worst case.
    pub output: usize,
}

/// Dollar cost of one query on one model tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub tokens: TokenCost,
    pub dollars: f64,
}

/// Converts prompt/query/content/response text into dollars for a tier.
pub struct CostEstimator<'a> {
    prices: &'a PriceTable,
    tokenizer: &'a dyn Tokenizer,
    max_tokens: usize,
}

impl<'a> CostEstimator<'a> {
    pub fn new(prices: &'a PriceTable, tokenizer: &'a dyn Tokenizer, max_tokens: usize) -> Self {
        Self {
            prices,
            tokenizer,
            max_tokens,
        }
    }

    pub fn prices(&self) -> &'a PriceTable {
        self.prices
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Cost of a query on `model`. With no `response` the output side is the
    /// max-output-token limit, which makes the result an upper bound.
    pub fn estimate(
        &self,
        model: &str,
        prompt: Option<&str>,
        query: &str,
        content: &str,
        response: Option<&str>,
    ) -> Result<Estimate> {
        let tier = self.prices.get(model)?;

        let prompt_tokens = self.tokenizer.count(model, prompt.unwrap_or(DEFAULT_PROMPT))?;
        let query_tokens = self.tokenizer.count(model, query)?;
        let content_tokens = self.tokenizer.count(model, content)?;
        let output = match response {
            Some(text) => self.tokenizer.count(model, text)?,
            None => self.max_tokens,
        };

        let tokens = TokenCost {
            input: prompt_tokens + query_tokens + content_tokens,
            output,
        };
        Ok(Estimate {
            tokens,
            dollars: tier.cost(tokens.input, tokens.output),
        })
    }

    /// Worst-case cost: [`estimate`](Self::estimate) without a response.
    pub fn estimate_max_cost(
        &self,
        model: &str,
        prompt: Option<&str>,
        query: &str,
        content: &str,
    ) -> Result<Estimate> {
        self.estimate(model, prompt, query, content, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BudgetError;
    use crate::pricing::{ModelTier, PriceTable};

    /// One token per whitespace-separated word.
    struct Words;

    impl Tokenizer for Words {
        fn count(&self, model: &str, text: &str) -> Result<usize> {
            if model == "untokenizable" {
                return Err(BudgetError::Tokenization {
                    model: model.into(),
                    message: "no encoding".into(),
                });
            }
            Ok(text.split_whitespace().count())
        }
    }

    fn table() -> PriceTable {
        PriceTable::new(vec![
            ModelTier {
                model: "small".into(),
                input_cost_per_token: 0.001,
                output_cost_per_token: 0.002,
                rank: 0,
            },
            ModelTier {
                model: "untokenizable".into(),
                input_cost_per_token: 0.01,
                output_cost_per_token: 0.02,
                rank: 0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn sums_prompt_query_and_content() {
        let prices = table();
        let est = CostEstimator::new(&prices, &Words, 10);
        let e = est
            .estimate("small", Some("be brief"), "what is it", "a b c d", Some("it is"))
            .unwrap();
        assert_eq!(e.tokens, TokenCost { input: 2 + 3 + 4, output: 2 });
        assert!((e.dollars - (9.0 * 0.001 + 2.0 * 0.002)).abs() < 1e-12);
    }

    #[test]
    fn missing_prompt_uses_default() {
        let prices = table();
        let est = CostEstimator::new(&prices, &Words, 10);
        let e = est.estimate("small", None, "", "", Some("")).unwrap();
        assert_eq!(e.tokens.input, DEFAULT_PROMPT.split_whitespace().count());
    }

    #[test]
    fn max_cost_uses_output_limit() {
        let prices = table();
        let est = CostEstimator::new(&prices, &Words, 1000);
        let e = est.estimate_max_cost("small", Some("p"), "q", "c").unwrap();
        assert_eq!(e.tokens.output, 1000);
    }

    #[test]
    fn unknown_model() {
        let prices = table();
        let est = CostEstimator::new(&prices, &Words, 10);
        assert!(matches!(
            est.estimate_max_cost("large", None, "q", "c"),
            Err(BudgetError::UnknownModel(_))
        ));
    }

    #[test]
    fn tokenizer_failure_propagates() {
        let prices = table();
        let est = CostEstimator::new(&prices, &Words, 10);
        assert!(matches!(
            est.estimate_max_cost("untokenizable", None, "q", "c"),
            Err(BudgetError::Tokenization { .. })
        ));
    }
}
