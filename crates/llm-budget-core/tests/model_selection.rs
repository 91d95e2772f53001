mod common;

use common::{three_tiers, Words};
use llm_budget_core::batch::QueryBatch;
use llm_budget_core::estimate::CostEstimator;
use llm_budget_core::pricing::load_bundled_pricing;
use llm_budget_core::selector::select_model;

fn one_query() -> QueryBatch {
    QueryBatch::from_parallel(
        vec!["Summarize the quarterly report."],
        vec!["Revenue grew four percent while costs held flat."],
    )
    .unwrap()
}

#[test]
fn large_budget_picks_cheapest_tier() {
    let prices = three_tiers();
    let est = CostEstimator::new(&prices, &Words, 1000);
    let s = select_model(&est, 0, 1000.0, &one_query(), None).unwrap();
    assert_eq!(s.tier.model, "cheap");
    assert!(s.within_budget);
}

#[test]
fn tiny_budget_falls_back_to_most_expensive() {
    let prices = three_tiers();
    let est = CostEstimator::new(&prices, &Words, 1000);
    let s = select_model(&est, 0, 0.0001, &one_query(), None).unwrap();
    assert_eq!(s.tier.model, "top");
    assert!(!s.within_budget);
}

#[test]
fn bundled_tiers_cheapest_and_fallback() {
    let prices = load_bundled_pricing().unwrap();
    let est = CostEstimator::new(&prices, &Words, 1000);
    let batch = one_query();
    assert_eq!(
        select_model(&est, 0, 1000.0, &batch, Some("Answer briefly.")).unwrap().tier.model,
        "gpt-3.5-turbo"
    );
    assert_eq!(
        select_model(&est, 0, 0.0001, &batch, Some("Answer briefly.")).unwrap().tier.model,
        "gpt-4-0314"
    );
}

#[test]
fn budget_reserved_for_later_queries() {
    let prices = three_tiers();
    let est = CostEstimator::new(&prices, &Words, 100);
    let batch = QueryBatch::from_parallel(vec!["a", "b", "c"], vec!["x", "y", "z"]).unwrap();

    let first = est.estimate_max_cost("cheap", None, "a", "x").unwrap().dollars;
    let tail: f64 = [("b", "y"), ("c", "z")]
        .iter()
        .map(|(q, c)| est.estimate_max_cost("top", None, q, c).unwrap().dollars)
        .sum();

    let s = select_model(&est, 0, first + tail, &batch, None).unwrap();
    assert_eq!(s.tier.model, "cheap");
    assert_eq!(s.rest_cost, tail);

    // Enough for the first query on its own, not with the tail reserved.
    let s = select_model(&est, 0, first + tail / 2.0, &batch, None).unwrap();
    assert_eq!(s.tier.model, "top");
}

#[test]
fn max_cost_bounds_realized_cost() {
    let prices = three_tiers();
    let est = CostEstimator::new(&prices, &Words, 5);
    for response in ["", "one", "one two three", "one two three four five"] {
        let actual = est
            .estimate("mid", Some("p"), "query", "content", Some(response))
            .unwrap();
        let max = est.estimate_max_cost("mid", Some("p"), "query", "content").unwrap();
        assert!(max.dollars >= actual.dollars, "{response:?}");
        assert_eq!(max.tokens.input, actual.tokens.input);
    }
}

#[test]
fn response_at_output_limit_matches_max_cost() {
    let prices = three_tiers();
    let est = CostEstimator::new(&prices, &Words, 4);
    let actual = est
        .estimate("top", None, "query", "content", Some("w w w w"))
        .unwrap();
    let max = est.estimate_max_cost("top", None, "query", "content").unwrap();
    assert_eq!(actual, max);
}
