use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::{Style, Term};
use llm_budget_core::{
    batch::QueryBatch,
    config::{self, RequestOptions},
    estimate::CostEstimator,
    openai::OpenAiClient,
    pricing::{self, PriceTable},
    retry::RetryPolicy,
    selector,
    session::{CompletionSession, HistoryMode},
    tokenizer::TiktokenTokenizer,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

// ── Palette ──────────────────────────────────────────────────────────

fn s_header() -> Style { Style::new().color256(252).bold() }  // bright gray, bold
fn s_dim() -> Style    { Style::new().color256(248) }         // light gray
fn s_tree() -> Style   { Style::new().color256(245) }         // mid gray
fn s_ok() -> Style     { Style::new().color256(114) }         // green
fn s_warn() -> Style   { Style::new().color256(214) }         // amber
fn s_err() -> Style    { Style::new().color256(167) }         // red
fn s_price() -> Style  { Style::new().color256(109) }         // teal
fn s_bold() -> Style   { Style::new().bold() }

fn sep(width: usize) -> String {
    s_tree().apply_to("\u{2500}".repeat(width)).to_string()
}

/// Dollar amounts span sub-cent query costs up to whole budgets.
fn fmt_dollars(v: f64) -> String {
    let a = v.abs();
    if a >= 100.0 {
        format!("${:.0}", v)
    } else if a >= 1.0 {
        format!("${:.2}", v)
    } else if a >= 0.01 {
        format!("${:.4}", v)
    } else {
        format!("${:.6}", v)
    }
}

fn fmt_per_m(per_token: f64) -> String {
    format!("${:.2}", per_token * 1e6)
}

fn header_cell(s: &str) -> Cell {
    Cell::new(s).fg(Color::AnsiValue(243))
}

// ── CLI Args ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "llm-budget",
    about = "Run a batch of LLM queries on the cheapest model tiers a dollar budget allows",
    version,
    after_help = "examples:\n  \
        llm-budget tiers\n  \
        llm-budget plan batch.toml --budget 0.50\n  \
        OPENAI_BUDGET=2 llm-budget run batch.toml --prompt \"Answer in one line.\"\n  \
        llm-budget run batch.toml --set temperature=0.2 --set max_tokens=300 --json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Price table to use instead of the user/bundled one.
    #[arg(long, global = true)]
    pricing: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List model tiers, cheapest first.
    Tiers {
        #[arg(long, short)]
        json: bool,
    },
    /// Show which tier each query would get, without calling any API.
    Plan {
        /// Batch file with [[query]] tables.
        batch: PathBuf,
        #[arg(long)]
        prompt: Option<String>,
        /// Budget in USD (default: $OPENAI_BUDGET).
        #[arg(long)]
        budget: Option<f64>,
        #[arg(long, default_value_t = 1000)]
        max_tokens: usize,
        #[arg(long, short)]
        json: bool,
    },
    /// Run a batch against the OpenAI API.
    Run {
        /// Batch file with [[query]] tables.
        batch: PathBuf,
        #[arg(long)]
        prompt: Option<String>,
        /// API key (default: $OPENAI_API_KEY).
        #[arg(long)]
        api_key: Option<String>,
        /// Budget in USD (default: $OPENAI_BUDGET).
        #[arg(long)]
        budget: Option<f64>,
        /// Request option override, e.g. temperature=0.2. Repeatable.
        #[arg(long = "set", value_name = "KEY=VALUE")]
        overrides: Vec<String>,
        /// Keep one growing message history across the whole batch.
        #[arg(long)]
        cumulative_history: bool,
        #[arg(long, default_value_t = RetryPolicy::DEFAULT_ATTEMPTS)]
        attempts: u32,
        /// Seconds between attempts.
        #[arg(long, default_value_t = RetryPolicy::DEFAULT_DELAY.as_secs())]
        retry_delay: u64,
        #[arg(long, short)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let prices = load_prices(cli.pricing.as_deref())?;

    match cli.command {
        Commands::Tiers { json } => cmd_tiers(&prices, json)?,
        Commands::Plan {
            batch,
            prompt,
            budget,
            max_tokens,
            json,
        } => cmd_plan(&prices, &batch, prompt.as_deref(), budget, max_tokens, json)?,
        Commands::Run {
            batch,
            prompt,
            api_key,
            budget,
            overrides,
            cumulative_history,
            attempts,
            retry_delay,
            json,
        } => {
            let history = if cumulative_history {
                HistoryMode::Cumulative
            } else {
                HistoryMode::Isolated
            };
            let retry = RetryPolicy::new(attempts, Duration::from_secs(retry_delay));
            let args = RunArgs {
                prompt: prompt.as_deref(),
                api_key: api_key.as_deref(),
                budget,
                overrides: &overrides,
                history,
                retry,
                json,
            };
            cmd_run(prices, &batch, args).await?;
        }
    }
    Ok(())
}

fn load_prices(path: Option<&Path>) -> anyhow::Result<PriceTable> {
    Ok(match path {
        Some(p) => pricing::load_pricing(p)?,
        None => pricing::load_pricing_cached()?,
    })
}

fn load_batch(path: &Path) -> anyhow::Result<QueryBatch> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let batch = QueryBatch::from_toml(&content)?;
    tracing::debug!(path = %path.display(), queries = batch.len(), "loaded batch");
    Ok(batch)
}

fn resolve_budget(flag: Option<f64>) -> anyhow::Result<f64> {
    match flag {
        Some(b) if b.is_finite() => Ok(b),
        Some(b) => anyhow::bail!("budget must be finite, got {b}"),
        None => Ok(config::read_budget()?),
    }
}

// ── Tiers ────────────────────────────────────────────────────────────

fn cmd_tiers(prices: &PriceTable, json: bool) -> anyhow::Result<()> {
    if json {
        let rows: Vec<_> = prices
            .tiers()
            .iter()
            .map(|t| {
                json!({
                    "rank": t.rank,
                    "model": t.model,
                    "input_cost_per_token": t.input_cost_per_token,
                    "output_cost_per_token": t.output_cost_per_token,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!();
    println!("  {}", s_header().apply_to("model tiers (cheapest first)"));
    println!("  {}", sep(48));

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        header_cell("  #"),
        header_cell("Model"),
        header_cell("$/1M in"),
        header_cell("$/1M out"),
    ]);
    for t in prices.tiers() {
        table.add_row(vec![
            Cell::new(format!("  {}", t.rank)).fg(Color::AnsiValue(245)),
            Cell::new(&t.model).fg(Color::AnsiValue(252)),
            Cell::new(fmt_per_m(t.input_cost_per_token)).fg(Color::AnsiValue(109)),
            Cell::new(fmt_per_m(t.output_cost_per_token)).fg(Color::AnsiValue(109)),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

// ── Plan ─────────────────────────────────────────────────────────────

fn cmd_plan(
    prices: &PriceTable,
    batch_path: &Path,
    prompt: Option<&str>,
    budget: Option<f64>,
    max_tokens: usize,
    json: bool,
) -> anyhow::Result<()> {
    let batch = load_batch(batch_path)?;
    let budget = resolve_budget(budget)?;
    let tokenizer = TiktokenTokenizer::new();
    let estimator = CostEstimator::new(prices, &tokenizer, max_tokens);
    let steps = selector::plan(&estimator, &batch, prompt, budget)?;

    if json {
        let rows: Vec<_> = steps
            .iter()
            .map(|s| {
                json!({
                    "position": s.position,
                    "model": s.selection.tier.model,
                    "query_cost": s.selection.query_cost,
                    "rest_cost": s.selection.rest_cost,
                    "within_budget": s.selection.within_budget,
                    "remaining_after": s.remaining_after,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "budget": budget, "steps": rows }))?);
        return Ok(());
    }

    println!();
    println!(
        "  {}  {}",
        s_header().apply_to("worst-case plan"),
        s_dim().apply_to(format!(
            "{} queries, budget {}, max {} output tokens",
            batch.len(),
            fmt_dollars(budget),
            max_tokens
        ))
    );
    println!("  {}", sep(64));

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        header_cell("  #"),
        header_cell("Query"),
        header_cell("Model"),
        header_cell("Max cost"),
        header_cell("Reserved"),
        header_cell("Left"),
    ]);
    for step in &steps {
        let query = batch
            .get(step.position)
            .map(|q| truncate(&q.text, 40))
            .unwrap_or_default();
        let model_cell = if step.selection.within_budget {
            Cell::new(&step.selection.tier.model).fg(Color::AnsiValue(114))
        } else {
            Cell::new(format!("{} (fallback)", step.selection.tier.model))
                .fg(Color::AnsiValue(214))
        };
        table.add_row(vec![
            Cell::new(format!("  {}", step.position)).fg(Color::AnsiValue(245)),
            Cell::new(query).fg(Color::AnsiValue(252)),
            model_cell,
            Cell::new(fmt_dollars(step.selection.query_cost)).fg(Color::AnsiValue(109)),
            Cell::new(fmt_dollars(step.selection.rest_cost)).fg(Color::AnsiValue(248)),
            Cell::new(fmt_dollars(step.remaining_after)).fg(Color::AnsiValue(109)),
        ]);
    }
    println!("{table}");

    if steps.iter().any(|s| !s.selection.within_budget) {
        println!();
        println!(
            "  {}",
            s_warn().apply_to("some queries do not fit the budget; they fall back to the most expensive tier")
        );
    }
    println!();
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}\u{2026}")
    }
}

// ── Run ──────────────────────────────────────────────────────────────

struct RunArgs<'a> {
    prompt: Option<&'a str>,
    api_key: Option<&'a str>,
    budget: Option<f64>,
    overrides: &'a [String],
    history: HistoryMode,
    retry: RetryPolicy,
    json: bool,
}

async fn cmd_run(prices: PriceTable, batch_path: &Path, args: RunArgs<'_>) -> anyhow::Result<()> {
    let client = OpenAiClient::from_env(args.api_key)?;
    let overrides = args
        .overrides
        .iter()
        .map(|o| config::parse_override(o))
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    let options = RequestOptions::from_overrides(&overrides)?;
    let batch = load_batch(batch_path)?;
    let budget = resolve_budget(args.budget)?;

    let session = CompletionSession::new(client, Box::new(TiktokenTokenizer::new()), prices, options)?
        .with_retry(args.retry)
        .with_history(args.history);

    let term = Term::stderr();
    if term.is_term() {
        term.write_line(&format!(
            "{}",
            s_dim().apply_to(format!("running {} queries...", batch.len()))
        ))?;
    }
    let result = session.generate_within(&batch, args.prompt, budget).await;
    if term.is_term() {
        term.clear_last_lines(1)?;
    }
    let generation = result?;

    if args.json {
        let rows: Vec<_> = generation
            .responses
            .iter()
            .zip(&generation.models)
            .map(|(response, model)| json!({ "model": model, "response": response }))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "results": rows,
                "budget": generation.ledger.initial,
                "spent": generation.ledger.spent,
                "remaining": generation.ledger.remaining(),
            }))?
        );
        return Ok(());
    }

    for (i, (query, (response, model))) in batch
        .iter()
        .zip(generation.responses.iter().zip(&generation.models))
        .enumerate()
    {
        println!();
        println!(
            "  {} {}  {}",
            s_dim().apply_to(format!("[{i}]")),
            s_bold().apply_to(truncate(&query.text, 60)),
            s_price().apply_to(model)
        );
        println!("  {}", sep(64));
        for line in response.lines() {
            println!("  {line}");
        }
    }

    let remaining = generation.ledger.remaining();
    let remaining_style = if remaining >= 0.0 { s_ok() } else { s_err() };
    println!();
    println!(
        "  {} {}   {} {}",
        s_dim().apply_to("spent"),
        s_price().apply_to(fmt_dollars(generation.ledger.spent)),
        s_dim().apply_to("remaining"),
        remaining_style.apply_to(fmt_dollars(remaining)),
    );
    println!();
    Ok(())
}
