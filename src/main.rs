//! Crypto Portfolio Rebalancing Bot
//!
//! Computes target allocations and rebalancing plans over file-backed
//! market data.

use clap::{Parser, Subcommand};
use rebalancer_bot::{
    config::Config,
    data::FileDataProvider,
    optimizer::{PortfolioOptimizer, Strategy},
    planner::{self, PlanConstraints},
    types::{Portfolio, TargetAllocation, TradeAction, Weights},
};
use rust_decimal::Decimal;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rebalancer-bot")]
#[command(about = "Automated portfolio rebalancing for crypto assets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a target allocation for an asset universe
    Optimize {
        /// Comma-separated asset symbols, e.g. BTC,ETH,USDC
        #[arg(long)]
        assets: String,
        /// equal_weight, market_cap, risk_parity or min_variance
        #[arg(long, default_value = "risk_parity")]
        strategy: String,
        /// Current weights, e.g. BTC=0.5,ETH=0.3,USDC=0.2
        #[arg(long)]
        current: Option<String>,
    },
    /// Check whether the current portfolio needs rebalancing
    Check {
        #[arg(long)]
        assets: String,
        #[arg(long, default_value = "risk_parity")]
        strategy: String,
        #[arg(long)]
        current: String,
    },
    /// Generate a full rebalancing plan with cost estimates
    Plan {
        #[arg(long)]
        assets: String,
        #[arg(long, default_value = "risk_parity")]
        strategy: String,
        #[arg(long)]
        current: String,
        /// Cap any single position at this weight
        #[arg(long)]
        max_position: Option<Decimal>,
        /// Ignore weight deltas below this size
        #[arg(long)]
        min_trade: Option<Decimal>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Optimize {
            assets,
            strategy,
            current,
        } => run_optimize(config, &assets, &strategy, current.as_deref()).await,
        Commands::Check {
            assets,
            strategy,
            current,
        } => run_check(config, &assets, &strategy, &current).await,
        Commands::Plan {
            assets,
            strategy,
            current,
            max_position,
            min_trade,
        } => run_plan(config, &assets, &strategy, &current, max_position, min_trade).await,
    }
}

fn build_optimizer(config: &Config) -> anyhow::Result<PortfolioOptimizer> {
    let provider = FileDataProvider::load(
        Path::new(&config.data.history_path),
        Path::new(&config.data.snapshots_path),
    )?;
    Ok(PortfolioOptimizer::new(
        Arc::new(provider),
        config.optimizer.clone(),
        config.data.clone(),
    ))
}

async fn run_optimize(
    config: Config,
    assets: &str,
    strategy: &str,
    current: Option<&str>,
) -> anyhow::Result<()> {
    let assets = parse_assets(assets);
    let strategy: Strategy = strategy.parse()?;
    let current_weights = match current {
        Some(raw) => parse_weights(raw)?,
        None => Weights::new(),
    };

    let optimizer = build_optimizer(&config)?;
    let result = optimizer.optimize(&assets, &current_weights, strategy).await?;

    println!("\n📊 Target Allocation ({strategy})\n");
    println!("{:<8} {:>10} {:>10} {:>10}", "Asset", "Current", "Target", "Diff");
    println!("{}", "-".repeat(42));
    for asset in &result.assets {
        let current = result
            .current_weights
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO);
        let target = result
            .target_weights
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO);
        println!(
            "{:<8} {:>9.2}% {:>9.2}% {:>9.2}%",
            asset,
            current * Decimal::ONE_HUNDRED,
            target * Decimal::ONE_HUNDRED,
            (target - current) * Decimal::ONE_HUNDRED
        );
    }

    println!("\nExpected return: {:>7.2}%", result.metrics.expected_return * Decimal::ONE_HUNDRED);
    println!("Volatility:      {:>7.2}%", result.metrics.volatility * Decimal::ONE_HUNDRED);
    println!("Sharpe ratio:    {:>7.2}", result.metrics.sharpe_ratio);

    Ok(())
}

async fn run_check(
    config: Config,
    assets: &str,
    strategy: &str,
    current: &str,
) -> anyhow::Result<()> {
    let assets = parse_assets(assets);
    let strategy: Strategy = strategy.parse()?;
    let current_weights = parse_weights(current)?;

    let optimizer = build_optimizer(&config)?;
    let (portfolio, target) =
        load_portfolio_and_target(&optimizer, &assets, &current_weights, strategy).await?;

    let check = planner::needs_rebalancing(&portfolio, &target, &config.rebalance);

    println!("\n🔍 Rebalance Check ({strategy})\n");
    println!(
        "Max deviation:      {:>7.2}% (threshold {:.2}%){}",
        check.max_deviation * Decimal::ONE_HUNDRED,
        config.rebalance.deviation_threshold * Decimal::ONE_HUNDRED,
        if check.deviation_trigger { "  ← trigger" } else { "" }
    );
    println!(
        "Sharpe improvement: {:>7.2} (threshold {:.2}){}",
        check.sharpe_improvement,
        config.rebalance.sharpe_improvement_threshold,
        if check.sharpe_trigger { "  ← trigger" } else { "" }
    );
    println!(
        "\n{}",
        if check.needs_rebalance {
            "⚖️  Rebalancing recommended"
        } else {
            "✅ Portfolio is within thresholds"
        }
    );

    Ok(())
}

async fn run_plan(
    config: Config,
    assets: &str,
    strategy: &str,
    current: &str,
    max_position: Option<Decimal>,
    min_trade: Option<Decimal>,
) -> anyhow::Result<()> {
    let assets = parse_assets(assets);
    let strategy: Strategy = strategy.parse()?;
    let current_weights = parse_weights(current)?;

    let optimizer = build_optimizer(&config)?;
    let (portfolio, target) =
        load_portfolio_and_target(&optimizer, &assets, &current_weights, strategy).await?;

    let constraints = PlanConstraints {
        min_trade_size: min_trade,
        max_position_size: max_position,
    };
    let has_constraints = constraints.min_trade_size.is_some() || constraints.max_position_size.is_some();
    let plan = planner::generate_rebalancing_plan(
        &portfolio,
        &target,
        has_constraints.then_some(&constraints),
        &config.rebalance,
    );

    println!("\n📋 Rebalancing Plan ({strategy})\n");
    if plan.trades.is_empty() {
        println!("No trades required.");
        return Ok(());
    }

    println!("{:<6} {:<8} {:>10}", "Action", "Asset", "Weight Δ");
    println!("{}", "-".repeat(28));
    for trade in &plan.trades {
        println!(
            "{:<6} {:<8} {:>9.2}%",
            match trade.action {
                TradeAction::Buy => "BUY",
                TradeAction::Sell => "SELL",
            },
            trade.symbol,
            trade.amount * Decimal::ONE_HUNDRED
        );
    }

    println!("\nTotal buy:        {:>8.2}%", plan.total_buy * Decimal::ONE_HUNDRED);
    println!("Total sell:       {:>8.2}%", plan.total_sell * Decimal::ONE_HUNDRED);
    println!("Turnover:         {:>8.2}%", planner::turnover(&portfolio.weights, &target.weights) * Decimal::ONE_HUNDRED);
    println!("Transaction cost: {:>8.4}%", plan.transaction_cost * Decimal::ONE_HUNDRED);
    println!("Est. slippage:    {:>8.4}%", plan.slippage * Decimal::ONE_HUNDRED);
    println!(
        "\nSharpe improvement: {:.3} ({})",
        plan.metrics.sharpe_improvement,
        if plan.metrics.is_improvement { "improvement" } else { "no improvement" }
    );

    Ok(())
}

/// Price the current weights and compute the target allocation with one
/// optimizer so both sides share the same statistics.
async fn load_portfolio_and_target(
    optimizer: &PortfolioOptimizer,
    assets: &[String],
    current_weights: &Weights,
    strategy: Strategy,
) -> anyhow::Result<(Portfolio, TargetAllocation)> {
    let current_metrics = optimizer.evaluate(assets, current_weights).await?;
    let result = optimizer.optimize(assets, current_weights, strategy).await?;

    let portfolio = Portfolio {
        assets: assets.to_vec(),
        weights: current_weights.clone(),
        metrics: current_metrics,
        previous_weights: None,
    };
    let target = TargetAllocation {
        weights: result.target_weights,
        metrics: result.metrics,
    };
    Ok((portfolio, target))
}

fn parse_assets(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_weights(raw: &str) -> anyhow::Result<Weights> {
    let mut weights = Weights::new();
    for entry in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let (symbol, weight) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected SYMBOL=WEIGHT, got '{entry}'"))?;
        weights.insert(symbol.trim().to_uppercase(), weight.trim().parse()?);
    }
    Ok(weights)
}
