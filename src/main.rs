//! `mc-stocking`: command-line front end for the stocking optimizer.
//!
//! # Commands
//!
//! - `mc-stocking optimize` - search for the best stocking policy
//! - `mc-stocking scenarios --output <file>` - export generated demand
//! - `mc-stocking evaluate [--level <S>...]` - cost of a fixed order-up-to policy
//!
//! Every command reads a TOML study file (`--config`), or runs the built-in
//! demo study when none is given.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mc_stocking::io::reporting;
use mc_stocking::strategy::implementations::BaseStockPolicy;
use mc_stocking::{
    evaluate_all, evaluate_with_trace, generate, optimize, CostParams, DemandDistribution,
    DemandModel, PolicyKind, PolicySpace, RiskMeasure, ScenarioSet, ShortageMode, StartPoint,
    StockingPolicy, StoppingCriteria, StudyConfig,
};

/// Monte Carlo inventory stocking optimizer
#[derive(Parser)]
#[command(name = "mc-stocking")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Study configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the scenario seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for the policy minimising the configured risk measure
    Optimize {
        /// Write the per-iteration objective trace to this CSV file
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Write the best policy's period history on scenario 0 to this CSV file
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Generate the scenario set and export it
    Scenarios {
        /// Output CSV file
        #[arg(short, long, default_value = "scenarios.csv")]
        output: PathBuf,
    },

    /// Evaluate a fixed order-up-to policy across all scenarios
    Evaluate {
        /// Order-up-to level per item (defaults to the newsvendor level)
        #[arg(short, long, num_args = 1..)]
        level: Vec<f64>,

        /// Write the period history on scenario 0 to this CSV file
        #[arg(long)]
        history: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Initialise tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut study = match &cli.config {
        Some(path) => load_study(path)?,
        None => {
            info!("no --config given, running the demo study");
            demo_study()
        }
    };
    if let Some(seed) = cli.seed {
        study.seed = seed;
    }
    study.validate().context("invalid study configuration")?;

    let scenarios = generate(&study.demand, study.horizon, study.scenarios, study.seed)
        .context("scenario generation failed")?;

    match cli.command {
        Commands::Optimize { trace, history } => {
            run_optimize(&study, &scenarios, trace.as_deref(), history.as_deref())
        }
        Commands::Scenarios { output } => {
            reporting::write_scenarios(&output, &scenarios)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote {} scenarios to {}", scenarios.len(), output.display());
            Ok(())
        }
        Commands::Evaluate { level, history } => {
            run_evaluate(&study, &scenarios, level, history.as_deref())
        }
    }
}

fn load_study(path: &Path) -> Result<StudyConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    StudyConfig::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn run_optimize(
    study: &StudyConfig,
    scenarios: &ScenarioSet,
    trace: Option<&Path>,
    history: Option<&Path>,
) -> Result<()> {
    let outcome = optimize(
        scenarios,
        &study.costs,
        &study.policy_space,
        study.risk_measure,
        &study.stopping,
    )?;
    let diag = &outcome.diagnostics;

    println!("=== Stocking Optimization ===");
    println!("Best policy:    {}", outcome.best_policy);
    println!("Objective:      {:.4} ({:?})", outcome.best_objective, study.risk_measure);
    println!("Termination:    {}", diag.termination);
    println!("Iterations:     {}", diag.iterations);
    println!("Evaluations:    {}", diag.total_evaluations);
    println!("Elapsed:        {:.3}s", diag.elapsed.as_secs_f64());

    let breakdowns = evaluate_all(&outcome.best_policy, scenarios, &study.costs)?;
    print_summary(&breakdowns);

    if let Some(path) = trace {
        reporting::write_objective_trace(path, &diag.trace)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = history {
        write_history(path, &outcome.best_policy, scenarios, &study.costs)?;
    }
    Ok(())
}

fn run_evaluate(
    study: &StudyConfig,
    scenarios: &ScenarioSet,
    levels: Vec<f64>,
    history: Option<&Path>,
) -> Result<()> {
    let rule = if levels.is_empty() {
        BaseStockPolicy::with_optimal_target(scenarios, &study.costs)
    } else if levels.len() == scenarios.items() {
        BaseStockPolicy::new(levels)
    } else {
        bail!(
            "{} levels given for {} items",
            levels.len(),
            scenarios.items()
        );
    };
    let policy = StockingPolicy::OrderUpTo(rule);
    let breakdowns = evaluate_all(&policy, scenarios, &study.costs)?;
    let totals: Vec<f64> = breakdowns.iter().map(|b| b.total).collect();

    println!("=== Policy Evaluation ===");
    println!("Policy:         {}", policy);
    println!(
        "Objective:      {:.4} ({:?})",
        study.risk_measure.aggregate(&totals),
        study.risk_measure
    );
    print_summary(&breakdowns);

    if let Some(path) = history {
        write_history(path, &policy, scenarios, &study.costs)?;
    }
    Ok(())
}

fn print_summary(breakdowns: &[mc_stocking::CostBreakdown]) {
    let n = breakdowns.len().max(1) as f64;
    let mean = |f: fn(&mc_stocking::CostBreakdown) -> f64| breakdowns.iter().map(f).sum::<f64>() / n;
    println!("\n=== Mean Cost per Scenario ===");
    println!("Holding:        ${:.2}", mean(|b| b.holding));
    println!("Shortage:       ${:.2}", mean(|b| b.shortage));
    println!("Ordering:       ${:.2}", mean(|b| b.ordering));
    println!("Penalty:        ${:.2}", mean(|b| b.penalty));
    println!("Total:          ${:.2}", mean(|b| b.total));
    println!("Fill rate:      {:.1}%", 100.0 * mean(|b| b.fill_rate()));
}

fn write_history(
    path: &Path,
    policy: &StockingPolicy,
    scenarios: &ScenarioSet,
    costs: &CostParams,
) -> Result<()> {
    let first = scenarios
        .scenarios()
        .first()
        .context("scenario set is empty")?;
    let (_, records) = evaluate_with_trace(policy, first, costs)?;
    reporting::write_simulation_log(path, &records)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Twelve months of seasonal normal demand for one item, four-to-one
/// shortage to holding cost, one month lead time.
fn demo_study() -> StudyConfig {
    StudyConfig {
        horizon: 12,
        scenarios: 500,
        seed: 42,
        demand: DemandModel::single(DemandDistribution::Normal {
            mean: 100.0,
            std_dev: 25.0,
        })
        .with_seasonality(vec![
            0.8, 0.8, 0.9, 1.0, 1.1, 1.2, 1.2, 1.1, 1.0, 0.9, 1.0, 1.3,
        ])
        .rounded(),
        costs: CostParams {
            holding_cost_rate: 1.0,
            shortage_cost_rate: 4.0,
            ordering_cost_fixed: 50.0,
            ordering_cost_per_unit: 0.0,
            shortage_mode: ShortageMode::LostSale,
            lead_time: 1,
            initial_inventory: vec![100.0],
            min_order_quantity: 0.0,
            ..CostParams::default()
        },
        policy_space: PolicySpace::new(PolicyKind::ReorderPoint, 0.0, 600.0)
            .integer()
            .starting_at(StartPoint::CriticalFractile),
        risk_measure: RiskMeasure::Cvar { quantile: 0.9 },
        stopping: StoppingCriteria::default(),
    }
}
