//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::adapters::text_report::generate_report;
use crate::domain::backtest::{BacktestConfig, BacktestResult, Backtester};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_portfolio_config,
};
use crate::domain::error::FactorTraderError;
use crate::domain::execution::ExecutionConfig;
use crate::domain::optimizer::solver::SolverSettings;
use crate::domain::optimizer::{OptimizationMethod, PortfolioConfig, PortfolioOptimizer};
use crate::domain::rebalance::RebalanceFrequency;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportPort, RunSettings};

#[derive(Parser, Debug)]
#[command(name = "factortrader", about = "Factor portfolio backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a walk-forward backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Wide price CSV; overrides [data] prices
        #[arg(long)]
        prices: Option<PathBuf>,
        /// Score CSV; overrides [data] scores
        #[arg(long)]
        scores: Option<PathBuf>,
        /// ticker,sector CSV; overrides [data] sectors
        #[arg(long)]
        sectors: Option<PathBuf>,
        /// JSON results path; overrides [report] output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and print the resolved settings
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    pub fn config_path(&self) -> &Path {
        match &self.command {
            Command::Backtest { config, .. } | Command::Validate { config } => config,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            prices,
            scores,
            sectors,
            output,
        } => run_backtest(
            &config,
            DataOverrides {
                prices,
                scores,
                sectors,
            },
            output,
        ),
        Command::Validate { config } => run_validate(&config),
    }
}

/// `[logging] level` from the config, or `info` when unset or unreadable.
pub fn log_level(config_path: &Path) -> String {
    FileConfigAdapter::from_file(config_path)
        .ok()
        .and_then(|c| c.get_string("logging", "level"))
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Data file paths given on the command line.
#[derive(Debug, Default)]
pub struct DataOverrides {
    pub prices: Option<PathBuf>,
    pub scores: Option<PathBuf>,
    pub sectors: Option<PathBuf>,
}

/// CLI flags win over `[data]` keys. Prices and scores are required.
pub fn resolve_data_adapter(
    config: &dyn ConfigPort,
    overrides: DataOverrides,
) -> Result<CsvAdapter, FactorTraderError> {
    let from_config = |key: &str| {
        config
            .get_string("data", key)
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    };
    let required = |flag: Option<PathBuf>, key: &str| {
        flag.or_else(|| from_config(key))
            .ok_or_else(|| FactorTraderError::ConfigMissing {
                section: "data".into(),
                key: key.into(),
            })
    };

    let prices = required(overrides.prices, "prices")?;
    let scores = required(overrides.scores, "scores")?;
    let sectors = overrides.sectors.or_else(|| from_config("sectors"));
    Ok(CsvAdapter::new(prices, scores, sectors))
}

fn run_backtest(config_path: &Path, overrides: DataOverrides, output: Option<PathBuf>) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate
    if let Err(e) = validate_backtest_config(&adapter).and_then(|_| validate_portfolio_config(&adapter))
    {
        eprintln!("error: {e}");
        return (&e).into();
    }

    // Stage 3: Build configs
    let (bt_config, pf_config) =
        match build_backtest_config(&adapter).and_then(|bt| {
            let pf = build_portfolio_config(&adapter, &bt)?;
            Ok((bt, pf))
        }) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        };

    // Stage 4: Resolve data sources
    let data_port = match resolve_data_adapter(&adapter, overrides) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 5: Run
    eprintln!(
        "Running {} backtest with {} rebalancing...",
        pf_config.method, bt_config.rebalance_frequency
    );
    let result = match run_backtest_pipeline(&data_port, &bt_config, &pf_config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let settings = RunSettings {
        backtest: &bt_config,
        portfolio: &pf_config,
    };
    eprintln!();
    eprint!("{}", generate_report(&result, &settings));

    // Stage 6: Export
    let output = output.or_else(|| {
        adapter
            .get_string("report", "output")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
    });
    if let Some(output) = output {
        let reporter = JsonReportAdapter::new(adapter.get_bool("report", "pretty", true));
        match reporter.write(&result, &settings, &output.to_string_lossy()) {
            Ok(()) => eprintln!("\nResults written to: {}", output.display()),
            Err(e) => {
                eprintln!("error: failed to write results: {e}");
                return (&e).into();
            }
        }
    }

    ExitCode::SUCCESS
}

/// Load data through `data_port` and run the backtest.
pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    bt_config: &BacktestConfig,
    pf_config: &PortfolioConfig,
) -> Result<BacktestResult, FactorTraderError> {
    let prices = data_port.load_prices()?;
    let scores = data_port.load_scores()?.into_composite();
    let sectors = data_port.load_sectors()?;
    eprintln!(
        "  Loaded {} dates x {} tickers, scores on {} dates",
        prices.len(),
        prices.tickers().len(),
        scores.date_count()
    );
    if !sectors.is_empty() {
        eprintln!("  Sector map covers {} tickers", sectors.len());
    }

    let optimizer = PortfolioOptimizer::new(pf_config.clone());
    let backtester = Backtester::new(bt_config.clone());
    backtester.run(
        &prices,
        &scores,
        &optimizer,
        (!sectors.is_empty()).then_some(&sectors),
    )
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let resolved = validate_backtest_config(&adapter)
        .and_then(|_| validate_portfolio_config(&adapter))
        .and_then(|_| build_backtest_config(&adapter))
        .and_then(|bt| {
            let pf = build_portfolio_config(&adapter, &bt)?;
            Ok((bt, pf))
        });
    let (bt, pf) = match resolved {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nBacktest:");
    eprintln!("  initial_capital:     {:.2}", bt.initial_capital);
    eprintln!("  rebalance_frequency: {}", bt.rebalance_frequency);
    eprintln!("  transaction_cost:    {}", bt.execution.transaction_cost);
    eprintln!("  slippage:            {}", bt.execution.slippage);
    eprintln!(
        "  benchmark:           {}",
        bt.benchmark.as_deref().unwrap_or("none")
    );
    eprintln!("  risk_free_rate:      {}", bt.risk_free_rate);
    if let Some(start) = bt.start_date {
        eprintln!("  start_date:          {start}");
    }
    if let Some(end) = bt.end_date {
        eprintln!("  end_date:            {end}");
    }
    eprintln!("  max_holdings:        {}", bt.max_holdings);
    eprintln!("  lookback_days:       {}", bt.lookback_days);
    eprintln!("  min_history_days:    {}", bt.min_history_days);

    eprintln!("\nPortfolio:");
    eprintln!("  optimization_method: {}", pf.method);
    if let OptimizationMethod::Unrecognized(name) = &pf.method {
        eprintln!("  warning: '{name}' is not a known method, equal weight will be used");
    }
    eprintln!("  target_volatility:   {}", pf.target_volatility);
    eprintln!("  max_sector_weight:   {}", pf.max_sector_weight);
    eprintln!("  max_turnover:        {}", pf.max_turnover);
    eprintln!("  max_position_size:   {}", pf.max_position_size);
    eprintln!("  min_position_size:   {}", pf.min_position_size);
    eprintln!("  risk_free_rate:      {}", pf.risk_free_rate);
    eprintln!("  max_iterations:      {}", pf.solver.max_iterations);
    eprintln!("  tolerance:           {:e}", pf.solver.tolerance);

    eprintln!("\nConfig is valid");
    ExitCode::SUCCESS
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, FactorTraderError> {
    let defaults = BacktestConfig::default();

    let rebalance_frequency = match adapter.get_string("backtest", "rebalance_frequency") {
        Some(s) => s
            .parse::<RebalanceFrequency>()
            .map_err(|reason| FactorTraderError::ConfigInvalid {
                section: "backtest".into(),
                key: "rebalance_frequency".into(),
                reason,
            })?,
        None => defaults.rebalance_frequency,
    };

    let benchmark = match adapter.get_string("backtest", "benchmark") {
        Some(s) if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("none") => None,
        Some(s) => Some(s.trim().to_string()),
        None => defaults.benchmark,
    };

    Ok(BacktestConfig {
        initial_capital: adapter.get_double("backtest", "initial_capital", defaults.initial_capital),
        rebalance_frequency,
        execution: ExecutionConfig {
            transaction_cost: adapter.get_double(
                "backtest",
                "transaction_cost",
                defaults.execution.transaction_cost,
            ),
            slippage: adapter.get_double("backtest", "slippage", defaults.execution.slippage),
        },
        benchmark,
        risk_free_rate: adapter.get_double("backtest", "risk_free_rate", defaults.risk_free_rate),
        start_date: parse_date(adapter, "backtest", "start_date")?,
        end_date: parse_date(adapter, "backtest", "end_date")?,
        max_holdings: get_count(adapter, "backtest", "max_holdings", defaults.max_holdings)?,
        lookback_days: get_count(adapter, "backtest", "lookback_days", defaults.lookback_days)?,
        min_history_days: get_count(
            adapter,
            "backtest",
            "min_history_days",
            defaults.min_history_days,
        )?,
    })
}

/// `risk_free_rate` falls back to the backtest's when `[portfolio]` omits it.
pub fn build_portfolio_config(
    adapter: &dyn ConfigPort,
    backtest: &BacktestConfig,
) -> Result<PortfolioConfig, FactorTraderError> {
    let defaults = PortfolioConfig::default();

    let method = adapter
        .get_string("portfolio", "optimization_method")
        .map(|m| OptimizationMethod::parse(&m))
        .unwrap_or(defaults.method);

    let time_limit = adapter.get_double("portfolio", "time_limit", 0.0);
    let solver = SolverSettings {
        max_iterations: get_count(
            adapter,
            "portfolio",
            "max_iterations",
            defaults.solver.max_iterations,
        )?,
        tolerance: adapter.get_double("portfolio", "tolerance", defaults.solver.tolerance),
        time_limit: (time_limit > 0.0)
            .then(|| Duration::try_from_secs_f64(time_limit).ok())
            .flatten(),
    };

    Ok(PortfolioConfig {
        method,
        target_volatility: adapter.get_double(
            "portfolio",
            "target_volatility",
            defaults.target_volatility,
        ),
        max_sector_weight: adapter.get_double(
            "portfolio",
            "max_sector_weight",
            defaults.max_sector_weight,
        ),
        max_turnover: adapter.get_double("portfolio", "max_turnover", defaults.max_turnover),
        max_position_size: adapter.get_double(
            "portfolio",
            "max_position_size",
            defaults.max_position_size,
        ),
        min_position_size: adapter.get_double(
            "portfolio",
            "min_position_size",
            defaults.min_position_size,
        ),
        risk_free_rate: adapter.get_double("portfolio", "risk_free_rate", backtest.risk_free_rate),
        solver,
    })
}

fn get_count(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, FactorTraderError> {
    let value = adapter.get_int(section, key, default as i64);
    usize::try_from(value).map_err(|_| FactorTraderError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: format!("{key} must be non-negative"),
    })
}
