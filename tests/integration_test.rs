//! End-to-end backtests through the data port.
//!
//! Tests cover:
//! - Full pipeline with a mock data port: snapshots, trades, final value
//! - Position P&L accounting on a known two-asset move
//! - Rebalance dates without score coverage
//! - Turnover cap across consecutive rebalances
//! - Solver fallback surfacing in the run result
//! - Sector caps applied from the data port's sector map
//! - JSON report export of a finished run

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use factortrader::adapters::json_report_adapter::JsonReportAdapter;
use factortrader::cli::run_backtest_pipeline;
use factortrader::domain::backtest::{BacktestConfig, Backtester, RebalanceSkip};
use factortrader::domain::error::FactorTraderError;
use factortrader::domain::optimizer::{Fallback, OptimizationMethod, PortfolioConfig, PortfolioOptimizer};
use factortrader::domain::portfolio::PortfolioState;
use factortrader::domain::score_table::CompositeScores;
use factortrader::domain::weights::Weights;
use factortrader::ports::report_port::{ReportPort, RunSettings};
use std::collections::HashMap;

/// Two noisy days, both at 100 on the 3rd, then A +2% and B -1%, then flat.
fn step_prices() -> factortrader::domain::price_table::PriceTable {
    price_table(
        date(2024, 1, 1),
        &["A", "B"],
        vec![
            vec![100.0, 101.0],
            vec![101.0, 100.0],
            vec![100.0, 100.0],
            vec![102.0, 99.0],
            vec![102.0, 99.0],
        ],
    )
}

mod full_backtest_pipeline {
    use super::*;

    #[test]
    fn equal_weight_run_through_mock_port() {
        let mut scores = CompositeScores::new();
        scores.insert(date(2024, 1, 3), "A", 1.0);
        scores.insert(date(2024, 1, 3), "B", 0.5);
        let port = MockDataPort::new(step_prices(), scores);

        let result = run_backtest_pipeline(
            &port,
            &frictionless_config(),
            &unconstrained_portfolio(OptimizationMethod::EqualWeight),
        )
        .unwrap();

        assert_eq!(result.values.len(), 5);
        assert_eq!(result.weights_history.len(), 1);
        assert_eq!(result.weights_history[0].date, date(2024, 1, 3));
        assert_eq!(result.transactions.len(), 2);
        assert!(result.fallbacks.is_empty());
        // 50/50 through +2% / -1%.
        assert_abs_diff_eq!(result.final_value().unwrap(), 100_500.0, epsilon = 1e-6);
        assert_eq!(result.metrics.n_trades, 2);
        assert_eq!(result.metrics.n_rebalances, 1);
    }

    #[test]
    fn costs_reduce_value_on_rebalance_date() {
        let mut scores = CompositeScores::new();
        scores.insert(date(2024, 1, 3), "A", 1.0);
        scores.insert(date(2024, 1, 3), "B", 0.5);
        let port = MockDataPort::new(step_prices(), scores);
        let config = BacktestConfig {
            execution: factortrader::domain::execution::ExecutionConfig {
                transaction_cost: 0.001,
                slippage: 0.0005,
            },
            ..frictionless_config()
        };

        let result = run_backtest_pipeline(
            &port,
            &config,
            &unconstrained_portfolio(OptimizationMethod::EqualWeight),
        )
        .unwrap();

        // Buying the whole book costs 0.15% of 100,000, then +0.5% on what is left.
        assert_abs_diff_eq!(result.weights_history[0].cost, 150.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.values[3].value, 99_850.0 * 1.005, epsilon = 1e-6);
    }

    #[test]
    fn data_errors_propagate() {
        let port = MockDataPort::new(step_prices(), CompositeScores::new()).with_error("disk gone");
        let err = run_backtest_pipeline(
            &port,
            &frictionless_config(),
            &PortfolioConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, FactorTraderError::Data { .. }));
    }

    #[test]
    fn date_range_outside_prices_is_invalid_input() {
        let port = MockDataPort::new(step_prices(), CompositeScores::new());
        let config = BacktestConfig {
            start_date: Some(date(2030, 1, 1)),
            ..frictionless_config()
        };
        let err = run_backtest_pipeline(&port, &config, &PortfolioConfig::default()).unwrap_err();
        assert!(matches!(err, FactorTraderError::InvalidInput { .. }));
    }
}

mod pnl_accounting {
    use super::*;

    #[test]
    fn two_asset_move_gives_known_value() {
        let mut state = PortfolioState::new(100_000.0);
        state.rebalance_to(Weights::from_pairs([("A", 0.6), ("B", 0.4)]));
        let today: HashMap<String, f64> =
            [("A".to_string(), 50.0), ("B".to_string(), 20.0)].into();
        let tomorrow: HashMap<String, f64> =
            [("A".to_string(), 51.0), ("B".to_string(), 19.8)].into();
        let pnl = state.daily_pnl(&today, &tomorrow);
        state.accrue(pnl);
        assert_abs_diff_eq!(state.value, 101_400.0, epsilon = 1e-6);
    }

    #[test]
    fn value_series_is_snapshotted_before_pnl() {
        let mut scores = CompositeScores::new();
        scores.insert(date(2024, 1, 3), "A", 1.0);
        scores.insert(date(2024, 1, 3), "B", 0.5);
        let result = Backtester::new(frictionless_config())
            .run(
                &step_prices(),
                &scores,
                &PortfolioOptimizer::new(unconstrained_portfolio(OptimizationMethod::EqualWeight)),
                None,
            )
            .unwrap();

        let values: Vec<f64> = result.values.iter().map(|v| v.value).collect();
        assert_abs_diff_eq!(values[2], 100_000.0, epsilon = 1e-9);
        assert_abs_diff_eq!(values[3], 100_500.0, epsilon = 1e-6);
        assert_abs_diff_eq!(values[4], 100_500.0, epsilon = 1e-6);
        assert!(result.values[2].weights.is_empty());
        assert_eq!(result.values[3].weights.len(), 2);
    }
}

mod rebalance_coverage {
    use super::*;

    #[test]
    fn dates_without_scores_keep_weights_and_logs() {
        let mut scores = CompositeScores::new();
        scores.insert(date(2024, 1, 3), "A", 1.0);
        scores.insert(date(2024, 1, 3), "B", 0.5);
        // 2024-01-04 has no row at all.
        let result = run_backtest_pipeline(
            &MockDataPort::new(step_prices(), scores),
            &frictionless_config(),
            &unconstrained_portfolio(OptimizationMethod::EqualWeight),
        )
        .unwrap();

        let skipped_on_4th: Vec<_> = result
            .skipped_rebalances
            .iter()
            .filter(|s| s.date == date(2024, 1, 4))
            .collect();
        assert_eq!(skipped_on_4th.len(), 1);
        assert_eq!(skipped_on_4th[0].reason, RebalanceSkip::NoScores);
        assert!(result
            .transactions
            .iter()
            .all(|t| t.date == date(2024, 1, 3)));
        assert_eq!(result.values[4].weights, result.values[3].weights);
    }

    #[test]
    fn no_coverage_anywhere_leaves_cash_untouched() {
        let mut scores = CompositeScores::new();
        scores.insert(date(2023, 6, 1), "A", 1.0);
        let result = run_backtest_pipeline(
            &MockDataPort::new(step_prices(), scores),
            &frictionless_config(),
            &PortfolioConfig::default(),
        )
        .unwrap();

        assert!(result.weights_history.is_empty());
        assert!(result.transactions.is_empty());
        assert!(result.values.iter().all(|v| v.value == 100_000.0));
        assert_eq!(result.metrics.total_return, 0.0);
        assert_eq!(result.metrics.volatility, 0.0);
        assert_eq!(result.metrics.sharpe_ratio, 0.0);
        assert_eq!(result.metrics.max_drawdown, 0.0);
    }

    #[test]
    fn unpriced_scored_tickers_are_skipped() {
        let mut scores = CompositeScores::new();
        scores.insert(date(2024, 1, 3), "ZZZ", 1.0);
        let result = run_backtest_pipeline(
            &MockDataPort::new(step_prices(), scores),
            &frictionless_config(),
            &PortfolioConfig::default(),
        )
        .unwrap();
        assert!(result
            .skipped_rebalances
            .iter()
            .any(|s| s.date == date(2024, 1, 3) && s.reason == RebalanceSkip::NoScoredTickers));
    }

    #[test]
    fn short_history_is_recorded() {
        let prices = synthetic_prices(date(2024, 1, 1), &["A", "B"], 10);
        let scores = flat_scores(prices.dates(), &["A", "B"]);
        let config = BacktestConfig {
            min_history_days: 5,
            ..frictionless_config()
        };
        let result = run_backtest_pipeline(
            &MockDataPort::new(prices, scores),
            &config,
            &unconstrained_portfolio(OptimizationMethod::EqualWeight),
        )
        .unwrap();

        let first = &result.skipped_rebalances[0];
        assert_eq!(
            first.reason,
            RebalanceSkip::InsufficientHistory {
                returns: 0,
                minimum: 5
            }
        );
        assert_eq!(result.weights_history[0].date, date(2024, 1, 6));
    }
}

mod turnover_cap {
    use super::*;

    #[test]
    fn rotation_is_blended_by_turnover_budget() {
        let prices = price_table(
            date(2024, 1, 1),
            &["A", "B"],
            vec![
                vec![100.0, 100.0],
                vec![101.0, 99.0],
                vec![100.0, 100.0],
                vec![100.0, 100.0],
                vec![100.0, 100.0],
            ],
        );
        let mut scores = CompositeScores::new();
        scores.insert(date(2024, 1, 3), "A", 1.0);
        scores.insert(date(2024, 1, 3), "B", 0.0);
        scores.insert(date(2024, 1, 4), "A", 0.0);
        scores.insert(date(2024, 1, 4), "B", 1.0);
        let config = BacktestConfig {
            max_holdings: 1,
            ..frictionless_config()
        };
        let portfolio = PortfolioConfig {
            max_turnover: 0.5,
            ..unconstrained_portfolio(OptimizationMethod::EqualWeight)
        };

        let result =
            run_backtest_pipeline(&MockDataPort::new(prices, scores), &config, &portfolio)
                .unwrap();

        assert_eq!(result.weights_history.len(), 2);
        assert_abs_diff_eq!(result.weights_history[0].weights.get("A"), 1.0, epsilon = 1e-12);
        // {A:1} -> {B:1} is turnover 1.0, halved by the 0.5 budget.
        let second = &result.weights_history[1].weights;
        assert_abs_diff_eq!(second.get("A"), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(second.get("B"), 0.5, epsilon = 1e-12);
    }
}

mod optimizer_fallbacks {
    use super::*;

    #[test]
    fn infeasible_risk_parity_falls_back_to_equal_weight() {
        let tickers = ["A", "B", "C"];
        let prices = synthetic_prices(date(2024, 1, 1), &tickers, 8);
        let scores = flat_scores(&prices.dates()[4..5], &tickers);
        let portfolio = PortfolioConfig {
            method: OptimizationMethod::RiskParity,
            max_position_size: 0.1,
            min_position_size: 0.0,
            ..PortfolioConfig::default()
        };

        let result =
            run_backtest_pipeline(&MockDataPort::new(prices, scores), &frictionless_config(), &portfolio)
                .unwrap();

        assert_eq!(result.fallbacks.len(), 1);
        assert!(matches!(
            &result.fallbacks[0].fallback,
            Fallback::SolverFailure { method, .. } if method == "risk_parity"
        ));
        let weights = &result.weights_history[0].weights;
        for t in tickers {
            assert_abs_diff_eq!(weights.get(t), 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn unknown_method_is_reported_per_rebalance() {
        let tickers = ["A", "B"];
        let prices = synthetic_prices(date(2024, 1, 1), &tickers, 6);
        let scores = flat_scores(&prices.dates()[2..4], &tickers);
        let portfolio = unconstrained_portfolio(OptimizationMethod::parse("black_litterman"));

        let result =
            run_backtest_pipeline(&MockDataPort::new(prices, scores), &frictionless_config(), &portfolio)
                .unwrap();

        assert_eq!(result.fallbacks.len(), 2);
        assert!(result.fallbacks.iter().all(|f| f.fallback
            == Fallback::UnknownMethod {
                method: "black_litterman".into()
            }));
    }

    #[test]
    fn hrp_run_produces_long_only_weights() {
        let tickers = ["A", "B", "C", "D"];
        let prices = synthetic_prices(date(2024, 1, 1), &tickers, 40);
        let scores = flat_scores(&prices.dates()[20..21], &tickers);
        let result = run_backtest_pipeline(
            &MockDataPort::new(prices, scores),
            &frictionless_config(),
            &unconstrained_portfolio(OptimizationMethod::HierarchicalRiskParity),
        )
        .unwrap();

        let weights = &result.weights_history[0].weights;
        assert_eq!(weights.len(), 4);
        assert!(weights.iter().all(|(_, w)| w > 0.0));
        assert_abs_diff_eq!(weights.sum(), 1.0, epsilon = 1e-9);
        assert!(result.fallbacks.is_empty());
    }
}

mod sector_constraints {
    use super::*;

    #[test]
    fn sector_map_from_port_caps_exposure() {
        let tickers = ["A", "B", "C"];
        let prices = synthetic_prices(date(2024, 1, 1), &tickers, 6);
        let scores = flat_scores(&prices.dates()[3..4], &tickers);
        let port = MockDataPort::new(prices, scores)
            .with_sector("A", "Tech")
            .with_sector("B", "Tech")
            .with_sector("C", "Energy");
        let portfolio = PortfolioConfig {
            max_sector_weight: 0.5,
            ..unconstrained_portfolio(OptimizationMethod::EqualWeight)
        };

        let result = run_backtest_pipeline(&port, &frictionless_config(), &portfolio).unwrap();

        // Tech 2/3 scaled to 1/2, then renormalised over 5/6.
        let weights = &result.weights_history[0].weights;
        assert_abs_diff_eq!(weights.get("A"), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(weights.get("B"), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(weights.get("C"), 0.4, epsilon = 1e-12);
    }

    #[test]
    fn empty_sector_map_changes_nothing() {
        let tickers = ["A", "B", "C"];
        let prices = synthetic_prices(date(2024, 1, 1), &tickers, 6);
        let scores = flat_scores(&prices.dates()[3..4], &tickers);
        let portfolio = PortfolioConfig {
            max_sector_weight: 0.2,
            ..unconstrained_portfolio(OptimizationMethod::EqualWeight)
        };
        let result = run_backtest_pipeline(
            &MockDataPort::new(prices, scores),
            &frictionless_config(),
            &portfolio,
        )
        .unwrap();
        assert_eq!(result.weights_history[0].weights, Weights::equal(&tickers));
    }
}

mod benchmark_metrics {
    use super::*;

    #[test]
    fn benchmark_column_feeds_beta() {
        let tickers = ["A", "B", "SPY"];
        let prices = synthetic_prices(date(2024, 1, 1), &tickers, 30);
        let scores = flat_scores(&prices.dates()[2..3], &["A", "B"]);
        let config = BacktestConfig {
            benchmark: Some("SPY".into()),
            ..frictionless_config()
        };
        let result = run_backtest_pipeline(
            &MockDataPort::new(prices, scores),
            &config,
            &unconstrained_portfolio(OptimizationMethod::EqualWeight),
        )
        .unwrap();
        assert!(result.metrics.beta.is_finite());
        assert!(result.metrics.beta != 1.0);
        assert!(result.metrics.information_ratio.is_finite());
    }

    #[test]
    fn missing_benchmark_column_defaults_beta() {
        let prices = synthetic_prices(date(2024, 1, 1), &["A", "B"], 10);
        let scores = flat_scores(&prices.dates()[2..3], &["A", "B"]);
        let config = BacktestConfig {
            benchmark: Some("SPY".into()),
            ..frictionless_config()
        };
        let result = run_backtest_pipeline(
            &MockDataPort::new(prices, scores),
            &config,
            &unconstrained_portfolio(OptimizationMethod::EqualWeight),
        )
        .unwrap();
        assert_eq!(result.metrics.beta, 1.0);
        assert_eq!(result.metrics.alpha, 0.0);
    }
}

mod report_export {
    use super::*;

    #[test]
    fn finished_run_exports_to_json() {
        let mut scores = CompositeScores::new();
        scores.insert(date(2024, 1, 3), "A", 1.0);
        scores.insert(date(2024, 1, 3), "B", 0.5);
        let config = frictionless_config();
        let portfolio = unconstrained_portfolio(OptimizationMethod::EqualWeight);
        let result =
            run_backtest_pipeline(&MockDataPort::new(step_prices(), scores), &config, &portfolio)
                .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        JsonReportAdapter::new(true)
            .write(
                &result,
                &RunSettings {
                    backtest: &config,
                    portfolio: &portfolio,
                },
                path.to_str().unwrap(),
            )
            .unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["values"].as_array().unwrap().len(), 5);
        assert_eq!(doc["weights_history"][0]["date"], "2024-01-03");
        assert_eq!(doc["metrics"]["n_trades"], 2);
        assert_eq!(doc["settings"]["benchmark"], serde_json::Value::Null);
    }
}
