//! Plain-text summary report for the terminal.

use std::fmt::Write;

use crate::domain::backtest::BacktestResult;
use crate::ports::report_port::RunSettings;

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

pub fn generate_report(result: &BacktestResult, settings: &RunSettings<'_>) -> String {
    let m = &result.metrics;
    let bt = settings.backtest;
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "Backtest Results");
    let _ = writeln!(out, "================");
    let _ = writeln!(out);
    let _ = writeln!(out, "Performance Metrics:");
    let _ = writeln!(out, "- Total Return: {}", pct(m.total_return));
    let _ = writeln!(out, "- CAGR: {}", pct(m.cagr));
    let _ = writeln!(out, "- Volatility: {}", pct(m.volatility));
    let _ = writeln!(out, "- Sharpe Ratio: {:.2}", m.sharpe_ratio);
    let _ = writeln!(out, "- Sortino Ratio: {:.2}", m.sortino_ratio);
    let _ = writeln!(out, "- Max Drawdown: {}", pct(m.max_drawdown));
    let _ = writeln!(out, "- Calmar Ratio: {:.2}", m.calmar_ratio);
    let _ = writeln!(out, "- Win Rate: {}", pct(m.win_rate));
    let _ = writeln!(out);
    let _ = writeln!(out, "Risk Metrics:");
    let _ = writeln!(out, "- Beta: {:.2}", m.beta);
    let _ = writeln!(out, "- Alpha: {}", pct(m.alpha));
    let _ = writeln!(out, "- Information Ratio: {:.2}", m.information_ratio);
    let _ = writeln!(out);
    let _ = writeln!(out, "Portfolio Statistics:");
    let _ = writeln!(out, "- Number of Trades: {}", m.n_trades);
    let _ = writeln!(out, "- Number of Rebalances: {}", m.n_rebalances);
    let _ = writeln!(out, "- Skipped Rebalances: {}", result.skipped_rebalances.len());
    let _ = writeln!(out, "- Optimizer Fallbacks: {}", result.fallbacks.len());
    let _ = writeln!(out, "- Avg Positions: {:.1}", m.avg_n_positions);
    if let Some(final_value) = result.final_value() {
        let _ = writeln!(out, "- Final Value: ${final_value:.2}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Configuration:");
    let _ = writeln!(out, "- Initial Capital: ${:.0}", bt.initial_capital);
    let _ = writeln!(out, "- Rebalance Frequency: {}", bt.rebalance_frequency);
    let _ = writeln!(out, "- Optimization Method: {}", settings.portfolio.method);
    let _ = writeln!(
        out,
        "- Transaction Cost: {:.2}%",
        bt.execution.transaction_cost * 100.0
    );
    let _ = writeln!(out, "- Slippage: {:.2}%", bt.execution.slippage * 100.0);
    out
}
