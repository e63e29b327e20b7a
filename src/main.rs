use clap::Parser;
use factortrader::cli::{Cli, log_level, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let level = log_level(cli.config_path());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    run(cli)
}
