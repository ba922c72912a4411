//! testbed CLI
//!
//! 통합 테스트용 임시 스택을 띄우고, 조회하고, 정리합니다.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use testbed_core::config::TestbedConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    // 로깅 설정도 파일에서 오므로 명령 실행 전에 한 번 로드
    let loaded = TestbedConfig::load_or_default(&cli.config).await;

    let mut general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_default();
    if let Some(level) = &cli.log_level {
        general.log_level = level.clone();
    }
    logging::init_tracing(&general).map_err(|e| CliError::Config(e.to_string()))?;

    tracing::debug!(config = %cli.config.display(), "testbed starting");
    let writer = OutputWriter::new(cli.output);

    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
        Commands::Up(args) => commands::up::execute(args, loaded?, &writer).await,
        Commands::Down(args) => commands::down::execute(args, &loaded?, &writer).await,
        Commands::Status(args) => commands::status::execute(args, &loaded?, &writer).await,
        Commands::RenderLb(args) => commands::render_lb::execute(args, &loaded?, &writer),
    }
}
