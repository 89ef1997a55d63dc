pub mod cli;
pub mod worker;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, filter::ParseError};

#[derive(Debug, Parser)]
#[command(
	version = cli::VERSION,
	rename_all = "kebab",
	styles = cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = kbase_config::load(&args.config)?;
	init_tracing(&config);

	let mut dispatcher = worker::build(&config).await?;

	tokio::select! {
		result = dispatcher.run() => result?,
		signal = tokio::signal::ctrl_c() => {
			signal?;
			tracing::info!("Shutdown signal received.");
		},
	}

	Ok(())
}

fn init_tracing(config: &kbase_config::Config) {
	let level = config.service.log_level.as_str();
	let (filter, invalid) = env_filter(level);

	tracing_subscriber::fmt().with_env_filter(filter).init();

	if let Some(err) = invalid {
		tracing::warn!(log_level = level, error = %err, "Invalid log level. Falling back to info.");
	}
}

fn env_filter(level: &str) -> (EnvFilter, Option<ParseError>) {
	match EnvFilter::try_new(level) {
		Ok(filter) => (filter, None),
		Err(err) => (EnvFilter::new("info"), Some(err)),
	}
}
