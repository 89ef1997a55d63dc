use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = kbase_worker::Args::parse();
	kbase_worker::run(args).await
}
