use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = scout_indexer::Args::parse();

	scout_indexer::run(args).await
}
