use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = chatseq_api::Args::parse();

	chatseq_api::run(args).await
}
