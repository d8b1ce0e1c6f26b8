use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = chatseq_worker::Args::parse();

	chatseq_worker::run(args).await
}
