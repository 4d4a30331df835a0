use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::op::{Op, OpContext};
use cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = cli::log_level(args.log_level);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let ctx = OpContext {
        config_path: args.config_dir.clone(),
    };

    let output = args.command.execute(&ctx).await?;
    let rendered = output.to_string();
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}
