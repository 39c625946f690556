use clap::Parser;
use snowbot_lib::config::{Args, Config};
use std::path::Path;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load env files before clap reads its env fallbacks
    let argv: Vec<String> = std::env::args().collect();
    let env_file = argv.iter().enumerate().find_map(|(i, arg)| {
        arg.strip_prefix("--env-file=")
            .map(str::to_string)
            .or_else(|| (arg == "--env-file").then(|| argv.get(i + 1).cloned()).flatten())
    });
    match env_file {
        Some(path) => {
            dotenvy::from_path(Path::new(&path))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let args = Args::parse();
    snowbot_lib::logging::init_logging(&args.log_level)?;

    let config = Config::from_args(args)?;
    tracing::debug!(?config, "configuration loaded");

    snowbot_lib::run(config).await
}
