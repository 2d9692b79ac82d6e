use clap::Parser;
use parsort::cli::{Cli, run_cli};
use parsort::output::OutputFormatter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parsort=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let paths = cli.app_paths();
    tracing::debug!(config = %paths.config_file.display(), state = %paths.state_dir.display(), "resolved paths");

    if let Err(e) = run_cli(cli.command, &paths) {
        OutputFormatter::error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
