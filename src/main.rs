use clap::Parser;
use tracing_subscriber::EnvFilter;

use wishing_machine::cli::{Cli, Command, run_serve, run_transcript_command};
use wishing_machine::config::Config;
use wishing_machine::wish::WishDetails;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("wishing_machine=info,tower_http=info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap so `env` attributes see it.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = Config::from_env()?;
    cli.apply_overrides(&mut config);

    match cli.command {
        None | Some(Command::Serve) => run_serve(config).await,
        Some(Command::Transcript {
            name,
            nice,
            naughty,
            gifts,
        }) => {
            let details = WishDetails {
                name,
                nice_items: nice,
                naughty_items: naughty,
                gifts,
            };
            run_transcript_command(config, details).await
        }
    }
}
