use clap::Parser;
use vocab_speaker_lib::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Settings such as VOCAB_SERVER_URL may come from a .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[ENV] No .env loaded: {}", e);
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    cli::run(Cli::parse()).await
}
