use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use companion::{
    config::{Cli, Command, Config},
    remote::{
        HttpDocumentStore, LoadOutcome, SaveOutcome, Session, SyncGateway, TracingNotifier,
    },
    state::StateStore,
    storage::FileStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let cmd = cli.command.unwrap_or(Command::Migrate);

    let store = open_store(&cli.config)?;
    match cmd {
        Command::Migrate => {
            let report = store.last_migration();
            info!(
                from = %report.from,
                to = %report.to,
                gates = report.applied.len(),
                "state is current"
            );
            println!("{}", store.state().version);
            Ok(())
        }
        Command::Show => {
            println!("{}", serde_json::to_string_pretty(store.state())?);
            Ok(())
        }
        Command::Load => load(cli.config, store).await,
        Command::Save => save(cli.config, store).await,
    }
}

fn open_store(config: &Config) -> Result<StateStore<FileStorage>> {
    let storage = FileStorage::open(&config.data_dir)
        .with_context(|| format!("open local storage in {}", config.data_dir.display()))?;
    StateStore::open(storage).context("open local state")
}

fn gateway(
    config: &Config,
    store: StateStore<FileStorage>,
) -> Result<SyncGateway<FileStorage, HttpDocumentStore>> {
    let session = match config.identity() {
        Some(identity) => Session::signed_in(identity),
        None => Session::signed_out(),
    };
    Ok(SyncGateway::new(
        Arc::new(Mutex::new(store)),
        Arc::new(HttpDocumentStore::new(config.database_url.clone())?),
        Arc::new(session),
        Arc::new(TracingNotifier),
    ))
}

async fn load(config: Config, store: StateStore<FileStorage>) -> Result<()> {
    let gateway = gateway(&config, store)?;
    if let LoadOutcome::Loaded { roster, .. } = gateway.load().await? {
        for character in roster.iter() {
            println!(
                "{}\t{}\tlv {}\tskills {}",
                character.name, character.class, character.level, character.total_skill_levels
            );
        }
    }
    Ok(())
}

async fn save(config: Config, store: StateStore<FileStorage>) -> Result<()> {
    let gateway = gateway(&config, store)?;
    if let SaveOutcome::Started(write) = gateway.save().await? {
        write.wait().await?;
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
