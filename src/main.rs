use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatepass::capture::replay::ReplayCapture;
use gatepass::capture::Facing;
use gatepass::cli::{Cli, Commands, TokenCommands};
use gatepass::config::{self, Config};
use gatepass::decode::DecoderStack;
use gatepass::engine::RedemptionEngine;
use gatepass::export;
use gatepass::ledger::Ledger;
use gatepass::models::token::{embedded_id, Scope, TokenRecord};
use gatepass::session::{ScanSession, SessionConfig, SessionEvent};
use gatepass::store::memory::MemoryStore;
use gatepass::store::postgres::PgStore;
use gatepass::store::TokenStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "gatepass=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = Cli::parse();

    match &cfg.database_url {
        Some(url) => {
            tracing::info!("connecting to token store");
            let store = PgStore::connect(url).await?;
            store.migrate().await?;
            run_command(args.command, Arc::new(store), &cfg).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set — using a process-local in-memory store");
            run_command(args.command, Arc::new(MemoryStore::new()), &cfg).await
        }
    }
}

async fn run_command<S: TokenStore + 'static>(
    command: Commands,
    store: Arc<S>,
    cfg: &Config,
) -> anyhow::Result<()> {
    match command {
        Commands::Scan {
            frames,
            facing,
            export,
        } => run_scan(store, cfg, frames, facing, export).await,

        Commands::Redeem { payload, json } => {
            let engine = RedemptionEngine::new(store).with_timeout(cfg.redeem_timeout());
            let result = engine.redeem(&payload).await;
            if json {
                println!("{}", serde_json::to_string(&result)?);
            } else {
                println!("{result}");
            }
            Ok(())
        }

        Commands::Token { command } => handle_token_command(command, store.as_ref()).await,

        Commands::Export { output, delimiter } => {
            let records = store.list_used().await?;
            let mut buf = Vec::new();
            export::write_used_records(&mut buf, &records, &cfg.device_id, delimiter)?;
            match output {
                Some(path) => {
                    File::create(&path)?.write_all(&buf)?;
                    tracing::info!(records = records.len(), path = %path.display(), "used set exported");
                }
                None => std::io::stdout().write_all(&buf)?,
            }
            Ok(())
        }
    }
}

async fn run_scan<S: TokenStore + 'static>(
    store: Arc<S>,
    cfg: &Config,
    frames: PathBuf,
    facing: Option<String>,
    export_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let engine = RedemptionEngine::new(store).with_timeout(cfg.redeem_timeout());
    let decoders = DecoderStack::probe();
    let ledger = Arc::new(Ledger::new(cfg.device_id.clone()));
    let session_cfg = SessionConfig {
        scan_interval: cfg.scan_interval(),
        cooldown: cfg.cooldown(),
    };
    let facing = facing.map_or_else(|| cfg.facing(), |value| Facing::parse(&value));

    let (session, mut handle) = ScanSession::new(engine, decoders, ledger.clone(), session_cfg);
    let capture = ReplayCapture::new(frames);
    let runner = tokio::spawn(async move { session.run(&capture, facing).await });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                handle.stop();
                break;
            }
            event = handle.events.recv() => match event {
                Some(SessionEvent::Result(result)) => println!("{result}"),
                Some(SessionEvent::Rearmed) => tracing::debug!("re-armed"),
                Some(SessionEvent::Stopped) | None => break,
            }
        }
    }
    runner.await??;

    if let Some(path) = export_path {
        let entries = ledger.entries();
        let mut buf = Vec::new();
        export::write_ledger(&mut buf, &entries, export::DEFAULT_DELIMITER)?;
        File::create(&path)?.write_all(&buf)?;
        tracing::info!(entries = entries.len(), path = %path.display(), "session ledger exported");
    }
    Ok(())
}

async fn handle_token_command(
    command: TokenCommands,
    store: &dyn TokenStore,
) -> anyhow::Result<()> {
    match command {
        TokenCommands::Issue {
            subject,
            scope,
            id,
            embedded,
        } => {
            let scope = Scope::new(scope);
            let id = match id {
                Some(id) => id,
                None if embedded => embedded_id(&subject, &scope),
                None => uuid::Uuid::new_v4().to_string(),
            };
            store
                .insert(TokenRecord::issue(id.clone(), subject, scope))
                .await?;
            println!("{id}");
            Ok(())
        }

        TokenCommands::List { used_only } => {
            let records = if used_only {
                store.list_used().await?
            } else {
                store.list().await?
            };
            for record in &records {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.id,
                    record.subject,
                    record.scope,
                    record.state.as_str()
                );
            }
            Ok(())
        }
    }
}
