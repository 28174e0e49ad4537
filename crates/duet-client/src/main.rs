mod app;
mod commands;
mod config;

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use duet_core::Hub;
use duet_core::lock::{AlwaysUnlock, LockGate, PasswordUnlock};
use duet_db::Database;
use duet_types::api::RenderedThread;

use app::{App, Flow};
use config::{Config, UnlockMode};

enum Input {
    Line(Option<String>),
    Render(RenderedThread),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "duet=info,duet_core=info,duet_db=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);
    info!("Database at {}", config.db_path.display());

    let hub = Hub::new(db.clone());
    let gate = match config.unlock {
        UnlockMode::Password => LockGate::new(PasswordUnlock::new(db)),
        UnlockMode::Always => {
            warn!("DUET_UNLOCK=always: any input unlocks the screen");
            LockGate::new(AlwaysUnlock)
        }
    };

    let mut app = App::new(hub, gate);
    println!("duet ready. Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut render_rx: Option<watch::Receiver<RenderedThread>> = None;
    let mut shown_view: Option<Uuid> = None;

    loop {
        let input = tokio::select! {
            line = lines.next_line() => Input::Line(line?),
            thread = next_render(&mut render_rx) => Input::Render(thread),
        };

        match input {
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let flow = match commands::parse(&line) {
                    Ok(cmd) => app.handle(cmd).await,
                    Err(usage) => {
                        println!("{}", usage);
                        Ok(Flow::Continue)
                    }
                };
                match flow {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("error: {:#}", e),
                }
                // A fresh feed starts stale, so a newly opened thread prints once
                if app.view_id() != shown_view {
                    shown_view = app.view_id();
                    render_rx = app.render_feed();
                }
            }
            Input::Render(thread) => {
                if !app.is_locked() {
                    app.print_thread(&thread);
                }
            }
        }
    }

    info!("Bye");
    Ok(())
}

/// Next rendered thread of the open view. Pends forever while nothing is open.
async fn next_render(rx: &mut Option<watch::Receiver<RenderedThread>>) -> RenderedThread {
    if let Some(feed) = rx.as_mut() {
        if feed.changed().await.is_ok() {
            return feed.borrow_and_update().clone();
        }
    }
    *rx = None;
    std::future::pending().await
}
