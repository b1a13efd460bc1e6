use std::fs::{self, File};
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod editor;
mod lightbox;
mod page_editor;
mod render;
mod ui;

use api::ApiClient;
use app::{App, AppEvent};

/// Log to a file; the terminal belongs to the UI.
fn init_logging() -> Result<()> {
    let dir = dirs::data_local_dir()
        .context("Could not find data directory")?
        .join("wiki-tui");
    fs::create_dir_all(&dir).context("Could not create log directory")?;
    let file = File::create(dir.join("wiki-tui.log")).context("Could not create log file")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wiki_tui=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        )
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    if let Err(e) = init_logging() {
        eprintln!("Logging disabled: {e:#}");
    }

    let server_url = std::env::var("WIKI_SERVER_URL")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    tracing::info!("Using server {}", server_url);

    let mut api = ApiClient::new(&server_url);
    if let Err(e) = api.load_token() {
        tracing::warn!("Could not load stored token: {:#}", e);
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, App::new(api)).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        tracing::error!("Exited with error: {:?}", err);
        eprintln!("Error: {:?}", err);
    }

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<AppEvent>(100);

    let tx_input = tx.clone();
    tokio::spawn(async move {
        loop {
            match event::poll(Duration::from_millis(100)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        let _ = tx_input.send(AppEvent::Key(key)).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx_input.send(AppEvent::Error(format!("Input error: {e}"))).await;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    let _ = tx_input.send(AppEvent::Error(format!("Input error: {e}"))).await;
                }
            }
            let _ = tx_input.send(AppEvent::Tick).await;
        }
    });

    // Maintenance and the stored session are checked once at start-up
    let _ = tx.send(AppEvent::Startup).await;

    loop {
        terminal.draw(|f| ui::draw(f, &app))?;

        let Some(event) = rx.recv().await else {
            return Ok(());
        };

        match event {
            AppEvent::Key(key) => {
                if app.handle_key(key, tx.clone()).await? {
                    return Ok(());
                }
                if app.needs_terminal_clear {
                    terminal.clear()?;
                    app.needs_terminal_clear = false;
                }
            }
            AppEvent::Tick => {}
            AppEvent::Startup => app.verify_auth().await,
            AppEvent::AuthSuccess => app.on_auth_success().await,
            AppEvent::AuthFailed(msg) => app.on_auth_failed(msg),
            AppEvent::Error(msg) => app.set_error(msg),
        }
    }
}
