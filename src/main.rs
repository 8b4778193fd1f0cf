use anyhow::Result;
use clap::Parser;
use taxmate::cli::{Cli, Commands};
use taxmate::core::Credentials;
use taxmate::{utils, ChatSession, CoordinatorEvent, Settings, System};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

const FLUSH_LIMIT: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = Settings::new()?;
    if let Some(backend) = cli.backend {
        settings.storage.backend = backend;
    }
    if let Some(path) = cli.path {
        settings.storage.path = path;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Initialize the system
    let (system, events) = System::start(settings).await?;
    watch_coordinator_events(events);

    let result = match cli.command {
        Commands::Chat { prompt } => handle_chat(&system, prompt).await,
        Commands::Interactive => handle_interactive(&system).await,
        Commands::History { limit } => handle_history(&system, limit).await,
        Commands::Clear => handle_clear(&system).await,
        Commands::CheckStorage => handle_check_storage(&system).await,
        Commands::Configure { api_key, model } => handle_configure(&system, api_key, model).await,
        Commands::VerifyKey => handle_verify_key(&system).await,
    };

    // Shutdown gracefully
    system.shutdown().await?;

    result
}

fn watch_coordinator_events(mut events: broadcast::Receiver<CoordinatorEvent>) {
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CoordinatorEvent::StorageInitError { error } => {
                    utils::print_error(&format!("Storage initialization failed: {}", error));
                }
            }
        }
    });
}

async fn start_session(system: &System) -> Result<ChatSession> {
    let mut session = system.session();
    session.start().await?;
    Ok(session)
}

async fn finish_session(session: &ChatSession) {
    if !session.flush(FLUSH_LIMIT).await {
        utils::print_error("Some messages could not be saved before exit");
    }
}

async fn handle_chat(system: &System, prompt: String) -> Result<()> {
    let mut session = start_session(system).await?;
    utils::print_info("Sending request...");

    for message in session.send(&prompt).await.iter().skip(1) {
        println!();
        utils::print_message(message);
    }

    finish_session(&session).await;
    Ok(())
}

async fn handle_interactive(system: &System) -> Result<()> {
    let mut session = start_session(system).await?;

    utils::print_header("Tax Assistant");
    utils::print_info("Type your questions (/clear to reset, /quit to exit)\n");
    for message in session.transcript() {
        utils::print_message(message);
    }

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt("\nYou: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            break;
        }

        match input.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => match session.clear().await {
                Ok(notice) => utils::print_message(&notice),
                Err(e) => utils::print_error(&format!("{}. Please try again.", e)),
            },
            text => {
                for message in session.send(text).await.iter().skip(1) {
                    utils::print_message(message);
                }
            }
        }
    }

    finish_session(&session).await;
    Ok(())
}

async fn handle_history(system: &System, limit: Option<usize>) -> Result<()> {
    let session = start_session(system).await?;
    let history = session.history().load().await;

    utils::print_header(&format!("Chat History ({} messages)", history.len()));
    let skip = limit.map(|n| history.len().saturating_sub(n)).unwrap_or(0);
    for message in history.iter().skip(skip) {
        utils::print_message(message);
    }
    Ok(())
}

async fn handle_clear(system: &System) -> Result<()> {
    let mut session = start_session(system).await?;
    let notice = session.clear().await?;
    utils::print_success(&notice.text);
    Ok(())
}

async fn handle_check_storage(system: &System) -> Result<()> {
    let status = system.coordinator().check_storage().await;
    if status.available {
        utils::print_success("Storage available");
    } else {
        utils::print_error(&format!(
            "Storage unavailable: {}",
            status.error.unwrap_or_default()
        ));
    }
    Ok(())
}

async fn handle_configure(system: &System, api_key: String, model: String) -> Result<()> {
    Credentials::save(system.store().as_ref(), &api_key, &model).await?;
    utils::print_success("Settings saved successfully!");
    Ok(())
}

async fn handle_verify_key(system: &System) -> Result<()> {
    utils::print_info("Testing API key...");
    let session = system.session();
    match session.verify_key().await {
        Ok(()) => utils::print_success("API key is valid!"),
        Err(e) => utils::print_error(&format!("Error: {}", e)),
    }
    Ok(())
}
