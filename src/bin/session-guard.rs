use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use session_guard::observability::metrics::get_metrics;
use session_guard::session::SessionClient;
use session_guard::transport::ApiResponse;
use session_guard::utils::channel::{self, SessionEvent};
use session_guard::utils::config_loader;
use session_guard::utils::logging;
use session_guard::utils::logging::LogLevel;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, env = "CONFIG", default_value = "session-guard.yaml")]
    config: String,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// print Prometheus metrics collected during the run
    #[arg(long)]
    dump_metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate and store the session
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "SESSION_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// End the session on the server and locally
    Logout,
    /// Revalidate the stored session and print the user
    Whoami,
    /// Authenticated GET
    Get { path: String },
    /// Authenticated POST with an optional JSON body
    Post {
        path: String,
        #[arg(long)]
        body: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load YAML config, init logging
    // -------------------------------

    let args = Args::parse();
    let service_config = config_loader::run(&args.config)?;
    logging::run(&service_config, args.log_level);

    // -------------------------------
    // 2. Session events: teardown notifications end up here
    // -------------------------------

    let events = channel::run();
    let watcher = tokio::spawn(watch_session_events(events.subscribe()));

    // -------------------------------
    // 3. Build the authenticated client
    // -------------------------------

    let client = SessionClient::from_config(&service_config, Arc::new(events.clone()))
        .await?
        .with_events(events.clone());

    // -------------------------------
    // 4. Run the command
    // -------------------------------

    let result = run_command(&client, args.command).await;

    drop(client);
    drop(events);
    let _ = watcher.await;

    if args.dump_metrics {
        match service_config.settings.metrics.is_enabled {
            true => println!("{}", get_metrics().await.render()?),
            false => warn!("--dump-metrics ignored, settings.metrics.is_enabled is false"),
        }
    }
    result
}

async fn run_command(client: &SessionClient, command: Command) -> Result<()> {
    match command {
        Command::Login { username, password } => {
            let user = client.login(&username, &password).await?;
            match user {
                Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
                None => println!("logged in as {}", username),
            }
        }
        Command::Logout => {
            client.logout().await;
            println!("logged out");
        }
        Command::Whoami => match client.restore().await? {
            Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
            None => return Err(anyhow!("not authenticated, run `login` first")),
        },
        Command::Get { path } => print_response(client.get(&path).await?),
        Command::Post { path, body } => {
            let body = body
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .map_err(|e| anyhow!("--body is not valid JSON: {}", e))?;
            print_response(client.post(&path, body).await?)
        }
    }
    Ok(())
}

fn print_response(response: ApiResponse) {
    info!("status {}", response.status);
    println!("{}", response.body);
}

/// Stands in for navigation: tells the user to authenticate again.
async fn watch_session_events(mut rx: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::Ended { reason }) => {
                warn!("session ended ({}); run `session-guard login` again", reason);
            }
            Ok(event) => info!("session event: {:?}", event),
            Err(RecvError::Lagged(skipped)) => warn!("missed {} session events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
