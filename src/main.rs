mod api;
mod config;
mod dates;
mod files;
mod images;
mod listener;
mod model;
mod output;
mod realtime;
mod session;
mod shell;
mod state;
mod store;
mod transcript;
mod transport;

use std::io::{self, Read};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use dialoguer::{Input, Password};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::api::GatewayClient;
use crate::config::Config;
use crate::dates::current_epoch_millis;
use crate::images::{HttpMediaFetcher, ImageCache};
use crate::output::ThreadListOutput;
use crate::session::SessionStore;
use crate::state::LocalDb;
use crate::store::ThreadStore;
use crate::transcript::write_transcript;
use crate::transport::{Transport, TransportError};

#[derive(Parser)]
#[command(
    name = "messenger",
    version,
    about = "Messenger in the terminal",
    after_help = "Examples:\n  messenger login --email you@example.com\n  messenger\n  messenger threads alice\n  messenger threads --json --limit 10\n  messenger read 100004 --limit 20\n  messenger send 100004 --text \"on my way\"\n  echo hi | messenger send 100004 --stdin"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[arg(long, global = true, help = "Output JSON instead of a table")]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Log in and save the session")]
    Login(LoginArgs),
    #[command(about = "Forget the saved session")]
    Logout,
    #[command(about = "Interactive mode with live notifications (default)")]
    Shell,
    #[command(about = "List recent threads, optionally filtered")]
    Threads(ThreadsArgs),
    #[command(about = "Print a thread's latest messages")]
    Read(ReadArgs),
    #[command(about = "Send a message to a thread")]
    Send(SendArgs),
    #[command(about = "Show the resolved configuration")]
    Doctor,
}

#[derive(Args)]
struct LoginArgs {
    #[arg(long, help = "Account email")]
    email: Option<String>,
}

#[derive(Args)]
struct ThreadsArgs {
    #[arg(help = "Case-insensitive pattern matched against names")]
    search: Option<String>,

    #[arg(long, help = "Maximum number of threads to load")]
    limit: Option<usize>,
}

#[derive(Args)]
struct ReadArgs {
    #[arg(help = "Thread id")]
    thread_id: String,

    #[arg(long, help = "Maximum number of messages to fetch")]
    limit: Option<usize>,
}

#[derive(Args)]
struct SendArgs {
    #[arg(help = "Thread id")]
    thread_id: String,

    #[arg(long, help = "Message text")]
    text: Option<String>,

    #[arg(long, help = "Read message text from stdin")]
    stdin: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendOutput<'a> {
    thread_id: &'a str,
    sent: bool,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("{error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .with_writer(io::stderr)
        .init();

    let session_store = SessionStore::new(config.session_path.clone(), config.gateway_url.clone());
    let local_db = LocalDb::new(config.state_path.clone(), config.gateway_url.clone());
    let gateway = GatewayClient::new(config.gateway_url.clone())?;

    match cli.command.unwrap_or(Command::Shell) {
        Command::Login(args) => {
            handle_login(args, &gateway, &session_store, &local_db).await?;
        }
        Command::Logout => {
            if let Some(state) = session_store.load()? {
                let result = match gateway.resume(&state).await {
                    Ok(session) => gateway.with_session(session).logout().await,
                    Err(error) => Err(error),
                };
                if let Err(error) = result {
                    debug!(%error, "remote logout failed");
                }
            }
            session_store.clear()?;
            local_db.clear()?;
            println!("Logged out.");
        }
        Command::Shell => {
            let client = connect(gateway, &session_store, &local_db).await?;
            let images = image_cache(&config)?;
            shell::run(client, images, local_db, &config.realtime_url).await?;
        }
        Command::Threads(args) => {
            let client = connect(gateway, &session_store, &local_db).await?;
            let mut store = ThreadStore::new(client.current_user_id());
            store.refresh(&client, args.limit).await?;
            let output = ThreadListOutput::build(store.search(args.search.as_deref()), current_epoch_millis());
            output::print_thread_list(&output, cli.json)?;
        }
        Command::Read(args) => {
            let client = connect(gateway, &session_store, &local_db).await?;
            let mut store = ThreadStore::new(client.current_user_id());
            store.refresh(&client, None).await?;
            let thread = store.fetch_page(&client, &args.thread_id, args.limit).await?;
            local_db.set_last_thread(&thread.thread_id)?;

            let messages = thread.messages.unwrap_or_default();
            if cli.json {
                output::print_json(&messages)?;
            } else {
                let images = image_cache(&config)?;
                write_transcript(&mut io::stdout(), &messages, store.current_user_id(), &images).await?;
            }
        }
        Command::Send(args) => {
            let body = resolve_message_body(args.text, args.stdin)?;
            let client = connect(gateway, &session_store, &local_db).await?;
            let mut store = ThreadStore::new(client.current_user_id());
            store.load_threads(&client, None).await?;
            store.send_message(&client, &body, &args.thread_id).await?;
            local_db.set_last_thread(&args.thread_id)?;
            if cli.json {
                output::print_json(&SendOutput {
                    thread_id: &args.thread_id,
                    sent: true,
                })?;
            } else {
                println!("Sent.");
            }
        }
        Command::Doctor => {
            if cli.json {
                output::print_json(&config)?;
            } else {
                println!("gateway:  {}", config.gateway_url);
                println!("realtime: {}", config.realtime_url);
                println!("session:  {}", config.session_path.display());
                println!("state:    {}", config.state_path.display());
                println!("cache:    {}", config.cache_dir.display());
                println!("log:      {}", config.log_filter);
                let logged_in = session_store.load()?.is_some();
                println!("session saved: {}", if logged_in { "yes" } else { "no" });
            }
        }
    }

    Ok(())
}

async fn handle_login(
    args: LoginArgs,
    gateway: &GatewayClient,
    session_store: &SessionStore,
    local_db: &LocalDb,
) -> Result<(), Box<dyn std::error::Error>> {
    let email = match args.email {
        Some(email) => email.trim().to_string(),
        None => {
            let email: String = Input::new().with_prompt("Email").interact_text()?;
            email.trim().to_string()
        }
    };
    let password = Password::new().with_prompt("Password").interact()?;

    let session = match gateway.login(&email, &password).await {
        Ok(session) => session,
        Err(error) => {
            print_login_error(&error);
            return Err(error.into());
        }
    };
    match session.app_state() {
        Some(state) => session_store.store(&state)?,
        None => eprintln!("The gateway did not return a session; you will need to log in again next time."),
    }
    local_db.set_current_user(session.user_id.clone())?;
    println!("Logged in as user {}.", session.user_id);
    Ok(())
}

/// Resumes the saved session. The gateway may hand back a refreshed state,
/// which replaces the stored one.
async fn connect(
    gateway: GatewayClient,
    session_store: &SessionStore,
    local_db: &LocalDb,
) -> Result<GatewayClient, Box<dyn std::error::Error>> {
    let Some(state) = session_store.load()? else {
        return Err("No saved session. Run `messenger login` first.".into());
    };
    let session = gateway.resume(&state).await?;
    if let Some(state) = session.app_state() {
        session_store.store(&state)?;
    }
    local_db.set_current_user(session.user_id.clone())?;
    Ok(gateway.with_session(session))
}

fn image_cache(config: &Config) -> Result<ImageCache, Box<dyn std::error::Error>> {
    let fetcher = HttpMediaFetcher::new()?;
    Ok(ImageCache::new(config.cache_dir.clone(), Arc::new(fetcher)))
}

fn resolve_message_body(text: Option<String>, stdin: bool) -> Result<String, Box<dyn std::error::Error>> {
    if stdin {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        let trimmed = buffer.trim();
        if trimmed.is_empty() {
            return Err("stdin was empty".into());
        }
        return Ok(trimmed.to_string());
    }

    match text {
        Some(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
        Some(_) => Err("message text is empty".into()),
        None => Err("Provide --text or --stdin".into()),
    }
}

fn print_login_error(error: &TransportError) {
    match error {
        TransportError::Gateway { error, description } => {
            eprintln!("Login failed: {description} ({error})");
        }
        TransportError::Status(status) => {
            eprintln!("Login failed: gateway returned HTTP {status}");
        }
        TransportError::Http(error) if error.is_connect() => {
            eprintln!("Login failed: could not reach the gateway");
        }
        _ => {}
    }
}
