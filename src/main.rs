use anyhow::{Context, Result};
use chatlink::{ChatId, PersistOptions, SubscriptionStore, UserId};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "chatlink")]
#[command(about = "Inspect and edit a chatlink subscription store")]
struct Cli {
    /// Snapshot file (defaults to $CHATLINK_STORAGE_PATH or storage.json)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    /// Quiescence interval before the snapshot is written
    #[arg(long, global = true)]
    quiescence_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the whole store as JSON
    Show,
    /// List chats subscribed to a project
    Chats { url: String },
    /// List projects a chat is subscribed to
    Projects { chat: String },
    SetOwner { user: UserId },
    AddUser {
        #[arg(long)]
        initiator: UserId,
        target: String,
    },
    DelUser {
        #[arg(long)]
        initiator: UserId,
        target: UserId,
    },
    AddProject {
        #[arg(long)]
        user: UserId,
        chat: String,
        url: String,
    },
    DelProject {
        #[arg(long)]
        user: UserId,
        chat: String,
        url: String,
    },
    SetProjects {
        #[arg(long)]
        user: UserId,
        chat: String,
        urls: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,chatlink=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let options = resolve_options(&cli)?;
    let mut store = SubscriptionStore::open(&options)
        .await
        .with_context(|| format!("Failed to open store at '{}'", options.path.display()))?;

    let outcome = run(&mut store, cli.command);
    // Let any scheduled write land before the process exits.
    store.shutdown().await.context("Failed to stop snapshot writer")?;
    outcome
}

fn resolve_options(cli: &Cli) -> Result<PersistOptions> {
    let mut options = PersistOptions::from_env().context("Invalid store configuration")?;
    if let Some(path) = &cli.storage {
        options = options.path(path.clone());
    }
    if let Some(ms) = cli.quiescence_ms {
        options = options.quiescence(Duration::from_millis(ms));
    }
    Ok(options)
}

fn run(store: &mut SubscriptionStore, command: Command) -> Result<()> {
    match command {
        Command::Show => {
            println!("{}", serde_json::to_string_pretty(&store.state())?);
        }
        Command::Chats { url } => {
            for chat in store.get_chats(&url) {
                println!("{}", chat);
            }
        }
        Command::Projects { chat } => {
            for url in store.get_projects(ChatId::from(chat)) {
                println!("{}", url);
            }
        }
        Command::SetOwner { user } => {
            store.set_owner_id(user)?;
            info!("owner set to {}", user);
        }
        Command::AddUser { initiator, target } => {
            let added = store
                .add_user(initiator, &target)
                .with_context(|| format!("Cannot add user '{}'", target))?;
            info!("user {} allowed", added);
        }
        Command::DelUser { initiator, target } => {
            store
                .del_user(initiator, target)
                .with_context(|| format!("Cannot remove user {}", target))?;
            info!("user {} removed", target);
        }
        Command::AddProject { user, chat, url } => {
            store
                .add_project(user, ChatId::from(chat), &url)
                .with_context(|| format!("Cannot subscribe to '{}'", url))?;
        }
        Command::DelProject { user, chat, url } => {
            let removal = store
                .del_project(user, ChatId::from(chat), &url)
                .with_context(|| format!("Cannot unsubscribe from '{}'", url))?;
            println!(
                "projects left in chat: {}, chats left for project: {}",
                removal.projects_for_chat, removal.chats_for_project
            );
        }
        Command::SetProjects { user, chat, urls } => {
            store
                .set_projects(user, ChatId::from(chat), urls)
                .context("Cannot replace projects")?;
        }
    }
    Ok(())
}
