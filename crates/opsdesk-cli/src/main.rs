use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use opsdesk_core::models::{NewNotification, NewTask, NotificationKind, Priority, Recipients, User};
use opsdesk_core::{CoreRuntime, DataStore, LoopbackTransport, MemoryStore};

mod seed;

#[derive(Parser)]
#[command(name = "opsdesk")]
#[command(about = "Demo harness for the opsdesk core, backed by an in-memory store")]
struct Cli {
    /// Emit JSON instead of text where a command supports it
    #[arg(long, short)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the seeded team roster
    Roster,

    /// Run a scripted exchange between two seeded users
    Demo {
        /// Email of the user driving the session
        #[arg(long, default_value = "frontend@opsdesk.test")]
        email: String,

        /// Email of the user on the other side
        #[arg(long, default_value = "medical@opsdesk.test")]
        peer: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let store = Arc::new(seed::seeded_store());

    match cli.command {
        Commands::Roster => roster(store, cli.json).await,
        Commands::Demo { email, peer } => demo(store, &email, &peer, cli.json).await,
    }
}

async fn roster(store: Arc<MemoryStore>, json: bool) -> Result<()> {
    let users = store.users().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&users)?);
        return Ok(());
    }
    for user in users {
        println!("{:>3}  {:<28} {}", user.id, user.email, user.role.display_name());
    }
    Ok(())
}

async fn demo(store: Arc<MemoryStore>, email: &str, peer_email: &str, json: bool) -> Result<()> {
    let peer = find_user(&store, peer_email).await?;

    // Two full runtimes over the same store, as two browser sessions would be.
    let mine = CoreRuntime::new(store.clone(), Arc::new(LoopbackTransport::new(store.clone())));
    let theirs = CoreRuntime::new(store.clone(), Arc::new(LoopbackTransport::new(store.clone())));

    let me = mine.login(email, seed::DEMO_PASSWORD, false).await?;
    theirs.login(peer_email, seed::DEMO_PASSWORD, false).await?;

    let conversation = mine.engine().get_or_create_conversation(me.id, peer.id).await?;
    mine.engine().open_conversation(conversation.id).await?;
    mine.engine()
        .send_message(conversation.id, "Morning! Did the sync land?")
        .await?;

    theirs.engine().open_conversation(conversation.id).await?;
    theirs
        .engine()
        .send_message(conversation.id, "It did, dashboards look clean.")
        .await?;

    let history = store.messages(conversation.id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&history)?);
    } else {
        println!("-- conversation {} --", conversation.id);
        for message in &history {
            let who = if message.sender_id == me.id { &me.name } else { &peer.name };
            println!("[{}] {}: {}", message.sent_at.format("%H:%M:%S"), who, message.text);
        }
    }

    mine.feed()
        .send_notification(&NewNotification {
            title: "Deploy window".into(),
            message: "Staging freeze at 16:00".into(),
            priority: Priority::Medium,
            kind: NotificationKind::Info,
            recipients: Recipients::All,
        })
        .await?;
    mine.feed()
        .assign_task(&NewTask {
            title: "Review dashboard diff".into(),
            description: "Before the freeze".into(),
            due_date: Utc::now() + chrono::Duration::hours(6),
            priority: Priority::High,
            assignees: vec![peer.id],
        })
        .await?;

    let inbox = theirs.feed().notifications().await?;
    let tasks = theirs.feed().tasks().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&inbox)?);
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        println!("-- {}'s feed --", peer.name);
        for n in &inbox {
            println!("[{:?}] {}: {}", n.priority, n.title, n.message);
        }
        for t in &tasks {
            println!("task: {} (due {})", t.title, t.due_date.format("%b %-d %H:%M"));
        }
    }

    theirs.logout().await;
    mine.logout().await;
    Ok(())
}

async fn find_user(store: &Arc<MemoryStore>, email: &str) -> Result<User> {
    store
        .users()
        .await?
        .into_iter()
        .find(|u| u.email == email)
        .with_context(|| format!("no seeded user with email {email}"))
}
