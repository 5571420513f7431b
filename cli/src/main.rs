//! Message Feed CLI
//!
//! Prints the feed, newest message first, optionally posting a message
//! beforehand. With `--watch` it keeps refreshing and prints new messages as
//! they arrive until interrupted.

mod client;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use messagefeed::adapters::RpcLedger;
use messagefeed::domain::entities::LoginMethod;
use messagefeed::{
    Address, ClientConfig, FeedPoster, FeedSession, Keypair, Ledger, LoopState, Message,
    RefreshConfig, RefreshLoop,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use client::FeedServerClient;

/// How often `--watch` checks whether the server moved to a new feed
const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(name = "messagefeed", version, about = "Read and post to a message feed")]
struct Args {
    /// Base URL of the message feed server
    #[arg(long, env = "MESSAGE_FEED_SERVER", default_value = "http://localhost:8081")]
    server: String,

    /// Keep running and print new messages as they arrive
    #[arg(long)]
    watch: bool,

    /// Ban this user account along with the post
    #[arg(long, value_name = "ADDRESS", requires = "text")]
    ban: Option<Address>,

    /// Message to post; without one the feed is only printed
    text: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log to stderr; stdout carries the feed
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let server = FeedServerClient::new(&args.server)?;

    let (config, feed) = server.get_config().await;
    tracing::info!(url = %config.url, "Cluster RPC URL");

    let commitment = config
        .commitment
        .clone()
        .unwrap_or_else(|| "confirmed".to_string());
    let ledger = Arc::new(
        RpcLedger::new(config.url.clone(), commitment).context("Failed to build ledger client")?,
    );
    let session = Arc::new(FeedSession::new(ledger.clone(), feed));
    session.poll().await.context("Failed to load messages")?;

    let text = args.text.join(" ");
    if !text.is_empty() {
        post(&server, &config, ledger, &session, &text, args.ban.as_ref()).await?;
    }

    print!("{}", render_feed(&session.messages().await));

    if args.watch {
        watch(&server, session).await;
    }
    Ok(())
}

/// Log in as a fresh local user, fund a payer and post `text`
async fn post<L: Ledger>(
    server: &FeedServerClient,
    config: &ClientConfig,
    ledger: Arc<L>,
    session: &FeedSession<L>,
    text: &str,
    ban: Option<&Address>,
) -> Result<()> {
    if config.login_method != LoginMethod::Local {
        bail!("Unsupported login method: {}", config.login_method);
    }
    let id = Keypair::generate().address().to_string();
    let user = server.login(&id).await.context("Login failed")?;
    session.set_user(Some(user));

    let balance = FeedPoster::new(ledger.clone())
        .required_balance(text, false)
        .await?;
    let payer = Keypair::generate();
    ledger
        .request_airdrop(&payer.address(), balance)
        .await
        .context("Failed to fund payer")?;

    tracing::info!(text, "Posting message");
    let notification = session.post(&payer, text, ban).await;
    match notification.transaction_url(&config.url) {
        Some(url) => tracing::info!(%url, "{}", notification.text),
        None => bail!("{}", notification.text),
    }

    session.poll().await.context("Failed to load messages")?;
    Ok(())
}

async fn watch<L: Ledger + 'static>(server: &FeedServerClient, session: Arc<FeedSession<L>>) {
    let mut events = session.subscribe();
    let handle = RefreshLoop::spawn(session.clone(), RefreshConfig::default());
    let mut states = handle.state_changes();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let mut config_poll = tokio::time::interval(CONFIG_POLL_INTERVAL);
    config_poll.tick().await;

    tracing::info!("Watching for new messages, press Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(message) => println!("{}", format_new_message(&message)),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Fell behind on new messages")
                }
                Err(RecvError::Closed) => break,
            },
            Ok(()) = states.changed() => {
                if *states.borrow() == LoopState::Suspended {
                    tracing::info!("No activity, refresh suspended. Press Enter to resume");
                }
            }
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(_)) => handle.touch(),
                Ok(None) | Err(_) => stdin_open = false,
            },
            _ = config_poll.tick() => match server.fetch_config().await {
                Ok(ClientConfig { loading: false, message_feed: Some(feed), .. }) => {
                    if session.apply_config(feed).await {
                        tracing::info!("Server moved to a new feed, reloading");
                        handle.touch();
                    }
                }
                Ok(_) => tracing::debug!("Server is loading a new feed"),
                Err(e) => tracing::warn!(error = %format!("{:#}", e), "Unable to fetch config"),
            },
        }
    }

    handle.stop().await;
}

/// The whole feed, newest message first
fn render_feed(messages: &[Message]) -> String {
    let mut out = String::from("\nMessage Feed\n------------\n");
    for (index, message) in messages.iter().rev().enumerate() {
        out.push_str(&format!(
            "Message #{} from \"{}\": {}\n",
            index, message.name, message.text
        ));
    }
    out
}

fn format_new_message(message: &Message) -> String {
    format!("New message from \"{}\": {}", message.name, message.text)
}
