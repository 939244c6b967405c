//! Subcommands

use anyhow::Context;
use clap::Subcommand;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use c87_api_client::{FeedItem, FeedSource, VotePolarity};
use c87_sync::{LoadOutcome, MutationOutcome, MutationRequest, SyncEvent, SyncRuntime};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Exchange an email address for an API key
    Login {
        email: String,
    },

    /// Show the signed-in user, tier and balance
    Me,

    /// List feed items
    Feed {
        /// Number of pages to load
        #[arg(short, long, default_value = "1")]
        pages: usize,

        /// Only show items carrying this tag
        #[arg(short, long)]
        tag: Option<String>,

        /// Listing to page through (latest, for-you, watchlist)
        #[arg(short, long)]
        source: Option<FeedSource>,
    },

    /// Vote on an item (trust or fake) and earn the reward
    Vote {
        id: u64,
        #[arg(default_value = "trust")]
        polarity: VotePolarity,
    },

    /// Spend tokens to unlock an item's full analysis
    Unlock {
        id: u64,
    },

    /// Spend tokens to boost an item, or the account when no id is given
    Boost {
        id: Option<u64>,
    },

    /// Show the watchlist, or follow/unfollow a coin
    Watchlist {
        coin: Option<String>,
    },

    /// Show recent token transactions
    History {
        /// Number of transactions to show
        #[arg(short, long, default_value = "20")]
        count: usize,
    },

    /// Show trending narratives
    Trends,

    /// Follow the dashboard and feed until interrupted
    Watch {
        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

pub async fn execute(rt: &SyncRuntime, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { email } => {
            let snapshot = rt.login(&email).await?;
            let key = rt.session.token().context("login returned no key")?;
            println!("Logged in ({:?}), balance {}", snapshot.tier, snapshot.balance);
            println!("export C87_API_KEY={}", key.as_str());
        }

        Command::Me => {
            let me = rt.session.sync_from_remote().await?;
            println!(
                "{} (#{})  tier {:?}  balance {}",
                me.email.as_deref().unwrap_or("-"),
                me.user_id.unwrap_or_default(),
                me.tier,
                me.balance
            );
        }

        Command::Feed { pages, tag, source } => {
            if let Some(source) = source {
                rt.feed.set_source(source);
            }
            if let Some(tag) = tag {
                rt.trends.toggle(&tag);
            }
            for _ in 0..pages.max(1) {
                if rt.feed.load_next_page().await? == LoadOutcome::ReachedEnd {
                    break;
                }
            }
            let view = rt.feed.current_view();
            for item in &view.items {
                print_item(item);
            }
            if view.reached_end {
                println!("-- end of feed --");
            }
        }

        Command::Vote { id, polarity } => {
            rt.session.sync_from_remote().await?;
            rt.mutations.load_vote_status(id).await?;
            let outcome = rt
                .mutations
                .submit(MutationRequest::Vote {
                    target: id,
                    polarity,
                })
                .await?;
            print_outcome(&outcome);
        }

        Command::Unlock { id } => {
            rt.session.sync_from_remote().await?;
            let outcome = rt.mutations.submit(MutationRequest::Unlock { target: id }).await?;
            print_outcome(&outcome);
        }

        Command::Boost { id } => {
            rt.session.sync_from_remote().await?;
            let outcome = rt.mutations.submit(MutationRequest::Boost { target: id }).await?;
            print_outcome(&outcome);
        }

        Command::Watchlist { coin: None } => {
            let me = rt.session.sync_from_remote().await?;
            if me.watchlist.is_empty() {
                println!("No coins in watchlist");
            }
            for coin in &me.watchlist {
                println!("{}", coin);
            }
        }

        Command::Watchlist { coin: Some(coin) } => {
            rt.session.sync_from_remote().await?;
            let outcome = rt.watchlist.toggle(&coin).await?;
            let verb = if outcome.watching { "Following" } else { "Stopped following" };
            println!("{} {} ({} coins tracked)", verb, outcome.coin, outcome.watchlist.len());
        }

        Command::History { count } => {
            for tx in rt.mutations.history().await?.iter().take(count) {
                println!(
                    "{}  {:<12}  {:>9}  {}",
                    tx.created_at.format("%Y-%m-%d %H:%M"),
                    format!("{:?}", tx.transaction_type),
                    tx.amount.to_string(),
                    tx.news_id.map(|id| format!("item {}", id)).unwrap_or_default()
                );
            }
        }

        Command::Trends => {
            for n in rt.trends.refresh().await? {
                println!(
                    "#{:<20} velocity {:>5.1}x  {} in 24h",
                    n.tag, n.velocity, n.count_24h
                );
            }
        }

        Command::Watch { json } => watch(rt, json).await?,
    }
    Ok(())
}

async fn watch(rt: &SyncRuntime, json: bool) -> anyhow::Result<()> {
    let mut events = rt.bus.tap();
    rt.feed.load_next_page().await?;
    let handles = rt.spawn_background();
    info!("Watching; press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => print_event(&event, json)?,
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
        }
    }

    rt.shutdown();
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

fn print_event(event: &SyncEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        SyncEvent::Notification(n) => println!("[{:?}] {}", n.severity(), n.message()),
        SyncEvent::FeedUpdated { visible, .. } => println!("feed: {} items", visible),
        _ => {}
    }
    Ok(())
}

fn print_item(item: &FeedItem) {
    let tags = if item.tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", item.tags.join(", "))
    };
    println!(
        "{:>7}  {}  {}{}",
        item.id,
        item.published_at.format("%Y-%m-%d %H:%M"),
        item.title,
        tags
    );
}

fn print_outcome(outcome: &MutationOutcome) {
    let target = outcome
        .target
        .map(|id| format!(" item {}", id))
        .unwrap_or_default();
    println!(
        "{}{} confirmed: {}  balance {}",
        outcome.kind, target, outcome.amount, outcome.balance
    );
}
