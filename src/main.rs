use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;

use rivulet::config::{Config, Paths, Subscriptions};
use rivulet::feed::HttpFeedSource;
use rivulet::store::{Feed, List};
use rivulet::sync::SyncClient;
use rivulet::util::{truncate_to_width, DISPLAY_WIDTH};

#[derive(Parser, Debug)]
#[command(name = "rivulet", about = "Feed aggregator with read/bookmark sync")]
struct Args {
    /// Directory holding config.toml, urls.toml and the snapshot
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show every feed with its unread count and latest headline
    List,
    /// Fetch feeds and merge new items
    Refresh {
        #[arg(long)]
        category: Option<String>,
    },
    /// Mark every item read
    Read {
        #[arg(long)]
        category: Option<String>,
    },
    /// Print one item and mark it read
    Show { key: String },
    /// Toggle the bookmark on one item
    Bookmark { key: String },
    /// List bookmarked items
    Bookmarks,
    /// Exchange read/bookmark state with the configured relay
    Sync,
}

/// Everything a command needs, loaded from the config directory.
struct Session {
    config: Config,
    list: List,
    data_file: PathBuf,
}

impl Session {
    fn open(config_dir: Option<PathBuf>) -> Result<Self> {
        let paths = match config_dir {
            Some(dir) => Paths::in_dir(dir),
            None => Paths::from_home().context("Cannot locate config directory")?,
        };

        let config = Config::load(&paths.config_file()).with_context(|| {
            format!("Failed to load '{}'", paths.config_file().display())
        })?;
        let subscriptions = Subscriptions::load(&paths.subscriptions_file()).with_context(|| {
            format!("Failed to load '{}'", paths.subscriptions_file().display())
        })?;

        let mut list = List::new();
        list.apply_subscriptions(&subscriptions);

        let data_file = paths.data_file(&config);
        list.load(&data_file)
            .with_context(|| format!("Failed to restore '{}'", data_file.display()))?;

        Ok(Self {
            config,
            list,
            data_file,
        })
    }

    fn save(&mut self) -> Result<()> {
        self.list
            .save(&self.data_file)
            .with_context(|| format!("Failed to save '{}'", self.data_file.display()))
    }

    fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.config.fetch_timeout())
            .pool_idle_timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")
    }
}

fn print_feed(feed: &Feed) {
    let summary = feed.latest_summary();
    println!(
        "{:>4}  {}\n      {}",
        feed.unread_count(),
        feed.display_title(),
        truncate_to_width(&summary, DISPLAY_WIDTH - 6)
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut session = Session::open(args.config_dir)?;

    match args.command {
        Command::List => {
            let uncategorized: Vec<&Feed> = session
                .list
                .feeds()
                .iter()
                .filter(|f| f.category().is_empty())
                .collect();
            for feed in uncategorized {
                print_feed(feed);
            }
            for category in session.list.categories() {
                println!("[{}]", category);
                for feed in session.list.get_category(category)? {
                    print_feed(feed);
                }
            }
        }

        Command::Refresh { category } => {
            let source = HttpFeedSource::new(session.http_client()?)
                .with_timeout(session.config.fetch_timeout());

            let results = match category.as_deref() {
                Some(label) => {
                    let results: Vec<_> = session
                        .list
                        .refresh_category(label, &source)?
                        .collect()
                        .await;
                    session.list.reindex();
                    results
                }
                None => session.list.update_all(&source).await?,
            };

            for r in &results {
                match &r.result {
                    Ok(added) => println!("{:>4} new  {}", added, r.url),
                    Err(e) => println!("  --      {} ({})", r.url, e),
                }
            }
            session.save()?;
        }

        Command::Read { category } => {
            match category.as_deref() {
                Some(label) => session.list.mark_category_read(label)?,
                None => session.list.mark_all_read(),
            }
            session.save()?;
        }

        Command::Show { key } => {
            let item = session
                .list
                .item(&key)
                .cloned()
                .with_context(|| format!("No item with key '{}'", key))?;
            println!("{}\n{}", item.title, item.render());
            item.mark_read();
            session.save()?;
        }

        Command::Bookmark { key } => {
            let item = session
                .list
                .item(&key)
                .cloned()
                .with_context(|| format!("No item with key '{}'", key))?;
            let bookmarked = session.list.toggle_bookmark(&item)?;
            println!(
                "{} {}",
                if bookmarked { "Bookmarked" } else { "Removed" },
                item.title
            );
            session.save()?;
        }

        Command::Bookmarks => {
            if let Some(bookmarks) = session.list.bookmarks_feed() {
                for item in bookmarks.items() {
                    println!("{}\n      {}", item.display_title(), item.link());
                }
            }
        }

        Command::Sync => {
            let endpoint = session
                .config
                .sync_endpoint
                .clone()
                .context("No sync_endpoint configured")?;
            let mut client = SyncClient::new(session.http_client()?, endpoint)
                .with_timeout(session.config.fetch_timeout());
            if let Some(key) = session.config.sync_key.take() {
                client = client.with_api_key(key);
            }

            let applied = client.sync_list(&mut session.list).await?;
            println!("Synced {} items", applied);
            session.save()?;
        }
    }

    Ok(())
}
