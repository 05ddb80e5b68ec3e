use std::collections::HashMap;

use rss_corpus::app::App;
use rss_corpus::config::Config;
use rss_corpus::error::{AppError, Result};
use rss_corpus::feed::SelectionMethod;
use rss_corpus::models::Target;

const USAGE: &str = "usage: rss-corpus <command>

  --update [bulk|batch|roulette]   fetch, stage and commit one cycle
  --download                       fetch and stage only
  --process                        commit staged articles
  --metadata                       recount feed and tag counters
  --reconcile                      full recount of every feed and tag
  --query [key=value|flag ...]     print one page of articles as JSON
  --stats                          print corpus statistics
  --empty-feeds                    list feeds without any article
  --add-feed <title> <url> [tags]  register a feed (tags comma separated)
  --daemon                         refresh on a schedule until ctrl-c";

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let app = App::new(&config).await?;
    let ingestor = app.ingestor();

    match command.as_str() {
        "--update" => {
            let method = args.get(1).map(|m| m.parse::<SelectionMethod>()).transpose()?;
            let pushed = ingestor.update(&Target::All, method).await?;
            println!("Pushed {} new articles", pushed);
        }
        "--download" => {
            let fetched = ingestor.download(&Target::All).await?;
            println!("Fetched {} entries", fetched);
        }
        "--process" => {
            let pushed = ingestor.process().await?;
            println!("Pushed {} new articles", pushed);
        }
        "--metadata" => {
            let feeds = ingestor.update_feed_metadata(&Target::All).await?;
            let tags = ingestor.update_tag_metadata(&Target::All).await?;
            println!("Updated {} feeds and {} tags", feeds, tags);
        }
        "--reconcile" => {
            ingestor.reconcile().await?;
            println!("Reconciled counters");
        }
        "--query" => {
            let page = app.query(&parse_params(&args[1..])).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        "--stats" => {
            let stats = app.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        "--empty-feeds" => {
            for feed in app.feeds_without_articles().await? {
                println!("{}\t{}\t{}", feed.id, feed.title, feed.url);
            }
        }
        "--add-feed" => {
            let (Some(title), Some(url)) = (args.get(1), args.get(2)) else {
                return Err(AppError::Config(USAGE.to_string()));
            };
            let tags: Vec<String> = args
                .get(3)
                .map(|t| {
                    t.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let id = app.add_feed(title, url, &tags).await?;
            println!("Added feed {} ({})", title, id);
        }
        "--daemon" => app.run_daemon().await?,
        other => {
            eprintln!("unknown command '{}'\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    Ok(())
}

/// `key=value` pairs become parameters, bare words become presence flags.
fn parse_params(args: &[String]) -> HashMap<String, String> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (arg.to_string(), String::new()),
        })
        .collect()
}
