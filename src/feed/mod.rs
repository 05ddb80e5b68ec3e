mod fetcher;
mod parser;
mod selector;

pub use fetcher::{FeedFetcher, FetchTarget, FetchedFeed};
pub use parser::parse_entries;
pub use selector::{roulette_weight, select_feeds, SelectionMethod};
