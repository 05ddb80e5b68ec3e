mod article;
mod feed;
mod query;

pub use article::{article_id, Article, Flag, Flags, NewArticle, StagedArticle};
pub use feed::{unique_tags, Counters, Feed, NewFeed, Tag, Target};
pub use query::{CorpusStats, DefaultView, FilterSpec, QueryPage, ReadSelector, Scope, SortKey};
