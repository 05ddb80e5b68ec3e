use crate::db::{Repository, StageReport};
use crate::error::Result;
use crate::feed::FetchedFeed;
use crate::models::StagedArticle;

/// Assign identities to fetched entries and stage the unknown ones.
pub async fn stage_fetched(repo: &Repository, fetched: Vec<FetchedFeed>) -> Result<StageReport> {
    let mut total = StageReport::default();

    for feed in fetched {
        if feed.entries.is_empty() {
            continue;
        }
        let staged: Vec<StagedArticle> = feed
            .entries
            .into_iter()
            .map(|entry| StagedArticle::new(feed.target.feed_id, &feed.target.title, entry))
            .collect();

        let report = repo.stage_articles(staged).await?;
        tracing::debug!(
            "{}: staged {}, known {}, duplicates {}, failed {}",
            feed.target.title,
            report.staged,
            report.known,
            report.duplicates,
            report.failed
        );

        total.staged += report.staged;
        total.known += report.known;
        total.duplicates += report.duplicates;
        total.failed += report.failed;
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FetchTarget;
    use crate::models::{article_id, NewArticle, NewFeed, StagedArticle};
    use chrono::Utc;

    fn entry(title: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            link: None,
            content: String::new(),
            text: String::new(),
            author: None,
            language: None,
            subtitle: None,
            date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn skips_known_and_duplicate_entries() {
        let repo = Repository::open_in_memory().await.unwrap();
        let feed_id = repo
            .insert_feed(NewFeed::new("News", "https://example.org/news.xml"))
            .await
            .unwrap();

        let known = StagedArticle::new(feed_id, "News", entry("old")).into_article(vec![], Utc::now());
        repo.insert_article(known).await.unwrap();

        let fetched = vec![FetchedFeed {
            target: FetchTarget {
                feed_id,
                title: "News".to_string(),
                url: "https://example.org/news.xml".to_string(),
            },
            entries: vec![entry("old"), entry("a"), entry("b"), entry("a")],
        }];

        let report = stage_fetched(&repo, fetched).await.unwrap();
        assert_eq!(report.staged, 2);
        assert_eq!(report.known, 1);
        assert_eq!(report.duplicates, 1);

        let staged = repo.get_staged_articles().await.unwrap();
        let ids: Vec<_> = staged.iter().map(|s| s.id.clone()).collect();
        assert!(ids.contains(&article_id(feed_id, "a")));
        assert!(ids.contains(&article_id(feed_id, "b")));
    }
}
