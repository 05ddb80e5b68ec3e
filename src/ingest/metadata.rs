use std::collections::{BTreeMap, HashMap};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{unique_tags, Counters, Target};

/// Changes made while bringing the tag table in line with feed tag sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TagSync {
    pub created: usize,
    pub removed: usize,
}

/// Recount the counters of the targeted feeds. Returns how many feeds were
/// recounted; an unknown feed target is `NotFound`.
pub async fn update_feed_metadata(repo: &Repository, target: &Target) -> Result<usize> {
    let feeds = match target {
        Target::All => repo.get_all_feeds().await?,
        other => match repo.find_feed(other).await? {
            Some(feed) => vec![feed],
            None => return Err(AppError::NotFound(format!("feed {:?}", other))),
        },
    };

    for feed in &feeds {
        let counters = repo.recompute_feed_counters(feed.id).await?;
        tracing::debug!("{}: {:?}", feed.title, counters);
    }

    sync_tags(repo).await?;
    Ok(feeds.len())
}

/// Refresh the feed references and counters of the targeted tags.
///
/// A tag no feed references any more is deleted. A title that some feed
/// references but that has no tag row yet is created. A target matching
/// neither a tag nor a feed reference is `NotFound`.
pub async fn update_tag_metadata(repo: &Repository, target: &Target) -> Result<usize> {
    let titles: Vec<String> = match target {
        Target::All => {
            let titles = repo.get_all_tags().await?.into_iter().map(|t| t.title).collect();
            sync_tags(repo).await?;
            titles
        }
        Target::Title(title) => {
            let known = repo.find_tag(target).await?.is_some();
            if !known && repo.feeds_referencing_tag(title).await?.is_empty() {
                return Err(AppError::NotFound(format!("tag {:?}", target)));
            }
            vec![title.clone()]
        }
        Target::Id(_) => match repo.find_tag(target).await? {
            Some(tag) => vec![tag.title],
            None => return Err(AppError::NotFound(format!("tag {:?}", target))),
        },
    };

    let mut updated = 0;
    for title in titles {
        let feeds = repo.feeds_referencing_tag(&title).await?;
        if feeds.is_empty() {
            if let Some(tag) = repo.find_tag(&Target::Title(title.clone())).await? {
                tracing::info!("Removing unreferenced tag {}", title);
                repo.delete_tag(tag.id).await?;
            }
            continue;
        }
        repo.insert_tag(&title, &feeds).await?;
        repo.recompute_tag_counters(&title).await?;
        updated += 1;
    }

    Ok(updated)
}

/// Fold per-feed counter deltas into feed counters, then into the counters
/// of every tag the feed carries.
pub async fn apply_incremental(repo: &Repository, deltas: &HashMap<i64, Counters>) -> Result<()> {
    let mut tag_deltas: HashMap<String, Counters> = HashMap::new();

    for (&feed_id, &delta) in deltas {
        if delta.is_zero() {
            continue;
        }
        repo.add_feed_counters(feed_id, delta).await?;

        let Some(feed) = repo.get_feed(feed_id).await? else {
            continue;
        };
        for tag in unique_tags(feed.tags) {
            *tag_deltas.entry(tag).or_default() += delta;
        }
    }

    for (title, delta) in tag_deltas {
        repo.add_tag_counters(&title, delta).await?;
    }

    Ok(())
}

/// Delete tags without referencing feeds, refresh the references of the
/// rest, and create (with full counters) tags that feeds name but that do
/// not exist yet.
pub async fn sync_tags(repo: &Repository) -> Result<TagSync> {
    let mut referenced: BTreeMap<String, Vec<i64>> = BTreeMap::new();
    for feed in repo.get_all_feeds().await? {
        for tag in feed.tags {
            let ids = referenced.entry(tag).or_default();
            if !ids.contains(&feed.id) {
                ids.push(feed.id);
            }
        }
    }

    let mut sync = TagSync::default();

    for tag in repo.get_all_tags().await? {
        match referenced.remove(&tag.title) {
            None => {
                tracing::info!("Removing unreferenced tag {}", tag.title);
                repo.delete_tag(tag.id).await?;
                sync.removed += 1;
            }
            Some(feeds) if feeds != tag.feeds => repo.set_tag_feeds(tag.id, &feeds).await?,
            Some(_) => {}
        }
    }

    // whatever is left is referenced but has no row yet
    for (title, feeds) in referenced {
        tracing::info!("Creating tag {}", title);
        repo.insert_tag(&title, &feeds).await?;
        repo.recompute_tag_counters(&title).await?;
        sync.created += 1;
    }

    Ok(sync)
}

/// Full recompute of every feed and tag.
pub async fn reconcile(repo: &Repository) -> Result<()> {
    let feeds = update_feed_metadata(repo, &Target::All).await?;
    let tags = update_tag_metadata(repo, &Target::All).await?;
    tracing::info!("Reconciled counters of {} feeds and {} tags", feeds, tags);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Flag, NewArticle, NewFeed, StagedArticle};
    use chrono::Utc;

    async fn add_article(repo: &Repository, feed_id: i64, tags: &[&str], title: &str) -> String {
        let entry = NewArticle {
            title: title.to_string(),
            link: None,
            content: String::new(),
            text: String::new(),
            author: None,
            language: None,
            subtitle: None,
            date: Utc::now(),
        };
        let article = StagedArticle::new(feed_id, "feed", entry)
            .into_article(tags.iter().map(|t| t.to_string()).collect(), Utc::now());
        let id = article.id.clone();
        repo.insert_article(article).await.unwrap();
        id
    }

    #[tokio::test]
    async fn sync_creates_backfills_and_removes_tags() {
        let repo = Repository::open_in_memory().await.unwrap();
        let a = repo
            .insert_feed(NewFeed::new("A", "https://a.example/rss").with_tags(["tech", "news"]))
            .await
            .unwrap();
        repo.insert_tag("stale", &[99]).await.unwrap();
        add_article(&repo, a, &["tech", "news"], "one").await;
        add_article(&repo, a, &["tech", "news"], "two").await;

        let sync = sync_tags(&repo).await.unwrap();
        assert_eq!(sync, TagSync { created: 2, removed: 1 });

        let tech = repo
            .find_tag(&Target::Title("tech".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tech.feeds, vec![a]);
        assert_eq!(tech.counters.total, 2);
        assert!(repo
            .find_tag(&Target::Title("stale".to_string()))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn incremental_matches_full_recompute() {
        let repo = Repository::open_in_memory().await.unwrap();
        let a = repo
            .insert_feed(NewFeed::new("A", "https://a.example/rss").with_tags(["tech"]))
            .await
            .unwrap();
        let b = repo
            .insert_feed(NewFeed::new("B", "https://b.example/rss").with_tags(["tech", "art"]))
            .await
            .unwrap();
        sync_tags(&repo).await.unwrap();

        let mut deltas: HashMap<i64, Counters> = HashMap::new();
        for (feed, tags, title) in [
            (a, vec!["tech"], "a1"),
            (a, vec!["tech"], "a2"),
            (b, vec!["tech", "art"], "b1"),
        ] {
            add_article(&repo, feed, &tags, title).await;
            *deltas.entry(feed).or_default() += Counters::of(&Default::default());
        }
        apply_incremental(&repo, &deltas).await.unwrap();

        let incremental_feeds = repo.get_all_feeds().await.unwrap();
        let incremental_tags = repo.get_all_tags().await.unwrap();

        reconcile(&repo).await.unwrap();

        for feed in repo.get_all_feeds().await.unwrap() {
            let before = incremental_feeds.iter().find(|f| f.id == feed.id).unwrap();
            assert_eq!(before.counters, feed.counters);
        }
        for tag in repo.get_all_tags().await.unwrap() {
            let before = incremental_tags.iter().find(|t| t.id == tag.id).unwrap();
            assert_eq!(before.counters, tag.counters, "tag {}", tag.title);
        }
        let tech = repo
            .find_tag(&Target::Title("tech".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tech.counters.total, 3);
    }

    #[tokio::test]
    async fn targeted_updates_follow_flag_changes() {
        let repo = Repository::open_in_memory().await.unwrap();
        let a = repo
            .insert_feed(NewFeed::new("A", "https://a.example/rss").with_tags(["tech"]))
            .await
            .unwrap();
        let id = add_article(&repo, a, &["tech"], "one").await;
        add_article(&repo, a, &["tech"], "two").await;

        // bypass the counter-adjusting toggle so only a recount can notice
        repo.conn
            .call(move |conn| {
                conn.execute("UPDATE articles SET read = 1 WHERE id = ?1", [id])?;
                Ok(())
            })
            .await
            .unwrap();

        let n = update_feed_metadata(&repo, &Target::Title("A".to_string()))
            .await
            .unwrap();
        assert_eq!(n, 1);
        let feed = repo.get_feed(a).await.unwrap().unwrap();
        assert_eq!(feed.counters.total, 2);
        assert_eq!(feed.counters.unread, 1);

        let n = update_tag_metadata(&repo, &Target::Title("tech".to_string()))
            .await
            .unwrap();
        assert_eq!(n, 1);
        let tech = repo
            .find_tag(&Target::Title("tech".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tech.counters.unread, 1);

        let changed = repo
            .set_article_flag(&crate::models::article_id(a, "two"), Flag::Read, true)
            .await
            .unwrap();
        assert_eq!(changed, Some(true));
        let tech = repo.find_tag(&Target::Id(tech.id)).await.unwrap().unwrap();
        assert_eq!(tech.counters.unread, 0);
    }

    #[tokio::test]
    async fn unreferenced_title_target_deletes_the_tag() {
        let repo = Repository::open_in_memory().await.unwrap();
        repo.insert_tag("orphan", &[1]).await.unwrap();
        let n = update_tag_metadata(&repo, &Target::Title("orphan".to_string()))
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(repo.get_all_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_feed_tags_count_once() {
        let repo = Repository::open_in_memory().await.unwrap();
        let feed = NewFeed {
            tags: vec!["tech".to_string(), "tech".to_string()],
            ..NewFeed::new("A", "https://a.example/rss")
        };
        let a = repo.insert_feed(feed).await.unwrap();
        sync_tags(&repo).await.unwrap();
        assert_eq!(repo.get_feed(a).await.unwrap().unwrap().tags, vec!["tech"]);

        add_article(&repo, a, &["tech"], "only").await;
        let mut deltas = HashMap::new();
        deltas.insert(a, Counters::of(&Default::default()));
        apply_incremental(&repo, &deltas).await.unwrap();

        let tag = Target::Title("tech".to_string());
        let incremental = repo.find_tag(&tag).await.unwrap().unwrap().counters;
        let recount = repo.recompute_tag_counters("tech").await.unwrap();
        assert_eq!(incremental, recount);
        assert_eq!(recount.total, 1);
    }

    #[tokio::test]
    async fn unknown_targets_are_not_found() {
        let repo = Repository::open_in_memory().await.unwrap();
        let missing_feed = update_feed_metadata(&repo, &Target::Id(42)).await;
        assert!(matches!(missing_feed, Err(AppError::NotFound(_))));
        let missing_feed = update_feed_metadata(&repo, &Target::Title("nope".to_string())).await;
        assert!(matches!(missing_feed, Err(AppError::NotFound(_))));
        let missing_tag = update_tag_metadata(&repo, &Target::Id(7)).await;
        assert!(matches!(missing_tag, Err(AppError::NotFound(_))));
        let missing_tag = update_tag_metadata(&repo, &Target::Title("nope".to_string())).await;
        assert!(matches!(missing_tag, Err(AppError::NotFound(_))));
    }
}
