use std::str::FromStr;

use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Feed;

/// How the feeds refreshed in one cycle are picked from the active ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Every active feed.
    Bulk,
    /// Uniform random sample of the configured batch size.
    Batch,
    /// Activity-weighted sample without replacement.
    #[default]
    Roulette,
}

impl FromStr for SelectionMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bulk" => Ok(SelectionMethod::Bulk),
            "batch" => Ok(SelectionMethod::Batch),
            "roulette" => Ok(SelectionMethod::Roulette),
            other => Err(AppError::Config(format!("unknown selection method '{}'", other))),
        }
    }
}

/// log10 of the article count, floored at 10 articles so that every
/// feed weighs at least 1.
pub fn roulette_weight(feed: &Feed) -> f64 {
    (feed.counters.total.max(10) as f64).log10()
}

pub fn select_feeds<R: Rng + ?Sized>(
    feeds: &[Feed],
    method: SelectionMethod,
    batch_size: usize,
    rng: &mut R,
) -> Result<Vec<Feed>> {
    if feeds.is_empty() {
        return Ok(Vec::new());
    }

    let selected = match method {
        SelectionMethod::Bulk => feeds.to_vec(),
        SelectionMethod::Batch => feeds.choose_multiple(rng, batch_size).cloned().collect(),
        SelectionMethod::Roulette => feeds
            .choose_multiple_weighted(rng, batch_size, roulette_weight)
            .map_err(|e| anyhow::anyhow!("weighted feed selection failed: {}", e))?
            .cloned()
            .collect(),
    };

    tracing::debug!(
        "Selected {} of {} feeds ({:?})",
        selected.len(),
        feeds.len(),
        method
    );
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Counters;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn feed(id: i64, total: i64) -> Feed {
        Feed {
            id,
            title: format!("Feed {}", id),
            url: format!("https://example.org/{}.xml", id),
            description: String::new(),
            tags: Vec::new(),
            active: true,
            counters: Counters {
                total,
                ..Counters::default()
            },
            last_update: None,
        }
    }

    #[test]
    fn weight_has_floor_of_one() {
        assert_eq!(roulette_weight(&feed(1, 0)), 1.0);
        assert_eq!(roulette_weight(&feed(1, 10)), 1.0);
        assert!((roulette_weight(&feed(1, 1000)) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn bulk_takes_everything() {
        let feeds: Vec<_> = (0..7).map(|i| feed(i, 0)).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let selected = select_feeds(&feeds, SelectionMethod::Bulk, 2, &mut rng).unwrap();
        assert_eq!(selected.len(), 7);
    }

    #[test]
    fn batch_is_a_distinct_sample() {
        let feeds: Vec<_> = (0..80).map(|i| feed(i, 0)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let selected = select_feeds(&feeds, SelectionMethod::Batch, 50, &mut rng).unwrap();
        let ids: HashSet<_> = selected.iter().map(|f| f.id).collect();
        assert_eq!(selected.len(), 50);
        assert_eq!(ids.len(), 50);

        let few: Vec<_> = (0..3).map(|i| feed(i, 0)).collect();
        let selected = select_feeds(&few, SelectionMethod::Batch, 50, &mut rng).unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn roulette_never_repeats_a_feed() {
        let feeds: Vec<_> = (0..20).map(|i| feed(i, i * 100)).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let selected = select_feeds(&feeds, SelectionMethod::Roulette, 10, &mut rng).unwrap();
        let ids: HashSet<_> = selected.iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn roulette_favours_busy_feeds_sub_linearly() {
        let feeds = vec![feed(1, 1000), feed(2, 10)];
        let mut rng = StdRng::seed_from_u64(42);
        let trials = 4000;
        let mut busy = 0;
        for _ in 0..trials {
            let selected = select_feeds(&feeds, SelectionMethod::Roulette, 1, &mut rng).unwrap();
            if selected[0].id == 1 {
                busy += 1;
            }
        }
        let quiet = trials - busy;

        // weights are 3 : 1, the raw counts 100 : 1
        assert!(busy > quiet);
        assert!(quiet > 0);
        let ratio = busy as f64 / quiet as f64;
        assert!(ratio > 2.0 && ratio < 4.5, "ratio was {}", ratio);
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("batch".parse::<SelectionMethod>().unwrap(), SelectionMethod::Batch);
        assert!("lottery".parse::<SelectionMethod>().is_err());
    }
}
