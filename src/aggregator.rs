//! Summary statistics over a finished record set.
//!
//! [`summarize`] is a pure function of its input: running it twice over the
//! same records gives the same report. Averages over an empty set are zero
//! rather than NaN, and rankings break ties by list order.

use crate::models::{AggregateReport, ArticleRecord, RankedArticle};

pub fn summarize(records: &[ArticleRecord], top_n: usize) -> AggregateReport {
    let total_articles = records.len();
    let total_views: u64 = records.iter().map(|r| r.views).sum();
    let total_likes: u64 = records.iter().map(|r| r.likes).sum();
    let total_comments: u64 = records.iter().map(|r| r.comments).sum();

    let enriched: Vec<&ArticleRecord> = records.iter().filter(|r| r.is_enriched()).collect();
    let total_chars: u64 = enriched.iter().filter_map(|r| r.char_count).sum();

    let (viewed_likes, viewed_views) = records
        .iter()
        .filter(|r| r.views > 0)
        .fold((0u64, 0u64), |(likes, views), r| (likes + r.likes, views + r.views));
    let like_ratio = if viewed_views == 0 {
        0.0
    } else {
        round2(viewed_likes as f64 / viewed_views as f64 * 100.0)
    };

    AggregateReport {
        empty: records.is_empty(),
        total_articles,
        total_views,
        total_likes,
        total_comments,
        total_chars,
        average_views: mean(total_views, total_articles),
        average_likes: mean(total_likes, total_articles),
        average_comments: mean(total_comments, total_articles),
        average_chars: mean(total_chars, enriched.len()),
        like_ratio,
        enriched_count: enriched.len(),
        error_count: records.iter().filter(|r| r.error.is_some()).count(),
        top_by_views: top_by(records, top_n, |r| r.views),
        top_by_likes: top_by(records, top_n, |r| r.likes),
        top_by_comments: top_by(records, top_n, |r| r.comments),
    }
}

fn mean(total: u64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        round2(total as f64 / count as f64)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Top `n` records by `metric`, highest first. The sort is stable, so equal
/// values keep their list order.
fn top_by(
    records: &[ArticleRecord],
    n: usize,
    metric: impl Fn(&ArticleRecord) -> u64,
) -> Vec<RankedArticle> {
    let mut ranked: Vec<&ArticleRecord> = records.iter().collect();
    ranked.sort_by(|a, b| metric(b).cmp(&metric(a)));
    ranked
        .into_iter()
        .take(n)
        .enumerate()
        .map(|(i, r)| RankedArticle {
            rank: i + 1,
            id: r.id.clone(),
            title: r.title.clone(),
            url: r.url.clone(),
            value: metric(r),
        })
        .collect()
}
