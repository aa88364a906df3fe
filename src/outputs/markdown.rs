//! The human-readable summary report.
//!
//! Sections: totals, averages, engagement, the top-N rankings and, when
//! anything was dropped, the skipped items grouped by kind.

use crate::models::{RankedArticle, RunOutput};
use chrono::{DateTime, Local};
use std::error::Error;
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// `1234567` -> `1,234,567`.
fn grouped(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn ranking(md: &mut String, heading: &str, entries: &[RankedArticle], unit: &str) -> fmt::Result {
    writeln!(md, "\n## {heading}\n")?;
    if entries.is_empty() {
        writeln!(md, "データ不足のため表示できません")?;
    }
    for entry in entries {
        writeln!(
            md,
            "{}. [{}]({}) - {}{}",
            entry.rank,
            entry.title,
            entry.url,
            grouped(entry.value),
            unit
        )?;
    }
    Ok(())
}

pub fn render(output: &RunOutput, generated_at: DateTime<Local>) -> Result<String, fmt::Error> {
    let report = &output.report;
    let mut md = String::new();

    writeln!(md, "# note Dashboard Data Report\n")?;
    writeln!(md, "生成日時: {}\n", generated_at.format("%Y-%m-%d %H:%M:%S"))?;
    if output.cancelled {
        writeln!(
            md,
            "> 実行は途中で停止されました。以下は取得済みのデータのみの集計です。\n"
        )?;
    }
    if report.empty {
        writeln!(md, "> 記事データがありません。\n")?;
    }

    writeln!(md, "## 基本情報\n")?;
    writeln!(md, "- 記事総数: {}件", report.total_articles)?;
    writeln!(md, "- 読み込んだページ数: {}", output.pages_loaded)?;
    writeln!(md, "- 総閲覧数: {}回", grouped(report.total_views))?;
    writeln!(md, "- 総いいね数: {}件", grouped(report.total_likes))?;
    writeln!(md, "- 総コメント数: {}件", grouped(report.total_comments))?;
    writeln!(md, "- 総文字数: {}文字", grouped(report.total_chars))?;
    writeln!(md, "- 本文を取得した記事: {}件\n", report.enriched_count)?;

    writeln!(md, "## 平均値\n")?;
    writeln!(md, "- 平均閲覧数: {:.1}回/記事", report.average_views)?;
    writeln!(md, "- 平均いいね数: {:.1}件/記事", report.average_likes)?;
    writeln!(md, "- 平均コメント数: {:.1}件/記事", report.average_comments)?;
    writeln!(md, "- 平均文字数: {:.1}文字/記事\n", report.average_chars)?;

    writeln!(md, "## エンゲージメント\n")?;
    writeln!(md, "- いいね率: {:.2}%（総いいね数÷総閲覧数）", report.like_ratio)?;

    let n = report.top_by_views.len().max(report.top_by_likes.len());
    let heading = format!("人気記事（閲覧数トップ{n}）");
    ranking(&mut md, &heading, &report.top_by_views, "回")?;
    ranking(&mut md, &format!("いいね数トップ{n}"), &report.top_by_likes, "いいね")?;
    ranking(&mut md, &format!("コメント数トップ{n}"), &report.top_by_comments, "件")?;

    if !output.skipped.is_empty() {
        writeln!(md, "\n## スキップされた項目（{}件）\n", output.skipped.len())?;
        for (kind, count) in output.skipped.by_kind() {
            writeln!(md, "- {kind}: {count}件")?;
        }
        writeln!(md)?;
        for item in output.skipped.items() {
            let location = match (&item.url, item.page) {
                (Some(url), _) => url.clone(),
                (None, Some(page)) => format!("page {page}"),
                (None, None) => "-".to_string(),
            };
            writeln!(md, "  - [{}] {}: {}", item.kind, location, item.reason)?;
        }
    }

    Ok(md)
}

#[instrument(level = "info", skip_all, fields(dir = %dir.display()))]
pub async fn write_report(
    output: &RunOutput,
    dir: &Path,
    stamp: &str,
    generated_at: DateTime<Local>,
) -> Result<PathBuf, Box<dyn Error>> {
    let path = dir.join(format!("note_report_{stamp}.md"));
    fs::write(&path, render(output, generated_at)?).await?;
    info!(path = %path.display(), "Wrote summary report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::summarize;
    use crate::errors::ParseError;
    use crate::models::{ArticleRecord, SkipLedger, SkippedItem};
    use chrono::TimeZone;

    fn output(records: Vec<ArticleRecord>, skipped: SkipLedger) -> RunOutput {
        RunOutput {
            report: summarize(&records, 5),
            records,
            skipped,
            pages_loaded: 1,
            cancelled: false,
        }
    }

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 5, 6, 20, 30, 0).unwrap()
    }

    #[test]
    fn test_grouped() {
        assert_eq!(grouped(0), "0");
        assert_eq!(grouped(999), "999");
        assert_eq!(grouped(1000), "1,000");
        assert_eq!(grouped(1234567), "1,234,567");
    }

    #[test]
    fn test_render_report() {
        let mut a = ArticleRecord::new("https://note.com/w/n/na", "First").unwrap();
        a.views = 1500;
        a.likes = 15;
        let mut b = ArticleRecord::new("https://note.com/w/n/nb", "Second").unwrap();
        b.views = 500;
        b.likes = 5;
        let md = render(&output(vec![a, b], SkipLedger::default()), at()).unwrap();

        assert!(md.starts_with("# note Dashboard Data Report"));
        assert!(md.contains("生成日時: 2025-05-06 20:30:00"));
        assert!(md.contains("- 総閲覧数: 2,000回"));
        assert!(md.contains("- 平均閲覧数: 1000.0回/記事"));
        assert!(md.contains("- いいね率: 1.00%"));
        assert!(md.contains("1. [First](https://note.com/w/n/na) - 1,500回"));
        assert!(!md.contains("スキップ"));
    }

    #[test]
    fn test_render_lists_skips_by_kind() {
        let mut skipped = SkipLedger::default();
        skipped.push(SkippedItem::row(2, 0, &ParseError::MissingUrl.into()));
        let md = render(&output(Vec::new(), skipped), at()).unwrap();
        assert!(md.contains("記事データがありません"));
        assert!(md.contains("## スキップされた項目（1件）"));
        assert!(md.contains("- parse: 1件"));
        assert!(md.contains("[parse] page 2: row 1: title link has no href"));
    }
}
