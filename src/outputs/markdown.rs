//! Markdown rendering of a digest, one file per edition:
//! `{markdown_output_dir}/{date}_{time_of_day}.md`.

use crate::error::Result;
use crate::models::{DigestEntry, DigestReport, EntryOutcome};
use crate::utils::upcase;
use std::fmt::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Render a digest as one Markdown document.
///
/// Processed articles come first, each with summary, key points, sections,
/// an event table and the entity card text. Failed articles are listed at
/// the end.
pub fn report_to_markdown(report: &DigestReport) -> String {
    let mut md = String::new();
    // fmt::Write on a String is infallible.
    let _ = write_report(&mut md, report);
    md
}

fn write_report(md: &mut String, report: &DigestReport) -> fmt::Result {
    writeln!(
        md,
        "# 新闻摘要 {} {}\n",
        report.local_date,
        upcase(&report.time_of_day)
    )?;
    writeln!(
        md,
        "_生成时间 {}；查询：{}；检索 {} 条，筛选后 {} 条，处理失败 {} 条_\n",
        report.local_time,
        report.query.as_deref().unwrap_or("（无）"),
        report.searched,
        report.kept_after_filter,
        report.failed_count()
    )?;

    for entry in report.processed() {
        write_entry(md, entry)?;
    }

    let failures: Vec<_> = report
        .entries
        .iter()
        .filter_map(|e| match e {
            EntryOutcome::Failed { url, title, error } => Some((url, title, error)),
            EntryOutcome::Processed(_) => None,
        })
        .collect();
    if !failures.is_empty() {
        writeln!(md, "## 处理失败\n")?;
        for (url, title, error) in failures {
            writeln!(md, "- [{}]({}): {}", title.as_deref().unwrap_or(url), url, error)?;
        }
        writeln!(md)?;
    }
    Ok(())
}

fn write_entry(md: &mut String, entry: &DigestEntry) -> fmt::Result {
    let article = &entry.article;
    let heading: &str = if article.title_zh.is_empty() {
        article.article.title.as_deref().unwrap_or(&article.article.url)
    } else {
        article.title_zh.as_str()
    };
    writeln!(md, "## {heading}\n")?;

    let mut meta = Vec::new();
    if let Some(source) = &article.article.source {
        meta.push(source.clone());
    }
    if let Some(published) = &article.article.published_at {
        meta.push(published.clone());
    }
    meta.push(format!("原文语言：{}", article.original_language));
    meta.push(format!("[原文]({})", article.article.url));
    writeln!(md, "<small>{}</small>\n", meta.join(" · "))?;

    writeln!(md, "### 摘要\n\n{}\n", entry.summary.summary)?;

    if !entry.summary.key_points.is_empty() {
        writeln!(md, "### 关键要点\n")?;
        for point in &entry.summary.key_points {
            writeln!(md, "- {point}")?;
        }
        writeln!(md)?;
    }

    for section in &entry.summary.sections {
        writeln!(md, "#### {}\n\n{}\n", section.heading, section.content)?;
    }

    if !entry.events.is_empty() {
        writeln!(md, "### 事件\n")?;
        writeln!(md, "| 主体 | 动作 | 客体 | 影响 | 相关实体 |")?;
        writeln!(md, "|------|------|------|------|----------|")?;
        for event in &entry.events {
            writeln!(
                md,
                "| {} | {} | {} | {} | {} |",
                cell(&event.subject),
                cell(&event.action),
                cell(&event.object),
                cell(&event.impact),
                cell(&event.entities.join("、"))
            )?;
        }
        writeln!(md)?;
    }

    writeln!(md, "### 实体知识卡片\n\n```text\n{}\n```\n", entry.knowledge)?;
    Ok(())
}

/// Keep table cells on one line.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

/// Write the Markdown digest to `{markdown_output_dir}/{date}_{time_of_day}.md`.
///
/// # Arguments
///
/// * `report` - The digest to render
/// * `markdown_output_dir` - Directory for Markdown output, created if missing
///
/// # Returns
///
/// The path of the written file.
#[instrument(level = "info", skip_all, fields(markdown_output_dir = %markdown_output_dir.as_ref().display()))]
pub async fn write_markdown(report: &DigestReport, markdown_output_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let dir = markdown_output_dir.as_ref();
    fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{}_{}.md", report.local_date, report.time_of_day));
    fs::write(&path, report_to_markdown(report)).await?;
    info!(path = %path.display(), "Wrote Markdown digest");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, EventRecord, Section, StructuredSummary, TranslatedArticle};

    fn report() -> DigestReport {
        let entry = DigestEntry {
            article: TranslatedArticle {
                article: Article {
                    url: "https://news.example/chip".to_string(),
                    title: Some("Chip launch".to_string()),
                    source: Some("Example Wire".to_string()),
                    ..Default::default()
                },
                title_zh: "芯片发布".to_string(),
                description_zh: String::new(),
                content_zh: String::new(),
                original_language: "en".to_string(),
            },
            summary: StructuredSummary {
                summary: "某公司发布新芯片。".to_string(),
                key_points: vec!["速度提升".to_string()],
                sections: vec![Section {
                    heading: "背景".to_string(),
                    content: "竞争加剧".to_string(),
                }],
            },
            events: vec![EventRecord {
                subject: "某公司".to_string(),
                action: "发布".to_string(),
                object: "A|B 芯片".to_string(),
                impact: "速度\n提升".to_string(),
                entities: vec!["某公司".to_string(), "芯片".to_string()],
            }],
            knowledge: "错误：新闻内容为空或过短".to_string(),
        };
        DigestReport {
            local_date: "2026-05-06".to_string(),
            time_of_day: "evening".to_string(),
            local_time: "20:00:00".to_string(),
            query: None,
            searched: 3,
            kept_after_filter: 2,
            entries: vec![
                EntryOutcome::Processed(Box::new(entry)),
                EntryOutcome::Failed {
                    url: "https://news.example/2".to_string(),
                    title: Some("Second".to_string()),
                    error: "llm error: timeout".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_markdown_sections() {
        let md = report_to_markdown(&report());
        assert!(md.starts_with("# 新闻摘要 2026-05-06 Evening\n"));
        assert!(md.contains("## 芯片发布"));
        assert!(md.contains("Example Wire · 原文语言：en · [原文](https://news.example/chip)"));
        assert!(md.contains("- 速度提升"));
        assert!(md.contains("#### 背景\n\n竞争加剧"));
        assert!(md.contains("| 某公司 | 发布 | A\\|B 芯片 | 速度 提升 | 某公司、芯片 |"));
        assert!(md.contains("## 处理失败\n\n- [Second](https://news.example/2): llm error: timeout"));
    }

    #[tokio::test]
    async fn test_write_markdown_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_markdown(&report(), dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("2026-05-06_evening.md"));
        assert!(std::fs::read_to_string(path).unwrap().contains("实体知识卡片"));
    }
}
