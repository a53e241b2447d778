//! # News Pipeline
//!
//! Fetches news metadata, filters out non-news, translates articles into
//! Chinese, then summarizes them, extracts events and builds entity
//! knowledge cards with an OpenAI-compatible LLM. Knowledge payloads can be
//! rendered to styled PNG cards through a headless browser.
//!
//! ## Usage
//!
//! ```sh
//! news_pipeline digest -j ./json -m ./markdown --query "AI"
//! news_pipeline render --input serp.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Collaborators** ([`tools`]): NewsAPI search, content extraction,
//!    SerpAPI entity lookup, WebDriver rendering
//! 2. **Stages** ([`stages`]): translate, filter, summarize, events,
//!    entities, render; each is a prompt, a model call and a parse
//! 3. **Digest** ([`pipeline`]): search → filter → per-article stages
//! 4. **Output** ([`outputs`]): JSON and Markdown digest files

use clap::Parser;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod batch;
mod cli;
mod config;
mod error;
mod models;
mod outputs;
mod pipeline;
mod stages;
#[cfg(test)]
mod testing;
mod tools;
mod utils;

use api::ChatClient;
use batch::{Executor, Sequential};
use cli::{Cli, Command, TextArgs};
use config::{AppConfig, load_config};
use error::{PipelineError, Result};
use models::Article;
use outputs::{json, markdown};
use pipeline::{DigestOptions, DigestPipeline};
use stages::entities::EntityStage;
use stages::events::EventStage;
use stages::filter::FilterStage;
use stages::render::RenderStage;
use stages::summarize::SummaryStage;
use stages::translate::TranslationStage;
use tools::browser::WebDriverSession;
use tools::content::ContentExtractor;
use tools::knowledge::EntitySearch;
use tools::news_search::NewsSearch;
use tools::{NewsQuery, NewsSource};
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = load_config(&args.config)?;
    info!(config_path = %args.config.display(), "Loaded configuration");

    if let Err(e) = run(args.command, &config).await {
        error!(error = %e, "Command failed");
        return Err(e.into());
    }

    let elapsed = start_time.elapsed();
    info!(?elapsed, secs = elapsed.as_secs(), millis = elapsed.subsec_millis(), "Execution complete");
    Ok(())
}

async fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Search { query, output } => {
            let news = NewsSearch::new(&config.news, &config.credentials)?;
            let articles = news.search(&NewsQuery::from(query)).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, serde_json::to_string_pretty(&articles)?).await?;
                    info!(path = %path.display(), count = articles.len(), "Wrote articles");
                }
                None => print_json(&articles)?,
            }
        }

        Command::Filter { input } => {
            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let articles: Vec<Article> = read_json(&input).await?;
            print_json(&FilterStage::new(&model).run(articles).await)?;
        }

        Command::Translate { input, text, target } => {
            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let stage = TranslationStage::with_target(&model, &target);
            match (input, text) {
                (_, Some(text)) => println!("{}", stage.translate_text(&text, &target).await?),
                (Some(input), None) => translate_articles(&stage, &input).await?,
                (None, None) => {
                    return Err(PipelineError::InvalidInput(
                        "either --input or --text is required".to_string(),
                    ));
                }
            }
        }

        Command::Summarize(text) => {
            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let content = ContentExtractor::new(&config.extractor, &config.credentials)?;
            let text = read_text(text).await?;
            print_json(&SummaryStage::new(&model, &content).summarize(&text).await?)?;
        }

        Command::Brief { urls } => {
            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let content = ContentExtractor::new(&config.extractor, &config.credentials)?;
            let briefs = SummaryStage::new(&model, &content)
                .brief_batch(urls, &Sequential)
                .await;
            for brief in briefs {
                println!("===== {} =====\n{}\n", brief.url, brief.summary);
            }
        }

        Command::Events(text) => {
            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let text = read_text(text).await?;
            print_json(&EventStage::new(&model).extract(&text).await?)?;
        }

        Command::Entities { files } => {
            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let search = EntitySearch::new(&config.search, &config.credentials)?;
            let mut texts = Vec::with_capacity(files.len());
            for file in &files {
                texts.push(tokio::fs::read_to_string(file).await?);
            }
            let stage = EntityStage::new(&model, &search);
            if let [text] = texts.as_slice() {
                println!("{}", stage.run(text).await);
            } else {
                print_json(&stage.run_batch(texts).await)?;
            }
        }

        Command::Render { input } => {
            let payloads = match read_json::<Value>(&input).await? {
                Value::Array(items) => items,
                single => vec![single],
            };
            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let engine = WebDriverSession::start(&config.render).await?;
            let results = RenderStage::new(&model, engine, &config.render).run(payloads).await?;
            for (i, result) in results.iter().enumerate() {
                match result {
                    Ok(path) => println!("{}", path.display()),
                    Err(e) => eprintln!("[{}] {e}", i + 1),
                }
            }
        }

        Command::Digest {
            query,
            json_output_dir,
            markdown_output_dir,
            fetch_content,
            limit,
            concurrency,
        } => {
            // Fail before any remote call if outputs cannot be written.
            for dir in [&json_output_dir, &markdown_output_dir] {
                if let Err(e) = ensure_writable_dir(dir).await {
                    error!(path = %dir, error = %e, "Output directory is not writable");
                    return Err(e);
                }
            }

            let model = ChatClient::new(&config.llm, &config.credentials)?;
            let news = NewsSearch::new(&config.news, &config.credentials)?;
            let content = ContentExtractor::new(&config.extractor, &config.credentials)?;
            let search = EntitySearch::new(&config.search, &config.credentials)?;
            let pipeline = DigestPipeline::new(&model, news, content, search)
                .with_executor(Executor::with_concurrency(concurrency));

            let options = DigestOptions {
                query: NewsQuery::from(query),
                fetch_content,
                limit,
            };
            let report = pipeline.run(&options).await?;
            info!(
                time_of_day = %report.time_of_day,
                local_date = %report.local_date,
                entries = report.entries.len(),
                "Digest built"
            );

            json::write_report(&report, &json_output_dir).await?;
            markdown::write_markdown(&report, &markdown_output_dir).await?;
        }
    }
    Ok(())
}

#[instrument(level = "info", skip_all, fields(input = %input.display()))]
async fn translate_articles(stage: &TranslationStage<&ChatClient>, input: &Path) -> Result<()> {
    let articles: Vec<Article> = read_json(input).await?;
    let total = articles.len();
    let mut out = Vec::with_capacity(total);
    for (i, article) in articles.iter().enumerate() {
        info!(index = i + 1, total, url = %article.url, "Translating article");
        match stage.translate_article(article).await {
            Ok(translated) => out.push(serde_json::to_value(translated)?),
            Err(e) => {
                error!(url = %article.url, error = %e, "Translation failed");
                out.push(serde_json::json!({ "url": article.url, "error": e.to_string() }));
            }
        }
    }
    print_json(&out)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&raw)?)
}

async fn read_text(args: TextArgs) -> Result<String> {
    match (args.text, args.file) {
        (Some(text), _) => Ok(text),
        (None, Some(file)) => Ok(tokio::fs::read_to_string(file).await?),
        (None, None) => Err(PipelineError::InvalidInput("either --text or --file is required".to_string())),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
