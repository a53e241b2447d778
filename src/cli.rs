//! Command-line interface.
//!
//! One subcommand per pipeline entry point. Secrets come from the
//! `credentials` section of the config file or from environment variables
//! of the same name.
//!
//! ```sh
//! news_pipeline search --query "AI chips" --endpoint everything
//! news_pipeline filter --input articles.json
//! news_pipeline entities news1.txt news2.txt
//! news_pipeline render --input serp.json
//! news_pipeline digest -j ./json -m ./markdown --fetch-content
//! ```

use crate::tools::NewsQuery;
use crate::tools::news_search::Endpoint;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to config.yaml; defaults are used when the file does not exist
    #[arg(short, long, env = "NEWS_PIPELINE_CONFIG", default_value = "config.yaml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search news metadata and print the articles as JSON
    Search {
        #[command(flatten)]
        query: QueryArgs,
        /// Write the articles to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Keep only genuine news reports from a JSON list of articles
    Filter {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Translate a JSON list of articles, or a single text
    Translate {
        /// JSON list of articles
        #[arg(short, long, conflicts_with = "text")]
        input: Option<PathBuf>,
        /// Free text to translate
        #[arg(long)]
        text: Option<String>,
        /// Target language code
        #[arg(long, default_value = "zh")]
        target: String,
    },

    /// Structured summary of a news text
    Summarize(TextArgs),

    /// Fetch news URLs and print a short brief for each
    Brief {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Extract subject/action/object/impact events from a news text
    Events(TextArgs),

    /// Build entity knowledge cards for one or more news text files
    Entities {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Render knowledge JSON payloads (object or list) to PNG cards
    Render {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Search, filter and process articles into JSON and Markdown digests
    Digest {
        #[command(flatten)]
        query: QueryArgs,
        /// Output directory for the JSON digest
        #[arg(short, long)]
        json_output_dir: String,
        /// Output directory for the Markdown digest
        #[arg(short, long)]
        markdown_output_dir: String,
        /// Replace API content snippets with the extracted page text
        #[arg(long)]
        fetch_content: bool,
        /// Process at most this many articles after filtering
        #[arg(long)]
        limit: Option<usize>,
        /// Articles processed at once; 1 keeps strict sequential order
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
}

/// News text given inline or read from a file.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct TextArgs {
    #[arg(long)]
    pub text: Option<String>,
    #[arg(short, long)]
    pub file: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointArg {
    Top,
    Everything,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[arg(short, long)]
    pub query: Option<String>,
    #[arg(long, value_enum, default_value = "top")]
    pub endpoint: EndpointArg,
    #[arg(long, default_value = "technology")]
    pub category: String,
    #[arg(long, default_value = "en")]
    pub language: String,
    #[arg(long)]
    pub country: Option<String>,
    /// Earliest publication date (everything endpoint)
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Latest publication date (everything endpoint)
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// relevancy, popularity or publishedAt (everything endpoint)
    #[arg(long)]
    pub sort_by: Option<String>,
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long, default_value_t = 50)]
    pub page_size: u32,
}

impl From<QueryArgs> for NewsQuery {
    fn from(args: QueryArgs) -> Self {
        NewsQuery {
            endpoint: match args.endpoint {
                EndpointArg::Top => Endpoint::TopHeadlines,
                EndpointArg::Everything => Endpoint::Everything,
            },
            query: args.query,
            category: Some(args.category),
            language: Some(args.language),
            country: args.country,
            from: args.from,
            to: args.to,
            sort_by: args.sort_by,
            page: args.page,
            page_size: args.page_size,
        }
    }
}
