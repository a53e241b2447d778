//! Digest output files.
//!
//! - [`json`]: the full [`DigestReport`](crate::models::DigestReport) for
//!   programmatic use
//! - [`markdown`]: a readable edition with summaries, events and cards
//!
//! ```text
//! json_output_dir/
//! └── 2026-05-06/
//!     └── morning.json
//!
//! markdown_output_dir/
//! └── 2026-05-06_morning.md
//! ```

pub mod json;
pub mod markdown;
