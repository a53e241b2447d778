//! Pipeline stages built on the model client and collaborators.
//!
//! | Stage | Module | Failure policy |
//! |-------|--------|----------------|
//! | Translation | [`translate`] | propagate `Err` to the caller |
//! | Filter | [`filter`] | fail-open: original list |
//! | Summarization | [`summarize`] | degrade: raw reply as summary |
//! | Event extraction | [`events`] | fail-soft: empty list |
//! | Entity knowledge | [`entities`] | sentinel / per-entity error card |
//! | Rendering | [`render`] | per-payload error entry |

pub mod entities;
pub mod events;
pub mod filter;
pub mod render;
pub mod summarize;
pub mod translate;
