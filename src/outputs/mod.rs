//! Digest output generation for Markdown, JSON, and the catalog index.
//!
//! # Submodules
//!
//! - [`markdown`]: renders a [`Digest`](crate::digest::Digest) as a readable page
//! - [`json`]: writes the same digest as JSON for API consumers
//! - [`indexes`]: maintains `index.json` and its Markdown rendering `index.md`
//!
//! # Output Structure
//!
//! ```text
//! docs/digests/
//! ├── 2025-05-06-daily-brief.md
//! ├── 2025-05-06-daily-brief.json
//! ├── 2025-05-05-daily-brief.md
//! ├── 2025-05-05-daily-brief.json
//! ├── index.json             # catalog, newest first
//! └── index.md               # human-readable catalog
//! ```
//!
//! Every file is replaced atomically, so a reader never sees a partial write.

pub mod indexes;
pub mod json;
pub mod markdown;
