//! Classification-aware file browser core for dotfile managers.
//!
//! Three flat path lists (managed, ignored, unmanaged) are classified into a
//! [`index::ClassifiedPathIndex`], laid out as an arena [`fs::tree::Tree`],
//! flattened into renderable rows, and searched either by fuzzy-filtering the
//! known paths or by a bounded concurrent walk of the disk.

pub mod app;
pub mod components;
pub mod config;
pub mod error;
pub mod event;
pub mod fs;
pub mod index;
pub mod logging;
pub mod search;
