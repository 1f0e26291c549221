//! Sidekick - GitHub push engine and AI patch application
//!
//! Pushes local commits to GitHub through the Git Data API (no git
//! transport), and applies search/replace edits proposed by a model to a
//! working tree.

pub mod api;
pub mod cli;
pub mod command;
pub mod config;
pub mod domain;
pub mod patch;
pub mod session;
pub mod sync;
pub mod vcs;
