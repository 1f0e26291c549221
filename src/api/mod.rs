//! GitHub REST API client.
//!
//! This module provides HTTP client functionality for the GitHub Git Data
//! API (refs, commits, trees, blobs), used by the push engine through the
//! `RemoteHost` seam.

mod authenticated;
mod client;
mod git_data;
mod http;
mod types;

pub use authenticated::{AuthenticatedClient, GitHubConnector};
pub use client::{ApiClient, DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
pub use types::GitHubApiError;
