//! Git push engine.
//!
//! Pushes local history to a GitHub repository through the Git Data API,
//! recreating commits remotely and moving the branch ref once at the end.

mod error;
mod progress;
mod push;
mod remote_url;
mod resolver;
mod tree_builder;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use error::{PushError, PushFailure};
pub use progress::{NoOpProgress, ProgressSink, StderrProgress};
pub use push::{push, PushContext, UP_TO_DATE};
pub use remote_url::parse_github_url;
pub use resolver::{
    find_commits_to_push, find_common_ancestor, AncestorSearch, CommonAncestor, RemoteBase,
    SyncKind, SyncPlan, DEFAULT_MAX_ANCESTOR_DEPTH,
};
pub use tree_builder::{TreeBuildStats, TreeBuilder};
