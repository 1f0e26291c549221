mod args;
mod paths;

pub use args::{Cli, Commands};
pub use paths::{find_git_root, resolve_repo_root};
