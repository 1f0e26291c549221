use anyhow::Result;

use crate::session::SessionStore;

/// First and last four characters of a token.
fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}

pub async fn run_status(store: &SessionStore) -> Result<()> {
    match store.token() {
        Some((token, source)) => {
            println!("✅ GitHub token available");
            println!("   Token: {}", mask(&token));
            println!("   Source: {}", source);
        }
        None => {
            println!("❌ No GitHub token");
            println!("   Run 'sidekick login' or set GITHUB_TOKEN.");
        }
    }

    Ok(())
}
