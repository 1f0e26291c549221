use anyhow::{bail, Result};
use std::io::{self, Write};

use crate::session::{SessionStore, TokenSource};

/// Token creation page with the `repo` scope preselected.
pub const TOKEN_PAGE_URL: &str =
    "https://github.com/settings/tokens/new?scopes=repo&description=sidekick";

fn prompt(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

pub async fn run_login(
    store: &SessionStore,
    token: Option<String>,
    no_browser: bool,
) -> Result<()> {
    if let Some((_, TokenSource::File(path))) = store.token() {
        println!("⚠️  A GitHub token is already stored in {}.", path.display());

        let answer = prompt("Replace it? [y/N]: ")?.to_lowercase();
        if answer != "y" && answer != "yes" {
            println!("Login cancelled. Your existing token remains active.");
            return Ok(());
        }
    }

    let token = match token {
        Some(token) => token,
        None => {
            println!("🔐 A GitHub token with the `repo` scope is needed to push.\n");

            if !no_browser {
                let answer = prompt("Open the token page in your browser? [Y/n]: ")?.to_lowercase();
                if answer.is_empty() || answer == "y" || answer == "yes" {
                    println!("🌐 Opening the token page in your browser...");
                    if open::that(TOKEN_PAGE_URL).is_err() {
                        println!("⚠️  Could not open browser automatically.");
                    }
                }
            }

            println!("Create a token at:");
            println!("\n{}\n", TOKEN_PAGE_URL);
            prompt("Paste the token here: ")?
        }
    };

    if token.trim().is_empty() {
        bail!("No token given");
    }

    store.save(&token)?;
    println!("\n✅ Token saved to {}", store.session_path().display());

    if let Some((_, TokenSource::Env(var))) = store.token() {
        println!("⚠️  {} is set and takes precedence over the saved token.", var);
    }

    Ok(())
}
