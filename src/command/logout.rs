use anyhow::Result;

use crate::session::SessionStore;

pub async fn run_logout(store: &SessionStore) -> Result<()> {
    if !store.remove()? {
        println!("No stored token.");
        return Ok(());
    }

    println!("✅ Removed the stored GitHub token.");
    Ok(())
}
