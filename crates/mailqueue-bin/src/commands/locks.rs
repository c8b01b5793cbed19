//! `mailqueue clear-locks`: the recovery sweep.

use super::AppContext;
use tracing::warn;

pub async fn clear(ctx: &AppContext) -> anyhow::Result<()> {
    let store = ctx.open_store().await?;
    let cleared = store.clear_all_locks().await?;
    if cleared > 0 {
        warn!(count = cleared, "Released locks left by a previous worker");
    }
    println!("Cleared {} lock(s)", cleared);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_context;
    use mailqueue_database::{EmailRecipients, EnqueueOptions, JsonMap};
    use tempfile::tempdir;

    #[tokio::test]
    async fn clear_unlocks_claimed_items() {
        let dir = tempdir().unwrap();
        let ctx = test_context(dir.path());
        let store = ctx.open_store().await.unwrap();
        store
            .enqueue(EmailRecipients::to("a@example.com"), JsonMap::new(), EnqueueOptions::default())
            .await
            .unwrap();
        assert_eq!(store.claim_batch(5).await.unwrap().len(), 1);

        clear(&ctx).await.unwrap();

        assert_eq!(store.stats().await.unwrap().locked, 0);
    }
}
