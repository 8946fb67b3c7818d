//! Commits a [`ChangeSet`] to a [`MenuStore`].
//!
//! A change set that fits the store's atomic limit goes out as one commit.
//! Larger sets are split into chunks; if a chunk fails after earlier chunks
//! landed, the failure is reported as [`StoreError::PartialCommit`] carrying
//! what was already written, never as a success.

use crate::{
   Result,
   error::{Error, StoreError},
   reconcile::ChangeSet,
   store::{MenuStore, WriteBatch, WriteOp},
   types::ApplyCounts,
};

/// Commits `changes` and returns the size of each operation set.
///
/// `max_ops` further caps the store's own atomic limit.
pub async fn apply_batch<M>(store: &M, changes: &ChangeSet, max_ops: usize) -> Result<ApplyCounts>
where
   M: MenuStore + ?Sized,
{
   let counts = changes.counts();
   if changes.is_empty() {
      return Ok(counts);
   }

   let ops: Vec<WriteOp> = changes
      .to_create
      .iter()
      .cloned()
      .map(WriteOp::Insert)
      .chain(changes.to_update.iter().cloned().map(WriteOp::Update))
      .chain(changes.to_delete.iter().map(|item| WriteOp::Delete { id: item.id.clone() }))
      .collect();

   let limit = max_ops.min(store.max_batch_ops()).max(1);
   if ops.len() <= limit {
      store.commit(WriteBatch { ops }).await?;
      return Ok(counts);
   }

   tracing::debug!(ops = ops.len(), limit, "change set exceeds atomic limit, committing in chunks");

   let mut committed = ApplyCounts::default();
   for chunk in ops.chunks(limit) {
      if let Err(err) = store.commit(WriteBatch { ops: chunk.to_vec() }).await {
         if committed.total() == 0 {
            return Err(err);
         }
         return Err(Error::Store(StoreError::PartialCommit {
            added:   committed.items_added,
            updated: committed.items_updated,
            removed: committed.items_removed,
            reason:  err.to_string(),
         }));
      }
      for op in chunk {
         match op {
            WriteOp::Insert(_) => committed.items_added += 1,
            WriteOp::Update(_) => committed.items_updated += 1,
            WriteOp::Delete { .. } => committed.items_removed += 1,
         }
      }
   }

   Ok(counts)
}
