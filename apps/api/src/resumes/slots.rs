use uuid::Uuid;

use super::error::{store_failure, ResumeError};
use super::repository::ResumeRepository;

/// Each owner may hold this many resumes at once.
pub const MAX_SLOTS: i16 = 3;

/// Lowest slot in `[0, MAX_SLOTS)` not present in `occupied`.
pub fn lowest_free_slot(occupied: &[i16]) -> Option<i16> {
    (0..MAX_SLOTS).find(|slot| !occupied.contains(slot))
}

/// Optimistic: another request may take the same slot before this one inserts.
/// The `(owner, slot)` unique constraint decides the winner.
pub async fn find_free_slot(repo: &dyn ResumeRepository, owner: Uuid) -> Result<i16, ResumeError> {
    let occupied = repo
        .occupied_slots(owner)
        .await
        .map_err(|e| store_failure("find_free_slot", owner, None, e))?;
    lowest_free_slot(&occupied).ok_or(ResumeError::SlotExhausted)
}
