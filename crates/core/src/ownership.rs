//! Owner check applied before any mutation or secret exposure.

use crate::error::{CoreError, CoreResult};
use crate::types::DbId;

/// An entity exclusively owned by one user.
pub trait Owned {
    fn owner_id(&self) -> DbId;
}

/// Whether `entity` belongs to `user_id`.
pub fn belongs_to<T: Owned + ?Sized>(entity: &T, user_id: DbId) -> bool {
    entity.owner_id() == user_id
}

/// Fail closed with [`CoreError::Forbidden`] unless `entity` belongs to `user_id`.
pub fn ensure_owner<T: Owned + ?Sized>(
    entity: &T,
    user_id: DbId,
    entity_name: &str,
) -> CoreResult<()> {
    if belongs_to(entity, user_id) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "{entity_name} does not belong to the requesting user"
        )))
    }
}
