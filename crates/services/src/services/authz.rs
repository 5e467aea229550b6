//! Single authorization capability applied before every mutating operation.

use uuid::Uuid;

/// Can `actor` mutate a resource owned by `owner`?
pub fn can_mutate(owner: Uuid, actor: Uuid) -> bool {
    owner == actor
}
