//! Gateway-delegated identity. The upstream gateway authenticates users and
//! forwards a trusted id/email pair; this module upserts the user row once per
//! process per user and maps user types to entitlements.

use std::time::Duration;

use db::models::user::{User, UserType};
use moka::future::Cache;
use sqlx::SqlitePool;
use uuid::Uuid;

/// The authenticated caller, attached to every request after session
/// establishment.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub user_type: UserType,
}

/// Per-user-type limits. Quota is enforced per rolling 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlements {
    pub max_messages_per_day: i64,
}

impl Entitlements {
    pub fn for_user_type(user_type: UserType) -> Self {
        match user_type {
            UserType::Guest => Self {
                max_messages_per_day: 20,
            },
            UserType::Regular => Self {
                max_messages_per_day: 100,
            },
        }
    }
}

impl Identity {
    pub fn entitlements(&self) -> Entitlements {
        Entitlements::for_user_type(self.user_type)
    }
}

/// Dedupes the ensure-user upsert so the hot path skips the database once a
/// user has been seen recently.
#[derive(Clone)]
pub struct SessionService {
    seen: Cache<Uuid, ()>,
}

impl Default for SessionService {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionService {
    pub fn new() -> Self {
        Self {
            seen: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(Duration::from_secs(15 * 60))
                .build(),
        }
    }

    /// Upserts the user row (refreshing the email) and returns the caller's
    /// identity. Guests are recognized by an email ending in `@guest.local`.
    pub async fn establish(
        &self,
        pool: &SqlitePool,
        user_id: Uuid,
        email: &str,
    ) -> Result<Identity, sqlx::Error> {
        let user_type = if email.ends_with("@guest.local") {
            UserType::Guest
        } else {
            UserType::Regular
        };

        if self.seen.get(&user_id).await.is_none() {
            User::ensure(pool, user_id, email, user_type).await?;
            self.seen.insert(user_id, ()).await;
        }

        Ok(Identity {
            user_id,
            email: email.to_string(),
            user_type,
        })
    }
}
