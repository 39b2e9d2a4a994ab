use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::user::User;
use crate::store::UserStore;

/// Prune dead entries once the map grows past this many keys.
const PRUNE_THRESHOLD: usize = 1024;

/// Keyed async locks, one per user.
///
/// Waiters on the same key are served in FIFO order (tokio's mutex is fair),
/// so transitions for one user apply in the order they reached the lock.
/// Different users never contend.
#[derive(Default)]
pub struct UserLocks {
    held: Mutex<HashMap<Uuid, Weak<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut held = self.held.lock().await;
            if held.len() >= PRUNE_THRESHOLD {
                held.retain(|_, lock| lock.strong_count() > 0);
            }
            match held.get(&user_id).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(Mutex::new(()));
                    held.insert(user_id, Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub async fn tracked(&self) -> usize {
        self.held.lock().await.len()
    }
}

/// Result of a read-modify-write on a user document.
#[derive(Debug)]
pub struct UserUpdate {
    pub user: User,
    /// False when the mutation left the documents unchanged and no write
    /// was issued.
    pub written: bool,
}

/// Lock the user, then read, mutate and write the user document.
pub async fn update_user<F>(
    users: &dyn UserStore,
    locks: &UserLocks,
    user_id: Uuid,
    mutate: F,
) -> Result<UserUpdate, AppError>
where
    F: FnMut(&mut User) -> Result<(), AppError> + Send,
{
    let _guard = locks.acquire(user_id).await;
    update_user_locked(users, user_id, mutate).await
}

/// Read-modify-write for a caller that already holds the user's lock.
///
/// A revision conflict (a writer outside this process) is retried once
/// against a fresh read, then surfaced.
pub async fn update_user_locked<F>(
    users: &dyn UserStore,
    user_id: Uuid,
    mut mutate: F,
) -> Result<UserUpdate, AppError>
where
    F: FnMut(&mut User) -> Result<(), AppError> + Send,
{
    let mut retried = false;
    loop {
        let current = users
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

        let mut next = current.clone();
        mutate(&mut next)?;

        if !next.documents_differ(&current) {
            debug!(%user_id, "User documents unchanged, skipping write");
            return Ok(UserUpdate {
                user: current,
                written: false,
            });
        }

        match users.save_user(&next).await {
            Ok(saved) => {
                return Ok(UserUpdate {
                    user: saved,
                    written: true,
                })
            }
            Err(AppError::Conflict(msg)) if !retried => {
                warn!(%user_id, "Write conflict ({msg}), retrying with a fresh read");
                retried = true;
            }
            Err(e) => return Err(e),
        }
    }
}
