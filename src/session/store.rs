use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use super::view::{Role, View};
use crate::chat::ChatState;
use crate::recipes::RecipesState;
use crate::scan::ScanState;

/// Per-tab state of a user dashboard. Admin sessions have none.
pub struct UserDashboard {
    pub scan: ScanState,
    pub chat: ChatState,
    pub recipes: RecipesState,
}

pub struct Session {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub view: View,
    pub created_at: OffsetDateTime,
    /// Matches the token expiry; past it the session counts as gone.
    pub expires_at: OffsetDateTime,
    pub dashboard: Option<UserDashboard>,
}

impl Session {
    fn is_live(&self, now: OffsetDateTime) -> bool {
        self.expires_at > now
    }
}

/// In-memory sessions. Locks are never held across an `.await`.
/// Expired entries are invisible to readers and dropped on the next insert or sweep.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn insert(&self, session: Session) {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let pruned = prune(&mut guard, now);
        if pruned > 0 {
            debug!(pruned, "expired sessions dropped");
        }
        guard.insert(session.id, session);
    }

    pub fn prune_expired(&self, now: OffsetDateTime) -> usize {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        prune(&mut guard, now)
    }

    /// Spawns a tokio task that drops expired sessions every `every`.
    pub fn start_sweeper(&self, every: Duration) {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // Skip the first immediate tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let pruned = store.prune_expired(OffsetDateTime::now_utc());
                if pruned > 0 {
                    info!(pruned, remaining = store.len(), "session sweep");
                }
            }
        });
    }

    pub fn remove(&self, id: Uuid) -> Option<Session> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn read<R>(&self, id: Uuid, f: impl FnOnce(&Session) -> R) -> Option<R> {
        let now = OffsetDateTime::now_utc();
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(&id).filter(|s| s.is_live(now)).map(f)
    }

    pub fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let now = OffsetDateTime::now_utc();
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.get_mut(&id).filter(|s| s.is_live(now)).map(f)
    }

    pub fn read_dashboard<R>(&self, id: Uuid, f: impl FnOnce(&UserDashboard) -> R) -> Option<R> {
        self.read(id, |s| s.dashboard.as_ref().map(f)).flatten()
    }

    pub fn update_dashboard<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut UserDashboard) -> R,
    ) -> Option<R> {
        self.update(id, |s| s.dashboard.as_mut().map(f)).flatten()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn prune(sessions: &mut HashMap<Uuid, Session>, now: OffsetDateTime) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| s.is_live(now));
    before - sessions.len()
}
