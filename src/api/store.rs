//! In-memory simulation sessions

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::Simulation;
use crate::landmarks::DetectionToken;

/// One uploaded photo and its editing state
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    last_used: Mutex<DateTime<Utc>>,
    detection: Mutex<DetectionToken>,
    simulation: Mutex<Simulation>,
}

impl Session {
    pub fn last_used(&self) -> DateTime<Utc> {
        *self.last_used.lock()
    }

    fn touch(&self) {
        *self.last_used.lock() = Utc::now();
    }

    /// Cancel the detection running for the previous photo and hand out a
    /// token for the next one
    pub fn begin_detection(&self) -> DetectionToken {
        let mut current = self.detection.lock();
        current.cancel();
        *current = DetectionToken::new();
        current.clone()
    }

    pub fn cancel_detection(&self) {
        self.detection.lock().cancel();
    }

    /// Exclusive access to the simulation. Hold only on a blocking thread.
    pub fn simulation(&self) -> parking_lot::MutexGuard<'_, Simulation> {
        self.simulation.lock()
    }
}

/// Sessions keyed by id, evicting the least recently used one when full
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<Session>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(max_sessions: usize) -> Self {
        SessionStore {
            sessions: DashMap::new(),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn insert(&self, simulation: Simulation) -> Arc<Session> {
        while self.sessions.len() >= self.max_sessions {
            if !self.evict_oldest() {
                break;
            }
        }

        let now = Utc::now();
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            created_at: now,
            last_used: Mutex::new(now),
            detection: Mutex::new(DetectionToken::new()),
            simulation: Mutex::new(simulation),
        });
        self.sessions.insert(session.id, Arc::clone(&session));
        info!(session_id = %session.id, sessions = self.sessions.len(), "Session created");
        session
    }

    /// Look up a session and mark it as used
    pub fn get(&self, id: &Uuid) -> Option<Arc<Session>> {
        let session = self.sessions.get(id).map(|entry| Arc::clone(entry.value()))?;
        session.touch();
        Some(session)
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        match self.sessions.remove(id) {
            Some((_, session)) => {
                session.cancel_detection();
                debug!(session_id = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|entry| entry.value().last_used())
            .map(|entry| *entry.key());

        match oldest {
            Some(id) => {
                if let Some((_, session)) = self.sessions.remove(&id) {
                    session.cancel_detection();
                }
                info!(session_id = %id, "Evicted least recently used session");
                true
            }
            None => false,
        }
    }
}
