//! The code → live session table.
//!
//! Guarded by a single lock (never held across an `.await` other than the
//! trivial map operations themselves). At most one session may occupy a code;
//! a second valid reconnect evicts the incumbent by closing its transport,
//! then overwrites the entry.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;
use tracing::info;

use crate::{
    code::CodeScheme,
    error::RelayError,
    protocol::RegisterPayload,
    secret::{derive_secret, encode_secret, verify_secret},
    session::ProviderSession,
};

pub struct Registry {
    master_key: [u8; 32],
    sessions: Mutex<HashMap<String, Arc<ProviderSession>>>,
}

impl Registry {
    pub fn new(master_key: [u8; 32]) -> Self {
        Self { master_key, sessions: Mutex::new(HashMap::new()) }
    }

    pub fn master_key(&self) -> [u8; 32] {
        self.master_key
    }

    pub async fn get(&self, code: &str) -> Option<Arc<ProviderSession>> {
        self.sessions.lock().await.get(code).cloned()
    }

    /// Handle a `register` frame. Mints a new code when `payload.code` is
    /// empty; otherwise validates the presented `(code, secret)` pair and, on
    /// success, evicts any incumbent occupying that code before installing
    /// `session`.
    pub async fn register(
        &self,
        mut payload: RegisterPayload,
        session: Arc<ProviderSession>,
    ) -> Result<RegisterPayload, RelayError> {
        if payload.code.is_empty() {
            let code = CodeScheme::ACTIVE.generate();
            let secret = encode_secret(&derive_secret(&self.master_key, &code));
            payload.code = code.clone();
            payload.secret = secret;

            let mut sessions = self.sessions.lock().await;
            sessions.insert(code.clone(), session);
            info!(code = %code, "minted new provider code");
            return Ok(payload);
        }

        if payload.code.len() != CodeScheme::ACTIVE.expected_len()
            || !verify_secret(&self.master_key, &payload.code, &payload.secret)
        {
            return Err(RelayError::InvalidToken);
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(incumbent) = sessions.get(&payload.code) {
            info!(code = %payload.code, "evicting incumbent session for takeover");
            incumbent.close();
        }
        sessions.insert(payload.code.clone(), session);
        info!(code = %payload.code, "provider reconnected");
        Ok(payload)
    }

    /// Remove `code` from the table, but only if it still points at `session`
    /// — a takeover's newer session must not be undone by the old session's
    /// own cleanup running after the fact.
    pub async fn unregister(&self, code: &str, session: &Arc<ProviderSession>) {
        let mut sessions = self.sessions.lock().await;
        if let Some(current) = sessions.get(code) {
            if Arc::ptr_eq(current, session) {
                sessions.remove(code);
            }
        }
    }
}
