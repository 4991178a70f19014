//! CSRF tokens for cookie-authenticated sessions
//!
//! One token per session. The store keeps only a keyed digest of each token
//! and compares digests in constant time.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct StoredToken {
    digest: Vec<u8>,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CsrfStore {
    key: Arc<[u8; 32]>,
    ttl: Duration,
    tokens: Arc<RwLock<HashMap<String, StoredToken>>>,
}

impl std::fmt::Debug for CsrfStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfStore").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl CsrfStore {
    /// Store with a random per-process digest key
    pub fn new(ttl: Duration) -> Result<Self> {
        let mut key = [0u8; 32];
        getrandom::fill(&mut key).map_err(|e| anyhow!("Failed to seed CSRF key: {}", e))?;
        Ok(Self {
            key: Arc::new(key),
            ttl,
            tokens: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.key.as_slice()).map_err(|e| anyhow!("Invalid CSRF key: {}", e))
    }

    fn digest(&self, token: &str) -> Result<Vec<u8>> {
        let mut mac = self.mac()?;
        mac.update(token.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Issue a fresh token for `session_id`, replacing any previous one
    pub async fn issue(&self, session_id: &str) -> Result<String> {
        let mut bytes = [0u8; TOKEN_BYTES];
        getrandom::fill(&mut bytes).map_err(|e| anyhow!("Failed to generate CSRF token: {}", e))?;
        let token = HEXLOWER.encode(&bytes);

        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or_else(|_| ChronoDuration::hours(2));
        let stored = StoredToken {
            digest: self.digest(&token)?,
            expires_at: Utc::now() + ttl,
        };
        self.tokens.write().await.insert(session_id.to_string(), stored);
        Ok(token)
    }

    pub async fn validate(&self, session_id: &str, presented: &str) -> bool {
        self.validate_at(session_id, presented, Utc::now()).await
    }

    pub async fn validate_at(&self, session_id: &str, presented: &str, now: DateTime<Utc>) -> bool {
        let tokens = self.tokens.read().await;
        let Some(stored) = tokens.get(session_id) else {
            return false;
        };
        if stored.expires_at <= now {
            return false;
        }
        let Ok(mut mac) = self.mac() else {
            return false;
        };
        mac.update(presented.as_bytes());
        mac.verify_slice(&stored.digest).is_ok()
    }

    pub async fn revoke(&self, session_id: &str) {
        self.tokens.write().await.remove(session_id);
    }

    /// Drop expired tokens, returning how many were removed
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut tokens = self.tokens.write().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.expires_at > now);
        before - tokens.len()
    }
}
