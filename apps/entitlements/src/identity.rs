//! Seam to the external identity context.
//!
//! The entitlement layer never mints or caches credentials itself. It asks
//! the provider for a fresh bearer token immediately before each call and
//! subscribes to principal transitions to know when to refetch.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// The signed-in principal as reported by the identity layer.
/// `None` throughout this module means a guest session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub email: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;

    /// A short-lived bearer token for the current principal. `None` for
    /// guests or when the identity layer cannot mint one right now.
    async fn bearer_token(&self) -> Option<String>;

    /// Principal transitions. The receiver observes the current value at
    /// subscription time, then every subsequent change.
    fn subscribe(&self) -> watch::Receiver<Option<Principal>>;
}

/// Process-local identity used by the diagnostic binary and tests.
/// Holds a fixed token per sign-in rather than minting fresh ones.
pub struct LocalIdentity {
    tx: watch::Sender<Option<Principal>>,
    token: Mutex<Option<String>>,
}

impl LocalIdentity {
    pub fn guest() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            tx,
            token: Mutex::new(None),
        }
    }

    pub fn signed_in(principal: Principal, token: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(Some(principal));
        Self {
            tx,
            token: Mutex::new(Some(token.into())),
        }
    }

    pub fn sign_in(&self, principal: Principal, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = Some(token.into());
        }
        self.tx.send_replace(Some(principal));
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.token.lock() {
            *guard = None;
        }
        self.tx.send_replace(None);
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    fn current_principal(&self) -> Option<Principal> {
        self.tx.borrow().clone()
    }

    async fn bearer_token(&self) -> Option<String> {
        self.token.lock().ok().and_then(|guard| guard.clone())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.tx.subscribe()
    }
}
