//! Identity and the authentication collaborator boundary
//!
//! Sign-in mechanics belong to an external provider. The core only consumes
//! the resulting [`Identity`] and reacts to it changing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// A stable principal that messages and keys are attributed to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique id assigned by the auth provider
    pub uid: String,
    /// Human readable label, e.g. an email address
    pub label: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            label: label.into(),
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.label, self.uid)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("sign-in rejected: {0}")]
    Rejected(String),
    #[error("auth error: {0}")]
    Default(#[from] anyhow::Error),
}

#[async_trait]
pub trait AuthProvider: Send + Sync + std::fmt::Debug + 'static {
    /// The currently signed-in identity, if any
    fn current_identity(&self) -> Option<Identity>;

    /// Change notification for the signed-in identity
    fn watch_identity(&self) -> watch::Receiver<Option<Identity>>;

    async fn sign_in(&self, identity: Identity) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// In-process auth provider that accepts whatever identity it is given
#[derive(Debug)]
pub struct StaticAuth {
    tx: watch::Sender<Option<Identity>>,
}

impl StaticAuth {
    pub fn new(identity: Option<Identity>) -> Self {
        let (tx, _) = watch::channel(identity);
        Self { tx }
    }
}

impl Default for StaticAuth {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    fn current_identity(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    async fn sign_in(&self, identity: Identity) -> Result<Identity, AuthError> {
        if identity.uid.is_empty() {
            return Err(AuthError::Rejected("empty uid".to_string()));
        }
        tracing::debug!("signed in as {}", identity);
        self.tx.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.tx.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_notifies_watchers() {
        let auth = StaticAuth::default();
        let mut rx = auth.watch_identity();
        assert!(auth.current_identity().is_none());

        let alice = Identity::new("alice", "alice@example.com");
        auth.sign_in(alice.clone()).await.unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref(), Some(&alice));
        assert_eq!(auth.current_identity(), Some(alice));

        auth.sign_out().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_empty_uid_rejected() {
        let auth = StaticAuth::default();
        let result = auth.sign_in(Identity::new("", "nobody")).await;
        assert!(matches!(result, Err(AuthError::Rejected(_))));
    }
}
