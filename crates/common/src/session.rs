//! Signed-in chat session and the decrypted feed
//!
//! A [`Session`] binds one identity to its key material and implements the
//! send path. A [`Feed`] follows the auth provider: for every signed-in
//! identity it establishes a session, subscribes to the message log and
//! keeps the newest decrypted snapshot in a `watch` channel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::Identity;
use crate::context::Context;
use crate::crypto::{import_public_key, DecryptKey};
use crate::engine::{
    decrypt_batch, encrypt_for_group, encrypt_for_pair, DecodedMessage, EncryptError,
    GroupCiphertext, Recipient, RecipientWarning,
};
use crate::envelope::{Envelope, EnvelopeBatch};
use crate::keystore::{KeyMaterialReport, KeyStoreError};
use crate::store::{DocumentStore, StoreError, Subscription};

/// Delay before retrying a failed session setup or an ended subscription
const RETRY_DELAY: Duration = Duration::from_secs(1);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Whether this session encrypts
#[derive(Debug, Clone)]
pub enum EncryptionMode {
    Enabled(DecryptKey),
    /// Plain mode for the rest of the session
    Disabled { reason: String },
}

impl EncryptionMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, EncryptionMode::Enabled(_))
    }

    fn key(&self) -> Option<&DecryptKey> {
        match self {
            EncryptionMode::Enabled(key) => Some(key),
            EncryptionMode::Disabled { .. } => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    NotSignedIn,
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error("directory error: {0}")]
    Directory(#[source] BoxError),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Encrypt(#[from] EncryptError),
    #[error("directory error: {0}")]
    Directory(#[source] BoxError),
    #[error("none of the recipients can receive encrypted messages")]
    NoReachableRecipients,
    #[error("not signed in")]
    NotSignedIn,
    #[error("message is empty")]
    EmptyMessage,
}

fn directory_error<T>(e: StoreError<T>) -> BoxError
where
    T: std::error::Error + Send + Sync + 'static,
{
    Box::new(e)
}

/// What a successful send wrote
#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub envelope: Envelope,
    /// Recipients left out of the message
    pub warnings: Vec<(String, RecipientWarning)>,
}

impl std::fmt::Display for SendReceipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sent {} message {}",
            if self.envelope.body.is_encrypted() {
                "encrypted"
            } else {
                "plain"
            },
            self.envelope.id
        )?;
        for (uid, warning) in &self.warnings {
            write!(f, "\n  warning: {} skipped ({})", uid, warning)?;
        }
        Ok(())
    }
}

/// One identity's view of the chat
#[derive(Debug)]
pub struct Session<S: DocumentStore> {
    ctx: Arc<Context<S>>,
    identity: Identity,
    mode: EncryptionMode,
    report: Option<KeyMaterialReport>,
}

impl<S: DocumentStore> Session<S> {
    /// Establish a session for whoever is currently signed in
    pub async fn start(ctx: Arc<Context<S>>) -> Result<Self, SessionError> {
        let identity = ctx.current_identity().ok_or(SessionError::NotSignedIn)?;
        Self::establish(ctx, identity).await
    }

    /// Ensure key material for `identity` and load its private key
    ///
    /// A failed key generation does not fail the session; it runs in plain
    /// mode instead. When the directory cannot be reached but this device
    /// holds a private key, the session still reads with that key and
    /// `key_report` is `None`; the next established session publishes.
    /// Any other key store failure is returned.
    pub async fn establish(ctx: Arc<Context<S>>, identity: Identity) -> Result<Self, SessionError> {
        if !ctx.config().encryption_enabled {
            tracing::info!("encryption disabled by configuration");
            return Ok(Self {
                ctx,
                identity,
                mode: EncryptionMode::Disabled {
                    reason: "disabled by configuration".to_string(),
                },
                report: None,
            });
        }

        let keystore = ctx.keystore();
        let (mode, report) = match keystore.ensure_key_material(&identity).await {
            Ok(report) => {
                tracing::info!("key material for {}: {}", identity, report);
                let key = keystore.load_private_key(&identity)?;
                (EncryptionMode::Enabled(key), Some(report))
            }
            Err(KeyStoreError::KeyGeneration(e)) => {
                tracing::error!("key generation failed, falling back to plain messages: {}", e);
                (
                    EncryptionMode::Disabled {
                        reason: e.to_string(),
                    },
                    None,
                )
            }
            Err(KeyStoreError::Directory(e)) => match keystore.load_private_key(&identity) {
                Ok(key) => {
                    tracing::warn!(
                        "directory unavailable, continuing {} with the local key: {}",
                        identity,
                        e
                    );
                    (EncryptionMode::Enabled(key), None)
                }
                Err(_) => return Err(KeyStoreError::Directory(e).into()),
            },
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            ctx,
            identity,
            mode,
            report,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn mode(&self) -> &EncryptionMode {
        &self.mode
    }

    /// Outcome of the key check run when the session was established
    pub fn key_report(&self) -> Option<KeyMaterialReport> {
        self.report
    }

    /// Send `text` to everyone in the directory
    ///
    /// The directory is scanned in full on every send, so identities that
    /// published a key since the last send are included.
    pub async fn send(&self, text: &str) -> Result<SendReceipt, SendError> {
        self.check_signed_in()?;
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let envelope = match &self.mode {
            EncryptionMode::Disabled { .. } => Envelope::plain(&self.identity, text),
            EncryptionMode::Enabled(_) => {
                let GroupCiphertext { ciphers, warnings } = self.encrypt_for_directory(text).await?;
                if ciphers.is_empty() {
                    return Err(SendError::NoReachableRecipients);
                }
                let envelope = Envelope::group(&self.identity, ciphers);
                return self.write(envelope, warnings.into_iter().collect()).await;
            }
        };
        self.write(envelope, Vec::new()).await
    }

    /// Send `text` to a single identity
    pub async fn send_to(&self, recipient_uid: &str, text: &str) -> Result<SendReceipt, SendError> {
        self.check_signed_in()?;
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let Some(key) = self.mode.key() else {
            return self.write(Envelope::plain(&self.identity, text), Vec::new()).await;
        };

        let record = self
            .ctx
            .store()
            .get_record(recipient_uid)
            .await
            .map_err(|e| SendError::Directory(directory_error(e)))?
            .ok_or(SendError::NoReachableRecipients)?;
        let recipient_key = import_public_key(&record.public_key)
            .map_err(|e| SendError::Encrypt(EncryptError::Key(e)))?;

        let body = encrypt_for_pair(text, &key.encrypt_key(), recipient_uid, &recipient_key)?;
        self.write(Envelope::new(&self.identity, body), Vec::new())
            .await
    }

    /// Decode the current message log once
    pub async fn read(&self) -> Result<Vec<DecodedMessage>, SessionError> {
        let batch = self
            .ctx
            .store()
            .messages()
            .await
            .map_err(|e| SessionError::Directory(directory_error(e)))?;
        Ok(self.decode(&batch).await)
    }

    /// Decode a snapshot for this session's identity
    pub async fn decode(&self, batch: &EnvelopeBatch) -> Vec<DecodedMessage> {
        decrypt_batch(batch, &self.identity.uid, self.mode.key()).await
    }

    /// Sends are refused once the auth provider has moved on from this
    /// session's identity
    fn check_signed_in(&self) -> Result<(), SendError> {
        match self.ctx.current_identity() {
            Some(current) if current.uid == self.identity.uid => Ok(()),
            _ => Err(SendError::NotSignedIn),
        }
    }

    async fn encrypt_for_directory(&self, text: &str) -> Result<GroupCiphertext, SendError> {
        let records = self
            .ctx
            .store()
            .list_records()
            .await
            .map_err(|e| SendError::Directory(directory_error(e)))?;
        let recipients: Vec<Recipient> = records.into_iter().map(Recipient::from).collect();
        encrypt_for_group(text, &recipients).map_err(|e| match e {
            EncryptError::NoRecipients => SendError::NoReachableRecipients,
            other => SendError::Encrypt(other),
        })
    }

    async fn write(
        &self,
        envelope: Envelope,
        warnings: Vec<(String, RecipientWarning)>,
    ) -> Result<SendReceipt, SendError> {
        self.ctx
            .store()
            .append_message(envelope.clone())
            .await
            .map_err(|e| SendError::Directory(directory_error(e)))?;
        tracing::debug!("appended message {}", envelope.id);
        Ok(SendReceipt { envelope, warnings })
    }
}

/// Latest output of a [`Feed`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    pub identity: Option<Identity>,
    pub messages: Vec<DecodedMessage>,
}

/// Background task keeping a decrypted view of the message log
///
/// Dropping the feed stops the task.
#[derive(Debug)]
pub struct Feed {
    state: watch::Receiver<FeedState>,
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug, PartialEq, Eq)]
enum Interrupt {
    IdentityChanged,
    Cancelled,
}

impl Feed {
    pub fn spawn<S: DocumentStore>(ctx: Arc<Context<S>>) -> Self {
        let (state_tx, state_rx) = watch::channel(FeedState::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let identity_rx = ctx.auth().watch_identity();

        let handle = tokio::spawn(run_feed(ctx, identity_rx, cancel_rx, state_tx));

        Self {
            state: state_rx,
            cancel: cancel_tx,
            handle: Some(handle),
        }
    }

    /// The newest decrypted snapshot
    pub fn state(&self) -> FeedState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified whenever the snapshot changes
    pub fn watch(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    /// Wait for the next snapshot; `None` once the feed has stopped
    pub async fn changed(&mut self) -> Option<FeedState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Stop the feed and wait for its task to exit
    pub async fn stop(mut self) {
        self.cancel.send_replace(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!("feed task failed: {}", e);
            }
        }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

async fn run_feed<S: DocumentStore>(
    ctx: Arc<Context<S>>,
    mut identity_rx: watch::Receiver<Option<Identity>>,
    mut cancel_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<FeedState>,
) {
    loop {
        let identity = identity_rx.borrow_and_update().clone();
        let interrupt = match identity {
            None => {
                state_tx.send_replace(FeedState::default());
                interrupted(&mut identity_rx, &mut cancel_rx).await
            }
            Some(identity) => {
                follow_identity(&ctx, identity, &mut identity_rx, &mut cancel_rx, &state_tx).await
            }
        };
        match interrupt {
            Interrupt::IdentityChanged => tracing::debug!("identity changed, restarting feed"),
            Interrupt::Cancelled => break,
        }
    }
    tracing::debug!("feed stopped");
}

async fn follow_identity<S: DocumentStore>(
    ctx: &Arc<Context<S>>,
    identity: Identity,
    identity_rx: &mut watch::Receiver<Option<Identity>>,
    cancel_rx: &mut watch::Receiver<bool>,
    state_tx: &watch::Sender<FeedState>,
) -> Interrupt {
    state_tx.send_replace(FeedState {
        identity: Some(identity.clone()),
        messages: Vec::new(),
    });

    let session = loop {
        tokio::select! {
            biased;
            interrupt = interrupted(identity_rx, cancel_rx) => return interrupt,
            session = Session::establish(ctx.clone(), identity.clone()) => match session {
                Ok(session) => break session,
                Err(e) => tracing::warn!("could not start session, retrying: {}", e),
            },
        }
        tokio::select! {
            interrupt = interrupted(identity_rx, cancel_rx) => return interrupt,
            _ = tokio::time::sleep(RETRY_DELAY) => {}
        }
    };
    let session = &session;

    loop {
        let mut subscription = match ctx.store().subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!("subscribe failed: {}", e);
                tokio::select! {
                    interrupt = interrupted(identity_rx, cancel_rx) => return interrupt,
                    _ = tokio::time::sleep(RETRY_DELAY) => continue,
                }
            }
        };

        let decode = move |batch: EnvelopeBatch| async move { session.decode(&batch).await };
        if let Some(interrupt) =
            follow_log(&mut subscription, identity_rx, cancel_rx, decode, state_tx).await
        {
            return interrupt;
        }

        tracing::warn!("message subscription ended, resubscribing");
        tokio::select! {
            interrupt = interrupted(identity_rx, cancel_rx) => return interrupt,
            _ = tokio::time::sleep(RETRY_DELAY) => {}
        }
    }
}

/// Decode snapshots from `subscription` into `state_tx` until it ends
///
/// A snapshot that arrives while an older one is still decoding replaces
/// it; the older result is never published. Returns `None` when the
/// subscription ends on its own.
async fn follow_log<F, Fut>(
    subscription: &mut Subscription,
    identity_rx: &mut watch::Receiver<Option<Identity>>,
    cancel_rx: &mut watch::Receiver<bool>,
    decode: F,
    state_tx: &watch::Sender<FeedState>,
) -> Option<Interrupt>
where
    F: Fn(EnvelopeBatch) -> Fut,
    Fut: Future<Output = Vec<DecodedMessage>>,
{
    let mut pending: Option<EnvelopeBatch> = None;
    loop {
        let batch = match pending.take() {
            Some(batch) => batch,
            None => tokio::select! {
                biased;
                interrupt = interrupted(identity_rx, cancel_rx) => {
                    subscription.cancel();
                    return Some(interrupt);
                }
                next = subscription.next() => next?,
            },
        };

        let stale = batch.len();
        tokio::select! {
            biased;
            interrupt = interrupted(identity_rx, cancel_rx) => {
                subscription.cancel();
                return Some(interrupt);
            }
            next = subscription.next() => {
                tracing::trace!("dropping stale batch of {} messages", stale);
                pending = Some(next?);
            }
            messages = decode(batch) => {
                state_tx.send_modify(|state| state.messages = messages);
            }
        }
    }
}

/// Resolves when the signed-in identity changes or the feed is cancelled
async fn interrupted(
    identity_rx: &mut watch::Receiver<Option<Identity>>,
    cancel_rx: &mut watch::Receiver<bool>,
) -> Interrupt {
    if *cancel_rx.borrow() {
        return Interrupt::Cancelled;
    }
    tokio::select! {
        changed = identity_rx.changed() => match changed {
            Ok(()) => Interrupt::IdentityChanged,
            Err(_) => Interrupt::Cancelled,
        },
        _ = cancel_rx.changed() => Interrupt::Cancelled,
    }
}
