//! Whole-container sync with a remote per-user document store.
//!
//! The remote copy is the container serialized to a JSON string and stored as
//! a single string value (so the document body is JSON-encoded twice). Loads
//! replace the local container wholesale and re-run the migrations; saves
//! overwrite the remote document unconditionally.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    sync::{Arc, Mutex as StdMutex},
};

use anyhow::Context;
use serde_json::Value;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    characters::Roster,
    migrate::MigrationReport,
    state::{StateStore, StoreError},
    storage::LocalStorage,
};

pub const DEFAULT_DATABASE_URL: &str = "https://idleon-companion-default-rtdb.firebaseio.com";

pub const NOT_LOGGED_IN: &str = "You are not logged in!";
pub const NO_CLOUD_DATA: &str = "No data found on the cloud.";
pub const CLOUD_DATA_LOADED: &str = "Cloud data loaded!";
pub const CLOUD_DATA_SAVED: &str = "Data saved to the cloud.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbRef {
    /// Reserved for shared character builds.
    Builds,
    Users,
}

impl DbRef {
    pub fn path(&self) -> &'static str {
        match self {
            DbRef::Builds => "/builds",
            DbRef::Users => "/users",
        }
    }

    pub fn child(&self, id: &str) -> String {
        format!("{}/{id}", self.path())
    }

    /// Like [`DbRef::child`], but refuses ids the database cannot store as a
    /// single key.
    pub fn checked_child(&self, id: &str) -> Result<String, SyncError> {
        if is_valid_key(id) {
            Ok(self.child(id))
        } else {
            Err(SyncError::InvalidKey(id.to_string()))
        }
    }
}

/// Realtime Database keys are non-empty and contain none of `/ . # $ [ ]` or
/// ASCII control characters.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_ascii_control())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    /// Bearer credential forwarded to the document store, if it needs one.
    pub id_token: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            id_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.id_token = Some(token.into());
        self
    }
}

pub trait IdentityProvider: Send + Sync + 'static {
    /// `None` means nobody is signed in.
    fn current_user(&self) -> Option<Identity>;
}

#[derive(Debug, Default)]
pub struct Session {
    user: StdMutex<Option<Identity>>,
}

impl Session {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            user: StdMutex::new(Some(identity)),
        }
    }

    pub fn sign_in(&self, identity: Identity) {
        *self.user.lock().unwrap_or_else(|e| e.into_inner()) = Some(identity);
    }

    pub fn sign_out(&self) {
        *self.user.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl IdentityProvider for Session {
    fn current_user(&self) -> Option<Identity> {
        self.user.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A user-facing message about a sync operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync + 'static {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => info!("{}", notice.message),
            NoticeLevel::Error => warn!("{}", notice.message),
        }
    }
}

/// Keeps every notice; handy for callers that render them later.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: StdMutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notice);
    }
}

/// Remote key/value document store boundary.
pub trait DocumentStore: Send + Sync + 'static {
    /// The string stored at `path`, or `None` if there is no document.
    fn get(
        &self,
        path: &str,
        identity: &Identity,
    ) -> impl Future<Output = anyhow::Result<Option<String>>> + Send;

    /// Overwrite the document at `path`.
    fn set(
        &self,
        path: &str,
        payload: String,
        identity: &Identity,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Realtime Database REST dialect: `GET`/`PUT {base}{path}.json?auth=...`,
/// where a `null` body means no document.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    base: String,
    client: reqwest::Client,
}

impl HttpDocumentStore {
    pub fn new(base: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("companion/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            base: base.into(),
            client,
        })
    }

    /// Each `/`-separated piece of `path` becomes one percent-encoded segment.
    fn url(&self, path: &str) -> anyhow::Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base)
            .with_context(|| format!("invalid database url: {}", self.base))?;
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let leaf = format!("{}.json", segments.pop().unwrap_or_default());
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("database url cannot take a path: {}", self.base))?
            .pop_if_empty()
            .extend(segments)
            .push(&leaf);
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        identity: &Identity,
    ) -> anyhow::Result<reqwest::RequestBuilder> {
        let req = self.client.request(method, self.url(path)?);
        Ok(match &identity.id_token {
            Some(token) => req.query(&[("auth", token)]),
            None => req,
        })
    }
}

impl DocumentStore for HttpDocumentStore {
    async fn get(&self, path: &str, identity: &Identity) -> anyhow::Result<Option<String>> {
        let value = self
            .request(reqwest::Method::GET, path, identity)?
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(payload) => Some(payload),
            // Written without the string wrapper; the JSON text is still usable.
            other => Some(other.to_string()),
        })
    }

    async fn set(&self, path: &str, payload: String, identity: &Identity) -> anyhow::Result<()> {
        self.request(reqwest::Method::PUT, path, identity)?
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, String>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: impl Into<String>, payload: impl Into<String>) {
        self.documents
            .lock()
            .await
            .insert(path.into(), payload.into());
    }

    pub async fn document(&self, path: &str) -> Option<String> {
        self.documents.lock().await.get(path).cloned()
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str, _identity: &Identity) -> anyhow::Result<Option<String>> {
        Ok(self.documents.lock().await.get(path).cloned())
    }

    async fn set(&self, path: &str, payload: String, _identity: &Identity) -> anyhow::Result<()> {
        self.documents
            .lock()
            .await
            .insert(path.to_string(), payload);
        Ok(())
    }
}

#[derive(Debug)]
pub enum SyncError {
    /// The signed-in uid cannot name a remote document.
    InvalidKey(String),
    Remote(anyhow::Error),
    Decode(serde_json::Error),
    Store(StoreError),
    WriteAborted(tokio::task::JoinError),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey(key) => write!(f, "invalid remote document key: {key:?}"),
            Self::Remote(e) => write!(f, "remote document store error: {e:#}"),
            Self::Decode(e) => write!(f, "remote document is not valid json: {e}"),
            Self::Store(e) => write!(f, "{e}"),
            Self::WriteAborted(e) => write!(f, "remote write did not finish: {e}"),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidKey(_) => None,
            Self::Remote(e) => Some(&**e),
            Self::Decode(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::WriteAborted(e) => Some(e),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value)
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

#[derive(Debug)]
pub enum LoadOutcome {
    NotAuthenticated,
    NotFound,
    Loaded {
        roster: Roster,
        report: MigrationReport,
    },
}

#[derive(Debug)]
pub enum SaveOutcome {
    NotAuthenticated,
    /// The write is running in the background; the success notice has
    /// already been sent.
    Started(PendingWrite),
}

/// Completion of a background save. Dropping it leaves the write running.
#[derive(Debug)]
pub struct PendingWrite {
    handle: JoinHandle<Result<(), SyncError>>,
}

impl PendingWrite {
    pub async fn wait(self) -> Result<(), SyncError> {
        self.handle.await.map_err(SyncError::WriteAborted)?
    }
}

pub type SharedStore<S> = Arc<Mutex<StateStore<S>>>;

pub struct SyncGateway<S: LocalStorage, D: DocumentStore> {
    store: SharedStore<S>,
    documents: Arc<D>,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
    // Loads serialize with loads and saves with saves; a load racing a save
    // is left to the caller.
    load_in_flight: Mutex<()>,
    save_in_flight: Arc<Mutex<()>>,
}

impl<S: LocalStorage, D: DocumentStore> SyncGateway<S, D> {
    pub fn new(
        store: SharedStore<S>,
        documents: Arc<D>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            documents,
            identity,
            notifier,
            load_in_flight: Mutex::new(()),
            save_in_flight: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &SharedStore<S> {
        &self.store
    }

    /// Replace the local container with the signed-in user's remote copy.
    ///
    /// Returns before touching local state when nobody is signed in or no
    /// remote copy exists.
    pub async fn load(&self) -> Result<LoadOutcome, SyncError> {
        let _in_flight = self.load_in_flight.lock().await;

        let Some(user) = self.identity.current_user() else {
            self.notifier.notify(Notice::error(NOT_LOGGED_IN));
            return Ok(LoadOutcome::NotAuthenticated);
        };

        let path = DbRef::Users.checked_child(&user.uid)?;
        let payload = self.documents.get(&path, &user).await.map_err(|e| {
            warn!(uid = %user.uid, error = %e, "remote load failed");
            SyncError::Remote(e)
        })?;
        let Some(payload) = payload else {
            self.notifier.notify(Notice::error(NO_CLOUD_DATA));
            return Ok(LoadOutcome::NotFound);
        };

        let document: Value = serde_json::from_str(&payload)?;
        let (roster, report) = {
            let mut store = self.store.lock().await;
            let report = store.replace_document(document)?.clone();
            (Roster::from_raw(&store.state().chars), report)
        };

        info!(
            uid = %user.uid,
            from = %report.from,
            to = %report.to,
            characters = roster.len(),
            "loaded state from remote"
        );
        self.notifier.notify(Notice::success(CLOUD_DATA_LOADED));
        Ok(LoadOutcome::Loaded { roster, report })
    }

    /// Overwrite the signed-in user's remote copy with the local container.
    ///
    /// The success notice is sent as soon as the write starts; await the
    /// returned [`PendingWrite`] to observe whether it actually landed.
    pub async fn save(&self) -> Result<SaveOutcome, SyncError> {
        let Some(user) = self.identity.current_user() else {
            self.notifier.notify(Notice::error(NOT_LOGGED_IN));
            return Ok(SaveOutcome::NotAuthenticated);
        };

        let path = DbRef::Users.checked_child(&user.uid)?;
        let in_flight = self.save_in_flight.clone().lock_owned().await;
        let payload = self.store.lock().await.to_json()?;

        self.notifier.notify(Notice::success(CLOUD_DATA_SAVED));

        let documents = self.documents.clone();
        let handle = tokio::spawn(async move {
            let _in_flight = in_flight;
            let bytes = payload.len();
            match documents.set(&path, payload, &user).await {
                Ok(()) => {
                    info!(uid = %user.uid, bytes, "saved state to remote");
                    Ok(())
                }
                Err(e) => {
                    warn!(uid = %user.uid, error = %e, "remote save failed");
                    Err(SyncError::Remote(e))
                }
            }
        });
        Ok(SaveOutcome::Started(PendingWrite { handle }))
    }
}
