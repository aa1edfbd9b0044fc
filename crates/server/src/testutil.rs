//! Shared test doubles and fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sitedesk_protocol::{Identity, Role, SiteContext};

use crate::engine::{Deps, Services};
use crate::error::EngineError;
use crate::identity::IdentityResolver;
use crate::records::{RecordDraft, RecordSink};
use crate::sites::{SiteContextResolver, SiteDirectory};
use crate::store::SessionStore;
use crate::upload::{AttachmentStore, UploadError, UploadPipeline};

pub fn employee(address: &str) -> Identity {
    Identity {
        address: address.into(),
        role: Role::Employee,
        verified: true,
        display_name: None,
    }
}

pub fn customer(address: &str) -> Identity {
    Identity {
        address: address.into(),
        role: Role::Customer,
        verified: true,
        display_name: None,
    }
}

pub fn admin(address: &str) -> Identity {
    Identity {
        address: address.into(),
        role: Role::Admin,
        verified: true,
        display_name: None,
    }
}

/// Directory serving a fixed site list to every identity.
pub struct StubDirectory {
    sites: Vec<SiteContext>,
}

impl StubDirectory {
    pub fn new(sites: Vec<SiteContext>) -> Self {
        Self { sites }
    }
}

#[async_trait]
impl SiteDirectory for StubDirectory {
    async fn eligible_sites(&self, _identity: &Identity) -> Result<Vec<SiteContext>, EngineError> {
        Ok(self.sites.clone())
    }
}

/// Sink that remembers every draft; flip `fail` to simulate an outage.
#[derive(Default)]
pub struct StubSink {
    written: Mutex<Vec<RecordDraft>>,
    fail: std::sync::atomic::AtomicBool,
}

impl StubSink {
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn written(&self) -> Vec<RecordDraft> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for StubSink {
    async fn write(&self, draft: RecordDraft) -> Result<String, EngineError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EngineError::Sink("stub sink down".into()));
        }
        self.written.lock().unwrap().push(draft);
        Ok(sitedesk_protocol::new_id())
    }
}

enum StoreMode {
    Ok,
    Fail,
    Slow(Duration),
}

/// Attachment store double: succeeding, failing, or slow.
pub struct StubAttachmentStore {
    mode: StoreMode,
    stored: AtomicUsize,
}

impl Default for StubAttachmentStore {
    fn default() -> Self {
        Self {
            mode: StoreMode::Ok,
            stored: AtomicUsize::new(0),
        }
    }
}

impl StubAttachmentStore {
    pub fn failing() -> Self {
        Self {
            mode: StoreMode::Fail,
            stored: AtomicUsize::new(0),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            mode: StoreMode::Slow(delay),
            stored: AtomicUsize::new(0),
        }
    }

    pub fn stored_count(&self) -> usize {
        self.stored.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttachmentStore for StubAttachmentStore {
    async fn store(
        &self,
        _bytes: Vec<u8>,
        _mime_type: &str,
        folder: &str,
    ) -> Result<String, UploadError> {
        match &self.mode {
            StoreMode::Ok => {}
            StoreMode::Fail => return Err(UploadError::Transfer("stub store down".into())),
            StoreMode::Slow(delay) => tokio::time::sleep(*delay).await,
        }
        self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}/{}", folder, sitedesk_protocol::new_id()))
    }
}

fn site(id: &str, name: &str) -> SiteContext {
    SiteContext {
        site_id: id.into(),
        site_name: name.into(),
    }
}

pub fn services_with(
    sites: Vec<(&str, &str)>,
    sink: Arc<dyn RecordSink>,
    store: Arc<dyn AttachmentStore>,
) -> Services {
    let sites = sites.into_iter().map(|(id, name)| site(id, name)).collect();
    Services {
        sites: SiteContextResolver::new(Arc::new(StubDirectory::new(sites))),
        sink,
        uploads: UploadPipeline::new(store),
    }
}

pub fn services_with_store(
    sites: Vec<(&str, &str)>,
    store: Arc<dyn AttachmentStore>,
) -> Services {
    services_with(sites, Arc::new(StubSink::default()), store)
}

/// Default fixture: one site, recording sink, succeeding uploads.
pub fn services() -> Services {
    services_with(
        vec![("s1", "Riverside")],
        Arc::new(StubSink::default()),
        Arc::new(StubAttachmentStore::default()),
    )
}

/// Identity resolver over a fixed address book.
pub struct StubIdentities {
    known: HashMap<String, Identity>,
}

#[async_trait]
impl IdentityResolver for StubIdentities {
    async fn resolve(&self, address: &str) -> Result<Option<Identity>, EngineError> {
        Ok(self.known.get(address).cloned())
    }
}

/// Full actor/engine fixture over a throwaway database: "+1" and "+2"
/// are employees, "+9" is an admin.
pub async fn deps() -> Arc<Deps> {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let mut conn = crate::db::open(&db_path).unwrap();
    crate::db::run_migrations(&mut conn).unwrap();
    // Keep the directory for the lifetime of the test process.
    std::mem::forget(dir);

    let mut known = HashMap::new();
    for address in ["+1", "+2"] {
        known.insert(address.to_string(), employee(address));
    }
    known.insert("+9".to_string(), admin("+9"));

    Arc::new(Deps {
        store: SessionStore::new(db_path),
        identities: Arc::new(StubIdentities { known }),
        services: services(),
    })
}
