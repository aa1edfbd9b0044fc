//! Per-address session actor
//!
//! One task owns each address's session, so events from the same
//! address are handled strictly in arrival order with no locking. The
//! session hydrates lazily from the store on the first event and is
//! written back after every event; a failed write degrades to
//! in-memory state rather than dropping the turn. An `ArcSwap`
//! snapshot gives readers the latest state without touching the
//! mailbox.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use sitedesk_protocol::{EventKind, Identity, Response};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::dispatcher;
use crate::engine::Deps;
use crate::session::Session;

const MAILBOX_DEPTH: usize = 64;

pub enum AddressCommand {
    ProcessEvent {
        identity: Identity,
        kind: EventKind,
        reply: oneshot::Sender<Vec<Response>>,
    },
}

#[derive(Clone)]
pub struct AddressActorHandle {
    pub address: String,
    command_tx: mpsc::Sender<AddressCommand>,
    snapshot: Arc<ArcSwap<Session>>,
}

impl AddressActorHandle {
    pub fn spawn(address: String, deps: Arc<Deps>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(MAILBOX_DEPTH);
        let snapshot = Arc::new(ArcSwap::from_pointee(Session::new(address.clone())));

        tokio::spawn(actor_loop(
            address.clone(),
            deps,
            command_rx,
            snapshot.clone(),
        ));

        Self {
            address,
            command_tx,
            snapshot,
        }
    }

    /// `None` when the actor has shut down.
    pub async fn process(&self, identity: Identity, kind: EventKind) -> Option<Vec<Response>> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(AddressCommand::ProcessEvent {
                identity,
                kind,
                reply,
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Latest session state without going through the mailbox.
    pub fn snapshot(&self) -> Arc<Session> {
        self.snapshot.load_full()
    }
}

async fn actor_loop(
    address: String,
    deps: Arc<Deps>,
    mut command_rx: mpsc::Receiver<AddressCommand>,
    snapshot: Arc<ArcSwap<Session>>,
) {
    let mut session = hydrate(&address, &deps).await;
    snapshot.store(Arc::new(session.clone()));

    while let Some(command) = command_rx.recv().await {
        match command {
            AddressCommand::ProcessEvent {
                identity,
                kind,
                reply,
            } => {
                let responses =
                    dispatcher::dispatch(&deps.services, &identity, &mut session, &kind).await;

                if let Err(e) = deps.store.save(&session).await {
                    // Degrade to in-memory state; the next successful
                    // save catches up.
                    warn!(
                        component = "actor",
                        event = "session.save_failed",
                        address = %address,
                        error = %e,
                        "Session write failed, continuing in memory"
                    );
                }
                snapshot.store(Arc::new(session.clone()));
                let _ = reply.send(responses);
            }
        }
    }

    debug!(
        component = "actor",
        event = "actor.stopped",
        address = %address,
        "Session actor stopped"
    );
}

async fn hydrate(address: &str, deps: &Arc<Deps>) -> Session {
    match deps.store.get(address).await {
        Ok(Some(mut session)) => {
            if session.is_expired_at(Utc::now()) {
                debug!(
                    component = "actor",
                    event = "session.expired",
                    address = %address,
                    "Stale session, starting clean"
                );
                session.reset();
            }
            session
        }
        Ok(None) => Session::new(address),
        Err(e) => {
            warn!(
                component = "actor",
                event = "session.hydrate_failed",
                address = %address,
                error = %e,
                "Could not load session, starting transient"
            );
            Session::new(address)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Intent;
    use crate::testutil::{deps, employee};
    use sitedesk_protocol::EventKind;

    fn text(body: &str) -> EventKind {
        EventKind::Text {
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn events_from_one_address_are_serialized() {
        let deps = deps().await;
        let handle = AddressActorHandle::spawn("+1".into(), deps);

        // Start a flow, then answer its first step. Ordering matters:
        // the second event only makes sense after the first landed.
        handle
            .process(employee("+1"), text("inventory_txn"))
            .await
            .unwrap();
        handle.process(employee("+1"), text("out")).await.unwrap();

        let session = handle.snapshot();
        assert_eq!(session.intent, Some(Intent::InventoryTxn));
        assert_eq!(session.step.as_deref(), Some("item"));
    }

    #[tokio::test]
    async fn snapshot_tracks_the_latest_state() {
        let deps = deps().await;
        let handle = AddressActorHandle::spawn("+1".into(), deps);

        assert!(handle.snapshot().is_idle());
        handle
            .process(employee("+1"), text("log_activity"))
            .await
            .unwrap();
        assert_eq!(handle.snapshot().intent, Some(Intent::ActivityLog));
    }

    #[tokio::test]
    async fn session_survives_actor_restart() {
        let deps = deps().await;
        let handle = AddressActorHandle::spawn("+1".into(), deps.clone());
        handle
            .process(employee("+1"), text("inventory_txn"))
            .await
            .unwrap();
        drop(handle);

        let handle = AddressActorHandle::spawn("+1".into(), deps);
        handle.process(employee("+1"), text("out")).await.unwrap();
        assert_eq!(handle.snapshot().step.as_deref(), Some("item"));
    }
}
