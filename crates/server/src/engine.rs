//! Engine: identity resolution plus the actor registry
//!
//! The transport hands every inbound event to `Engine::handle_event`.
//! The engine resolves who is talking, finds or spawns the address's
//! session actor, and forwards the event. Everything below the actor
//! boundary is sequential per address.

use std::sync::Arc;

use dashmap::DashMap;
use sitedesk_protocol::{InboundEvent, Response};
use tracing::{error, info};

use crate::actor::AddressActorHandle;
use crate::identity::IdentityResolver;
use crate::records::RecordSink;
use crate::sites::SiteContextResolver;
use crate::store::SessionStore;
use crate::upload::UploadPipeline;

/// Domain services the handlers run against.
#[derive(Clone)]
pub struct Services {
    pub sites: SiteContextResolver,
    pub sink: Arc<dyn RecordSink>,
    pub uploads: UploadPipeline,
}

/// Everything an address actor needs.
pub struct Deps {
    pub store: SessionStore,
    pub identities: Arc<dyn IdentityResolver>,
    pub services: Services,
}

pub struct Engine {
    deps: Arc<Deps>,
    actors: DashMap<String, AddressActorHandle>,
}

impl Engine {
    pub fn new(deps: Arc<Deps>) -> Self {
        Self {
            deps,
            actors: DashMap::new(),
        }
    }

    pub async fn handle_event(&self, event: InboundEvent) -> Vec<Response> {
        let identity = match self.deps.identities.resolve(&event.address).await {
            Ok(Some(identity)) if identity.verified => identity,
            Ok(_) => {
                info!(
                    component = "engine",
                    event = "event.unregistered",
                    address = %event.address,
                    "Event from unknown or unverified address"
                );
                return vec![Response::failure(
                    "This number is not registered. Please contact your site office.",
                )];
            }
            Err(e) => {
                error!(
                    component = "engine",
                    event = "identity.resolve_failed",
                    address = %event.address,
                    error = %e,
                    "Identity lookup failed"
                );
                return vec![Response::failure(
                    "Sorry, something went wrong. Please try again.",
                )];
            }
        };

        let handle = self
            .actors
            .entry(event.address.clone())
            .or_insert_with(|| {
                AddressActorHandle::spawn(event.address.clone(), self.deps.clone())
            })
            .clone();

        match handle.process(identity, event.kind).await {
            Some(responses) => responses,
            None => {
                // The actor died; drop the handle so the next event
                // respawns it from the stored session.
                self.actors.remove(&event.address);
                error!(
                    component = "engine",
                    event = "actor.unavailable",
                    address = %event.address,
                    "Session actor unavailable"
                );
                vec![Response::failure(
                    "Sorry, something went wrong. Please try again.",
                )]
            }
        }
    }
}
