//! Event dispatcher
//!
//! Single routing point between an inbound event and the handler that
//! owns the session's current state. Order matters: exit first, then
//! delegation, then corruption recovery, then the active flow, then
//! the menu. Handler errors never escape to the transport; they log
//! and degrade to a generic failure with the session unchanged.

use sitedesk_protocol::{EventKind, Identity, Response, Role};
use tracing::{error, warn};

use crate::delegation;
use crate::engine::Services;
use crate::error::EngineError;
use crate::flows::{self, FlowEvent};
use crate::menu;
use crate::session::Session;

pub async fn dispatch(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    kind: &EventKind,
) -> Vec<Response> {
    match route(services, identity, session, kind).await {
        Ok(responses) => responses,
        Err(e) => {
            error!(
                component = "dispatcher",
                event = "dispatch.failed",
                address = %session.address,
                error = %e,
                "Event handling failed"
            );
            vec![Response::failure(
                "Sorry, something went wrong. Please try again.",
            )]
        }
    }
}

async fn route(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    kind: &EventKind,
) -> Result<Vec<Response>, EngineError> {
    // The exit keyword is honoured from anywhere. For a delegated admin
    // it ends the whole delegation, not just the inner flow.
    if flows::is_exit(kind) {
        if identity.role == Role::Admin && session.data.persistent.is_delegated {
            return Ok(delegation::exit(session));
        }
        if !session.is_idle() {
            session.clear_flow();
            let mut responses = vec![Response::confirmation("Okay, cancelled.")];
            responses.extend(menu::main_menu(identity.role));
            return Ok(responses);
        }
        return Ok(menu::main_menu(identity.role));
    }

    if identity.role == Role::Admin && session.data.persistent.is_delegated {
        return delegation::handle_event(services, identity, session, kind).await;
    }

    // Self-heal: an intent with no step can only come from a bad write.
    if session.is_corrupted() {
        warn!(
            component = "dispatcher",
            event = "session.corrupted",
            address = %session.address,
            intent = session.intent.map(|i| i.as_str()).unwrap_or("<none>"),
            "Corrupted session state, resetting to menu"
        );
        session.clear_flow();
        return Ok(menu::main_menu(identity.role));
    }

    if session.intent.is_some() {
        return match flows::handle_flow_event(services, identity, session, kind).await? {
            FlowEvent::Responses(responses) => Ok(responses),
            FlowEvent::Corrupted => {
                warn!(
                    component = "dispatcher",
                    event = "session.unknown_step",
                    address = %session.address,
                    "Unknown flow step, resetting to menu"
                );
                session.clear_flow();
                Ok(menu::main_menu(identity.role))
            }
        };
    }

    menu::handle_menu_event(services, identity, session, kind).await
}
