//! Delegation (admin impersonation)
//!
//! An admin can work the system as an employee or customer without a
//! second account. While delegated, the outer session holds the
//! `Delegate` intent and the delegation markers; the impersonated
//! flow's own `(intent, step, scratch)` lives nested under
//! `persistent.inner`. Inner handlers never see the outer fields: each
//! event is split into a synthetic inner session, run through the
//! ordinary flow/menu handlers with the acting role's identity, and
//! merged back. The handlers stay delegation-agnostic and the outer
//! markers are structurally out of their reach.

use sitedesk_protocol::{EventKind, Identity, Response, Role};
use tracing::{error, info, warn};

use crate::engine::Services;
use crate::error::EngineError;
use crate::flows::{self, FlowEvent, SELECT_SITE_STEP};
use crate::menu;
use crate::session::{InnerFlow, Intent, Session};
use crate::sites::{self, SiteResolution};

/// Step the outer session sits on while inner events are being routed.
pub const ACTIVE_STEP: &str = "active";

/// The outer markers lifted off the session for the duration of one
/// inner event. `restore` re-asserts them afterwards, so nothing an
/// inner handler does can end the delegation or change who is acting.
struct DelegationFrame {
    original_role: Option<Role>,
    acting_as: Option<Role>,
}

impl DelegationFrame {
    /// Split the outer session into the frame and a synthetic session
    /// holding only what inner handlers may touch.
    fn split(outer: &Session) -> (DelegationFrame, Session) {
        let frame = DelegationFrame {
            original_role: outer.data.persistent.original_role,
            acting_as: outer.data.persistent.acting_as,
        };

        let inner_flow = outer.data.persistent.inner.clone().unwrap_or_default();
        let mut inner = Session::new(outer.address.clone());
        inner.intent = inner_flow.intent;
        inner.step = inner_flow.step;
        inner.data.scratch = inner_flow.scratch;
        // Inner flows read the site context; they get a copy, and only
        // the site fields survive the merge back.
        inner.data.persistent.selected_site = outer.data.persistent.selected_site.clone();
        inner.data.persistent.site_selection_shown = outer.data.persistent.site_selection_shown;
        (frame, inner)
    }

    /// Merge the inner session back into the outer one. Copy-back is
    /// selective: site fields only, markers from the frame.
    fn restore(self, outer: &mut Session, inner: Session) {
        outer.data.persistent.selected_site = inner.data.persistent.selected_site;
        outer.data.persistent.site_selection_shown = inner.data.persistent.site_selection_shown;

        outer.data.persistent.original_role = self.original_role;
        outer.data.persistent.acting_as = self.acting_as;
        outer.data.persistent.is_delegated = true;

        let idle = inner.intent.is_none() && inner.data.scratch.is_empty();
        outer.data.persistent.inner = if idle {
            None
        } else {
            Some(InnerFlow {
                intent: inner.intent,
                step: inner.step,
                scratch: inner.data.scratch,
            })
        };

        outer.intent = Some(Intent::Delegate);
        outer.step = Some(ACTIVE_STEP.to_string());
        outer.touch();
    }
}

/// Identity inner handlers see: same address, the acting role.
fn acting_identity(identity: &Identity, role: Role) -> Identity {
    Identity {
        address: identity.address.clone(),
        role,
        verified: true,
        display_name: identity.display_name.clone(),
    }
}

/// Begin working as the target role. The site context is settled here,
/// before any inner flow runs; eligibility is the admin's (every site).
pub async fn start(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    target: Role,
) -> Result<Vec<Response>, EngineError> {
    info!(
        component = "delegation",
        event = "delegation.start",
        address = %identity.address,
        target = target.as_str(),
        "Entering delegation"
    );

    session.data.persistent.original_role = Some(identity.role);
    session.data.persistent.is_delegated = true;
    session.data.persistent.acting_as = Some(target);
    session.data.persistent.inner = None;

    let mut responses = vec![Response::confirmation(format!(
        "You are now working as a {}. Type 'exit' to stop.",
        target.as_str()
    ))];

    if session.site().is_none() {
        match services.sites.resolve(identity).await? {
            SiteResolution::NoneEligible => {
                end(session);
                return Ok(vec![Response::failure(
                    "There are no sites configured yet.",
                )]);
            }
            SiteResolution::Resolved(site) => {
                responses.push(Response::confirmation(format!(
                    "Site set to {}.",
                    site.site_name
                )));
                session.data.persistent.selected_site = Some(site);
                session.data.persistent.site_selection_shown = true;
            }
            SiteResolution::NeedsSelection(eligible) => {
                session.start_flow(Intent::Delegate, SELECT_SITE_STEP);
                responses.push(Response::menu(
                    "Which site are you working on?",
                    sites::site_options(&eligible),
                ));
                return Ok(responses);
            }
        }
    }

    session.start_flow(Intent::Delegate, ACTIVE_STEP);
    responses.extend(menu::main_menu(target));
    Ok(responses)
}

/// Route one event arriving while the session is delegated.
pub async fn handle_event(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    kind: &EventKind,
) -> Result<Vec<Response>, EngineError> {
    let Some(target) = session.data.persistent.acting_as else {
        warn!(
            component = "delegation",
            event = "delegation.missing_target",
            address = %session.address,
            "Delegated session has no acting role, ending delegation"
        );
        return Ok(exit(session));
    };

    match session.step.as_deref() {
        Some(SELECT_SITE_STEP) => handle_site_selection(services, identity, session, target, kind).await,
        Some(ACTIVE_STEP) => route_inner(services, identity, session, target, kind).await,
        _ => {
            warn!(
                component = "delegation",
                event = "delegation.bad_step",
                address = %session.address,
                step = session.step.as_deref().unwrap_or("<none>"),
                "Delegated session on unknown step, ending delegation"
            );
            Ok(exit(session))
        }
    }
}

async fn handle_site_selection(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    target: Role,
    kind: &EventKind,
) -> Result<Vec<Response>, EngineError> {
    let eligible = services.sites.eligible(identity).await?;
    let choice = flows::event_text(kind).and_then(|t| sites::validate_choice(&eligible, t));

    match choice {
        Some(site) => {
            let confirmation = format!("Site set to {}.", site.site_name);
            session.data.persistent.selected_site = Some(site);
            session.data.persistent.site_selection_shown = true;
            session.step = Some(ACTIVE_STEP.to_string());
            session.touch();

            let mut responses = vec![Response::confirmation(confirmation)];
            responses.extend(menu::main_menu(target));
            Ok(responses)
        }
        None => Ok(vec![
            Response::failure("Please pick a site from the list."),
            Response::menu("Which site are you working on?", sites::site_options(&eligible)),
        ]),
    }
}

/// Run one event through the inner handlers. On inner failure the outer
/// session is left exactly as it was.
async fn route_inner(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    target: Role,
    kind: &EventKind,
) -> Result<Vec<Response>, EngineError> {
    let acting = acting_identity(identity, target);
    let (frame, mut inner) = DelegationFrame::split(session);

    let result = if inner.intent.is_some() {
        match flows::handle_flow_event(services, &acting, &mut inner, kind).await {
            Ok(FlowEvent::Responses(responses)) => Ok(responses),
            Ok(FlowEvent::Corrupted) => {
                warn!(
                    component = "delegation",
                    event = "delegation.inner_corrupted",
                    address = %session.address,
                    "Inner flow state corrupted, resetting to acting menu"
                );
                inner.clear_flow();
                Ok(menu::main_menu(target))
            }
            Err(e) => Err(e),
        }
    } else {
        menu::handle_menu_event(services, &acting, &mut inner, kind).await
    };

    match result {
        Ok(responses) => {
            frame.restore(session, inner);
            Ok(responses)
        }
        Err(e) => {
            error!(
                component = "delegation",
                event = "delegation.inner_failed",
                address = %session.address,
                error = %e,
                "Inner handler failed, outer session untouched"
            );
            Ok(vec![Response::failure(
                "Sorry, something went wrong. Please try again.",
            )])
        }
    }
}

/// Internal teardown of the delegation markers.
fn end(session: &mut Session) {
    session.data.persistent.original_role = None;
    session.data.persistent.is_delegated = false;
    session.data.persistent.acting_as = None;
    session.data.persistent.inner = None;
    // The site belonged to the impersonation, not to the admin.
    session.data.persistent.selected_site = None;
    session.data.persistent.site_selection_shown = false;
    session.clear_flow();
}

/// Exit keyword while delegated: the whole delegation ends, inner flow
/// included, and the admin is back on their own menu.
pub fn exit(session: &mut Session) -> Vec<Response> {
    info!(
        component = "delegation",
        event = "delegation.exit",
        address = %session.address,
        "Leaving delegation"
    );
    end(session);

    let mut responses = vec![Response::confirmation("Back to your own account.")];
    responses.extend(menu::main_menu(Role::Admin));
    responses
}
