//! Role-scoped main menu
//!
//! The idle surface: each role sees only the flows it may start, and
//! admins additionally get the delegation entries. Unrecognised input
//! re-shows the menu rather than erroring.

use sitedesk_protocol::{EventKind, Identity, MenuOption, Response, Role};

use crate::delegation;
use crate::engine::Services;
use crate::error::EngineError;
use crate::flows;
use crate::session::Session;

pub const WORK_AS_EMPLOYEE: &str = "work_as_employee";
pub const WORK_AS_CUSTOMER: &str = "work_as_customer";

pub fn main_menu(role: Role) -> Vec<Response> {
    let mut options: Vec<MenuOption> = flows::flows_for_role(role)
        .iter()
        .map(|f| MenuOption::new(f.menu_id, f.menu_label))
        .collect();

    if role == Role::Admin {
        options.push(MenuOption::new(WORK_AS_EMPLOYEE, "Work as an employee"));
        options.push(MenuOption::new(WORK_AS_CUSTOMER, "Work as a customer"));
    }

    let text = match role {
        Role::Admin => "What would you like to do?",
        Role::Employee => "What would you like to do on site today?",
        Role::Customer => "How can we help you today?",
    };
    vec![Response::menu(text, options)]
}

/// Handle an event while the session is idle: either start something or
/// re-show the menu.
pub async fn handle_menu_event(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    kind: &EventKind,
) -> Result<Vec<Response>, EngineError> {
    let Some(choice) = flows::event_text(kind).map(str::trim) else {
        return Ok(main_menu(identity.role));
    };

    if identity.role == Role::Admin {
        if choice.eq_ignore_ascii_case(WORK_AS_EMPLOYEE) {
            return delegation::start(services, identity, session, Role::Employee).await;
        }
        if choice.eq_ignore_ascii_case(WORK_AS_CUSTOMER) {
            return delegation::start(services, identity, session, Role::Customer).await;
        }
    }

    let flow = flows::flows_for_role(identity.role)
        .into_iter()
        .find(|f| f.menu_id.eq_ignore_ascii_case(choice) || f.menu_label.eq_ignore_ascii_case(choice));

    match flow {
        Some(flow) => flows::start_flow(services, identity, session, flow).await,
        None => Ok(main_menu(identity.role)),
    }
}
