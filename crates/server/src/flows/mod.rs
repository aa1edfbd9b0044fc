//! Stepped flow wizards
//!
//! Every workflow (activity logging, material requests, inventory
//! transactions, invoice tracking, bookings) is the same machine: an
//! ordered table of named steps, a validator per step, and one durable
//! record written on completion. Flows declare their tables; the driver
//! here owns all control flow, so adding a flow never duplicates it.
//!
//! The driver is deterministic given its inputs; the only suspension
//! points are the attachment upload and the record sink write.

pub mod activity;
pub mod booking;
pub mod inventory;
pub mod invoice;
pub mod material;
pub mod parse;

use chrono::Utc;
use serde_json::{json, Value};
use sitedesk_protocol::{EventKind, Identity, Response, Role, SiteContext};
use tracing::{error, info, warn};

use crate::engine::Services;
use crate::error::EngineError;
use crate::records::RecordDraft;
use crate::session::{Intent, Scratch, Session};
use crate::sites::{self, SiteResolution};
use crate::upload::MAX_UPLOAD_RETRIES;

/// Reserved keyword that leaves the current flow (or delegation).
pub const EXIT_KEYWORD: &str = "exit";

/// Reserved keyword that bypasses an optional attachment step.
pub const SKIP_KEYWORD: &str = "skip";

/// Reserved step name for the site-selection prompt injected before a
/// flow's first real step when the identity is multi-site.
pub const SELECT_SITE_STEP: &str = "select_site";

/// Scratch key tracking failed upload attempts across inbound events.
pub const UPLOAD_ATTEMPTS_KEY: &str = "upload_attempts";

// ---------------------------------------------------------------------------
// Declarative step tables
// ---------------------------------------------------------------------------

/// One selectable option of a choice step.
pub struct Choice {
    pub id: &'static str,
    pub label: &'static str,
}

pub enum DateRule {
    /// Already-occurred events: today or earlier.
    PastOrToday,
    /// Scheduled events: strictly after today.
    Future,
}

pub enum StepKind {
    /// Pick one of a fixed set.
    Choice(&'static [Choice]),
    /// Free text, trimmed, non-empty.
    Text { max_len: usize },
    /// Bounded positive number; `decimal` only for continuous units.
    Quantity { decimal: bool, max: f64 },
    /// Calendar date constrained by the rule.
    Date(DateRule),
    /// Evidence upload; `mandatory` controls whether `skip` is allowed.
    Attachment {
        mandatory: bool,
        folder: &'static str,
    },
    /// Flow-specific validation against the scratch collected so far.
    Custom {
        validate: fn(&Scratch, &str) -> Result<Value, String>,
    },
}

pub enum PromptText {
    Fixed(&'static str),
    Dynamic(fn(&Scratch) -> String),
}

pub enum NextStep {
    Step(&'static str),
    /// Next step depends on what has been collected so far.
    Branch(fn(&Scratch) -> &'static str),
    Done,
}

pub struct StepDef {
    pub name: &'static str,
    pub prompt: PromptText,
    pub kind: StepKind,
    pub next: NextStep,
}

pub struct FlowSpec {
    pub intent: Intent,
    pub menu_id: &'static str,
    pub menu_label: &'static str,
    pub roles: &'static [Role],
    pub needs_site: bool,
    pub steps: &'static [StepDef],
    pub assemble: fn(&Scratch, Option<&SiteContext>) -> RecordDraft,
    pub done_text: &'static str,
}

static ALL_FLOWS: &[&FlowSpec] = &[
    &activity::FLOW,
    &material::FLOW,
    &inventory::FLOW,
    &invoice::FLOW,
    &booking::FLOW,
];

pub fn flow_for(intent: Intent) -> Option<&'static FlowSpec> {
    ALL_FLOWS.iter().copied().find(|f| f.intent == intent)
}

pub fn flows_for_role(role: Role) -> Vec<&'static FlowSpec> {
    ALL_FLOWS
        .iter()
        .copied()
        .filter(|f| f.roles.contains(&role))
        .collect()
}

// ---------------------------------------------------------------------------
// Event helpers
// ---------------------------------------------------------------------------

/// Textual content of an event (selection ids count as text).
pub fn event_text(kind: &EventKind) -> Option<&str> {
    match kind {
        EventKind::Text { body } => Some(body.as_str()),
        EventKind::Selection { id } => Some(id.as_str()),
        EventKind::Attachment { .. } => None,
    }
}

pub fn is_exit(kind: &EventKind) -> bool {
    event_text(kind).is_some_and(|t| t.trim().eq_ignore_ascii_case(EXIT_KEYWORD))
}

fn is_skip(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(SKIP_KEYWORD)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Result of feeding one event into the active flow.
pub enum FlowEvent {
    Responses(Vec<Response>),
    /// The session's step is unknown to the flow table; the caller
    /// resets the session and re-shows the menu.
    Corrupted,
}

/// Begin a flow for the identity, resolving the site context first if
/// the flow needs one and none is selected yet.
pub async fn start_flow(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    flow: &'static FlowSpec,
) -> Result<Vec<Response>, EngineError> {
    let mut responses = Vec::new();

    if flow.needs_site && session.site().is_none() {
        match services.sites.resolve(identity).await? {
            SiteResolution::NoneEligible => {
                return Ok(vec![Response::failure(
                    "You have no site assigned yet. Please contact an administrator.",
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
                session.start_flow(flow.intent, SELECT_SITE_STEP);
                session.data.persistent.site_selection_shown = true;
                return Ok(vec![Response::menu(
                    "Which site is this for?",
                    sites::site_options(&eligible),
                )]);
            }
        }
    }

    session.start_flow(flow.intent, flow.steps[0].name);
    responses.push(step_response(&flow.steps[0], &session.data.scratch));
    Ok(responses)
}

/// Feed one inbound event into the session's active flow.
pub async fn handle_flow_event(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    kind: &EventKind,
) -> Result<FlowEvent, EngineError> {
    let Some(intent) = session.intent else {
        return Ok(FlowEvent::Corrupted);
    };
    let Some(flow) = flow_for(intent) else {
        return Ok(FlowEvent::Corrupted);
    };
    let Some(step_name) = session.step.clone() else {
        return Ok(FlowEvent::Corrupted);
    };

    if step_name == SELECT_SITE_STEP {
        return handle_site_selection(services, identity, session, flow, kind).await;
    }

    let Some(step) = flow.steps.iter().find(|s| s.name == step_name) else {
        warn!(
            component = "flows",
            event = "flow.unknown_step",
            intent = intent.as_str(),
            step = %step_name,
            "Session step not in flow table"
        );
        return Ok(FlowEvent::Corrupted);
    };

    match validate_input(services, step, &mut session.data.scratch, kind).await {
        InputOutcome::Reject(hint) => Ok(FlowEvent::Responses(vec![
            Response::failure(hint),
            step_response(step, &session.data.scratch),
        ])),
        InputOutcome::RejectTerminal(text) => {
            Ok(FlowEvent::Responses(vec![Response::failure(text)]))
        }
        InputOutcome::Accept { value, note } => {
            session
                .data
                .scratch
                .insert(step.name.to_string(), value);
            session.touch();

            let mut responses = Vec::new();
            if let Some(note) = note {
                responses.push(Response::confirmation(note));
            }

            match resolve_next(step, &session.data.scratch) {
                Some(next_name) => {
                    // The table is static; a bad branch target is a
                    // programming error surfaced as corruption.
                    let Some(next) = flow.steps.iter().find(|s| s.name == next_name) else {
                        return Ok(FlowEvent::Corrupted);
                    };
                    session.step = Some(next.name.to_string());
                    responses.push(step_response(next, &session.data.scratch));
                    Ok(FlowEvent::Responses(responses))
                }
                None => {
                    responses.extend(complete_flow(services, flow, session).await);
                    Ok(FlowEvent::Responses(responses))
                }
            }
        }
    }
}

fn resolve_next(step: &StepDef, scratch: &Scratch) -> Option<&'static str> {
    match &step.next {
        NextStep::Step(name) => Some(*name),
        NextStep::Branch(f) => Some(f(scratch)),
        NextStep::Done => None,
    }
}

/// Perform the flow's single durable write, then clear flow-local state.
/// A sink failure abandons the flow back to idle with a user-visible
/// apology; the session is never left stuck on an unfinishable step.
async fn complete_flow(
    services: &Services,
    flow: &'static FlowSpec,
    session: &mut Session,
) -> Vec<Response> {
    let site = session.site().cloned();
    let draft = (flow.assemble)(&session.data.scratch, site.as_ref());
    let record_type = draft.record_type;

    let result = services.sink.write(draft).await;
    session.clear_flow();

    match result {
        Ok(record_id) => {
            info!(
                component = "flows",
                event = "flow.completed",
                intent = flow.intent.as_str(),
                record_type = record_type.as_str(),
                record_id = %record_id,
                "Flow completed"
            );
            vec![Response::confirmation(flow.done_text)]
        }
        Err(e) => {
            error!(
                component = "flows",
                event = "flow.sink_failed",
                intent = flow.intent.as_str(),
                error = %e,
                "Record write failed, abandoning flow"
            );
            vec![Response::failure(
                "Sorry, we could not save that right now. Please try again later.",
            )]
        }
    }
}

async fn handle_site_selection(
    services: &Services,
    identity: &Identity,
    session: &mut Session,
    flow: &'static FlowSpec,
    kind: &EventKind,
) -> Result<FlowEvent, EngineError> {
    let eligible = services.sites.eligible(identity).await?;

    let choice = event_text(kind).and_then(|t| sites::validate_choice(&eligible, t));
    match choice {
        Some(site) => {
            let confirmation = format!("Site set to {}.", site.site_name);
            session.data.persistent.selected_site = Some(site);
            session.data.persistent.site_selection_shown = true;
            let first = &flow.steps[0];
            session.step = Some(first.name.to_string());
            session.touch();
            Ok(FlowEvent::Responses(vec![
                Response::confirmation(confirmation),
                step_response(first, &session.data.scratch),
            ]))
        }
        None => Ok(FlowEvent::Responses(vec![
            Response::failure("Please pick a site from the list."),
            Response::menu("Which site is this for?", sites::site_options(&eligible)),
        ])),
    }
}

/// The prompt for a step, re-emitted verbatim after invalid input.
pub fn step_response(step: &StepDef, scratch: &Scratch) -> Response {
    let text = match &step.prompt {
        PromptText::Fixed(s) => (*s).to_string(),
        PromptText::Dynamic(f) => f(scratch),
    };
    match &step.kind {
        StepKind::Choice(choices) => Response::menu(
            text,
            choices
                .iter()
                .map(|c| sitedesk_protocol::MenuOption::new(c.id, c.label))
                .collect(),
        ),
        _ => Response::prompt(text),
    }
}

// ---------------------------------------------------------------------------
// Step validation
// ---------------------------------------------------------------------------

enum InputOutcome {
    Accept {
        value: Value,
        note: Option<String>,
    },
    /// Invalid input: hint plus the re-emitted step prompt.
    Reject(String),
    /// Stay on the step with a single failure message (retry ceiling,
    /// operator-visible errors). No prompt re-emission.
    RejectTerminal(String),
}

fn accept(value: Value) -> InputOutcome {
    InputOutcome::Accept { value, note: None }
}

async fn validate_input(
    services: &Services,
    step: &StepDef,
    scratch: &mut Scratch,
    kind: &EventKind,
) -> InputOutcome {
    if let StepKind::Attachment { mandatory, folder } = &step.kind {
        return validate_attachment(services, *mandatory, *folder, scratch, kind).await;
    }

    let Some(text) = event_text(kind) else {
        return InputOutcome::Reject("Please reply with text.".to_string());
    };

    match &step.kind {
        StepKind::Choice(choices) => {
            let wanted = text.trim();
            match choices.iter().find(|c| {
                c.id.eq_ignore_ascii_case(wanted) || c.label.eq_ignore_ascii_case(wanted)
            }) {
                Some(c) => accept(Value::String(c.id.to_string())),
                None => InputOutcome::Reject("Please choose one of the options.".to_string()),
            }
        }
        StepKind::Text { max_len } => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                InputOutcome::Reject("Please send a short text reply.".to_string())
            } else if trimmed.chars().count() > *max_len {
                InputOutcome::Reject(format!("Please keep it under {max_len} characters."))
            } else {
                accept(Value::String(trimmed.to_string()))
            }
        }
        StepKind::Quantity { decimal, max } => {
            match parse::parse_quantity(text, *decimal, *max) {
                Ok(value) if *decimal => match serde_json::Number::from_f64(value) {
                    Some(n) => accept(Value::Number(n)),
                    None => InputOutcome::Reject("Quantity must be a positive number.".to_string()),
                },
                Ok(value) => accept(Value::Number((value as i64).into())),
                Err(hint) => InputOutcome::Reject(hint),
            }
        }
        StepKind::Date(rule) => {
            let today = Utc::now().date_naive();
            match parse::parse_date(text, today) {
                Ok(date) => match rule {
                    DateRule::PastOrToday if date > today => InputOutcome::Reject(
                        "That date is in the future. Please send the actual date.".to_string(),
                    ),
                    DateRule::Future if date <= today => {
                        InputOutcome::Reject("Please pick a future date.".to_string())
                    }
                    _ => accept(Value::String(date.format("%Y-%m-%d").to_string())),
                },
                Err(hint) => InputOutcome::Reject(hint),
            }
        }
        StepKind::Custom { validate } => match validate(scratch, text) {
            Ok(value) => accept(value),
            Err(hint) => InputOutcome::Reject(hint),
        },
        StepKind::Attachment { .. } => unreachable!("handled above"),
    }
}

async fn validate_attachment(
    services: &Services,
    mandatory: bool,
    folder: &'static str,
    scratch: &mut Scratch,
    kind: &EventKind,
) -> InputOutcome {
    let attempts = scratch
        .get(UPLOAD_ATTEMPTS_KEY)
        .and_then(Value::as_u64)
        .unwrap_or(0);

    match kind {
        EventKind::Attachment {
            mime_type,
            data_base64,
            ..
        } => {
            // Past the ceiling nothing is uploaded silently.
            if attempts > MAX_UPLOAD_RETRIES {
                return InputOutcome::RejectTerminal(
                    "Your attachment could not be uploaded. Please try again later or contact support."
                        .to_string(),
                );
            }

            match services.uploads.upload(mime_type, data_base64, folder).await {
                Ok(result) => {
                    scratch.remove(UPLOAD_ATTEMPTS_KEY);
                    accept(json!({
                        "reference": result.reference,
                        "mime_type": result.mime_type,
                        "checksum": result.checksum,
                    }))
                }
                Err(e) if !e.consumes_retry() => InputOutcome::Reject(format!(
                    "{e}. Allowed: JPEG, PNG, WebP, or PDF."
                )),
                Err(e) => {
                    let attempts = attempts + 1;
                    scratch.insert(UPLOAD_ATTEMPTS_KEY.to_string(), json!(attempts));

                    if attempts > MAX_UPLOAD_RETRIES {
                        if mandatory {
                            InputOutcome::RejectTerminal(
                                "Your attachment could not be uploaded after 3 attempts. Please try again later or contact support."
                                    .to_string(),
                            )
                        } else {
                            InputOutcome::Accept {
                                value: Value::Null,
                                note: Some("Continuing without attachment.".to_string()),
                            }
                        }
                    } else {
                        InputOutcome::Reject(format!(
                            "Upload failed ({e}). Please send it again (attempt {} of {}).",
                            attempts,
                            MAX_UPLOAD_RETRIES + 1
                        ))
                    }
                }
            }
        }
        _ => {
            if let Some(text) = event_text(kind) {
                if is_skip(text) {
                    if mandatory {
                        return InputOutcome::Reject(
                            "An attachment is required for this step.".to_string(),
                        );
                    }
                    return accept(Value::Null);
                }
            }
            if mandatory {
                InputOutcome::Reject("Please send an attachment.".to_string())
            } else {
                InputOutcome::Reject(
                    "Please send an attachment, or type 'skip'.".to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{employee, services, services_with_store, StubAttachmentStore};
    use std::sync::Arc;

    fn event(text: &str) -> EventKind {
        EventKind::Text {
            body: text.to_string(),
        }
    }

    fn attachment() -> EventKind {
        EventKind::Attachment {
            filename: Some("site.jpg".into()),
            mime_type: "image/jpeg".into(),
            data_base64: "aGVsbG8=".into(),
        }
    }

    async fn responses(
        services: &Services,
        identity: &Identity,
        session: &mut Session,
        kind: &EventKind,
    ) -> Vec<Response> {
        match handle_flow_event(services, identity, session, kind)
            .await
            .unwrap()
        {
            FlowEvent::Responses(r) => r,
            FlowEvent::Corrupted => panic!("unexpected corruption"),
        }
    }

    #[tokio::test]
    async fn invalid_input_leaves_intent_and_step_unchanged() {
        let services = services();
        let identity = employee("+1");
        let mut session = Session::new("+1");
        start_flow(&services, &identity, &mut session, &inventory::FLOW)
            .await
            .unwrap();
        let step_before = session.step.clone();

        let out = responses(&services, &identity, &mut session, &event("bogus")).await;

        assert_eq!(session.intent, Some(Intent::InventoryTxn));
        assert_eq!(session.step, step_before);
        // Exactly one corrective hint plus the re-emitted prompt.
        assert!(matches!(out[0], Response::Failure { .. }));
        assert_eq!(out.len(), 2);
    }

    #[tokio::test]
    async fn unknown_step_reports_corruption() {
        let services = services();
        let identity = employee("+1");
        let mut session = Session::new("+1");
        session.start_flow(Intent::Booking, "no_such_step");

        let result = handle_flow_event(&services, &identity, &mut session, &event("hi"))
            .await
            .unwrap();
        assert!(matches!(result, FlowEvent::Corrupted));
    }

    #[tokio::test]
    async fn multi_site_identity_gets_selection_step() {
        let services = services_with_store(
            vec![("s1", "Riverside"), ("s2", "Hillcrest")],
            Arc::new(StubAttachmentStore::default()),
        );
        let identity = employee("+1");
        let mut session = Session::new("+1");

        let out = start_flow(&services, &identity, &mut session, &booking::FLOW)
            .await
            .unwrap();
        assert_eq!(session.step.as_deref(), Some(SELECT_SITE_STEP));
        assert!(matches!(out[0], Response::Menu { .. }));

        // An out-of-set choice is rejected.
        let out = responses(&services, &identity, &mut session, &event("s9")).await;
        assert_eq!(session.step.as_deref(), Some(SELECT_SITE_STEP));
        assert!(matches!(out[0], Response::Failure { .. }));

        // A valid choice persists the site and moves to the first step.
        let out = responses(&services, &identity, &mut session, &event("s2")).await;
        assert_eq!(
            session.site().map(|s| s.site_id.as_str()),
            Some("s2")
        );
        assert!(session.data.persistent.site_selection_shown);
        assert_eq!(session.step.as_deref(), Some(booking::FLOW.steps[0].name));
        assert!(matches!(out[0], Response::Confirmation { .. }));
    }

    #[tokio::test]
    async fn mandatory_attachment_stays_after_retry_ceiling() {
        let services = services_with_store(
            vec![("s1", "Riverside")],
            Arc::new(StubAttachmentStore::failing()),
        );
        let identity = employee("+1");
        let mut session = Session::new("+1");
        session.data.persistent.selected_site = Some(sitedesk_protocol::SiteContext {
            site_id: "s1".into(),
            site_name: "Riverside".into(),
        });
        session.start_flow(Intent::ActivityLog, "photo");

        // Attempts 1 and 2: hint + re-prompt.
        for expected in 1..=2u64 {
            let out = responses(&services, &identity, &mut session, &attachment()).await;
            assert!(matches!(out[0], Response::Failure { .. }));
            assert_eq!(
                session.data.scratch[UPLOAD_ATTEMPTS_KEY],
                json!(expected)
            );
        }

        // Attempt 3 crosses the ceiling: terminal failure, same step.
        let out = responses(&services, &identity, &mut session, &attachment()).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Response::Failure { .. }));
        assert_eq!(session.step.as_deref(), Some("photo"));

        // A fourth attachment is never uploaded silently.
        let out = responses(&services, &identity, &mut session, &attachment()).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Response::Failure { .. }));
        assert_eq!(session.step.as_deref(), Some("photo"));
    }

    #[tokio::test]
    async fn optional_attachment_falls_back_after_ceiling() {
        let services = services_with_store(
            vec![("s1", "Riverside")],
            Arc::new(StubAttachmentStore::failing()),
        );
        let identity = employee("+1");
        let mut session = Session::new("+1");
        session.data.persistent.selected_site = Some(sitedesk_protocol::SiteContext {
            site_id: "s1".into(),
            site_name: "Riverside".into(),
        });
        session.start_flow(Intent::InvoiceTrack, "attachment");
        session
            .data
            .scratch
            .insert("invoice_number".into(), json!("INV-1"));
        session.data.scratch.insert("amount".into(), json!(120.0));
        session.data.scratch.insert("vendor".into(), json!("Acme"));
        session
            .data
            .scratch
            .insert("invoice_date".into(), json!("2026-08-01"));

        for _ in 0..2 {
            responses(&services, &identity, &mut session, &attachment()).await;
        }

        // Third failure: advances to completion with a null attachment.
        let out = responses(&services, &identity, &mut session, &attachment()).await;
        assert!(session.is_idle());
        assert!(out
            .iter()
            .any(|r| matches!(r, Response::Confirmation { text } if text.contains("without attachment"))));
    }

    #[tokio::test]
    async fn mime_rejection_does_not_consume_a_retry() {
        let services = services();
        let identity = employee("+1");
        let mut session = Session::new("+1");
        session.start_flow(Intent::ActivityLog, "photo");

        let bad = EventKind::Attachment {
            filename: None,
            mime_type: "video/mp4".into(),
            data_base64: "aGVsbG8=".into(),
        };
        responses(&services, &identity, &mut session, &bad).await;
        assert!(!session.data.scratch.contains_key(UPLOAD_ATTEMPTS_KEY));
    }

    #[tokio::test]
    async fn skip_is_rejected_on_mandatory_steps() {
        let services = services();
        let identity = employee("+1");
        let mut session = Session::new("+1");
        session.start_flow(Intent::ActivityLog, "photo");

        let out = responses(&services, &identity, &mut session, &event("skip")).await;
        assert_eq!(session.step.as_deref(), Some("photo"));
        assert!(matches!(out[0], Response::Failure { .. }));
    }

    #[tokio::test]
    async fn sink_outage_abandons_the_flow_with_an_apology() {
        let services = crate::testutil::services_with(
            vec![("s1", "Riverside")],
            Arc::new(crate::testutil::StubSink::failing()),
            Arc::new(StubAttachmentStore::default()),
        );
        let identity = employee("+1");
        let mut session = Session::new("+1");
        session.start_flow(Intent::Booking, "time_slot");
        session
            .data
            .scratch
            .insert("purpose".into(), json!("site_visit"));
        session
            .data
            .scratch
            .insert("visit_date".into(), json!("2026-09-01"));

        let out = responses(&services, &identity, &mut session, &event("morning")).await;

        // Abandoned, not stuck: back to idle, apology delivered.
        assert!(session.is_idle());
        assert!(session.data.scratch.is_empty());
        assert!(matches!(out[0], Response::Failure { .. }));
    }

    #[test]
    fn exit_keyword_matches_loosely() {
        assert!(is_exit(&event(" EXIT ")));
        assert!(is_exit(&EventKind::Selection { id: "exit".into() }));
        assert!(!is_exit(&event("exit now")));
        assert!(!is_exit(&attachment()));
    }
}
