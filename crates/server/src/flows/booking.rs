//! Site visit bookings (customers).

use serde_json::Value;
use sitedesk_protocol::{RecordType, Role, SiteContext};

use super::{Choice, DateRule, FlowSpec, NextStep, PromptText, StepDef, StepKind};
use crate::records::RecordDraft;
use crate::session::{Intent, Scratch};

const PURPOSES: &[Choice] = &[
    Choice {
        id: "site_visit",
        label: "Site visit",
    },
    Choice {
        id: "measurement",
        label: "Measurement",
    },
    Choice {
        id: "consultation",
        label: "Consultation",
    },
];

pub static FLOW: FlowSpec = FlowSpec {
    intent: Intent::Booking,
    menu_id: "book_visit",
    menu_label: "Book a site visit",
    roles: &[Role::Customer],
    needs_site: true,
    steps: &[
        StepDef {
            name: "purpose",
            prompt: PromptText::Fixed("What is the visit for?"),
            kind: StepKind::Choice(PURPOSES),
            next: NextStep::Step("visit_date"),
        },
        StepDef {
            name: "visit_date",
            prompt: PromptText::Fixed("Which date would you like? (e.g. 'tomorrow' or 2026-09-01)"),
            kind: StepKind::Date(DateRule::Future),
            next: NextStep::Step("time_slot"),
        },
        StepDef {
            name: "time_slot",
            prompt: PromptText::Fixed("What time suits you? (e.g. 'morning' or '3pm')"),
            kind: StepKind::Text { max_len: 60 },
            next: NextStep::Done,
        },
    ],
    assemble,
    done_text: "Visit booked. You will get a confirmation from the site office.",
};

fn assemble(scratch: &Scratch, site: Option<&SiteContext>) -> RecordDraft {
    let mut draft = RecordDraft::new(RecordType::Booking, site.cloned());
    for key in ["purpose", "visit_date", "time_slot"] {
        draft = draft.field(key, scratch.get(key).cloned().unwrap_or(Value::Null));
    }
    draft
}
