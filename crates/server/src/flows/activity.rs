//! Daily work activity logging (employees).

use serde_json::Value;
use sitedesk_protocol::{RecordType, Role, SiteContext};

use super::{Choice, DateRule, FlowSpec, NextStep, PromptText, StepDef, StepKind};
use crate::records::RecordDraft;
use crate::session::{Intent, Scratch};

const ACTIVITIES: &[Choice] = &[
    Choice {
        id: "concreting",
        label: "Concreting",
    },
    Choice {
        id: "masonry",
        label: "Masonry",
    },
    Choice {
        id: "plastering",
        label: "Plastering",
    },
    Choice {
        id: "excavation",
        label: "Excavation",
    },
];

pub static FLOW: FlowSpec = FlowSpec {
    intent: Intent::ActivityLog,
    menu_id: "log_activity",
    menu_label: "Log today's work",
    roles: &[Role::Employee],
    needs_site: true,
    steps: &[
        StepDef {
            name: "activity",
            prompt: PromptText::Fixed("What work was done?"),
            kind: StepKind::Choice(ACTIVITIES),
            next: NextStep::Step("description"),
        },
        StepDef {
            name: "description",
            prompt: PromptText::Fixed("Briefly describe the work."),
            kind: StepKind::Text { max_len: 500 },
            next: NextStep::Step("hours"),
        },
        StepDef {
            name: "hours",
            prompt: PromptText::Fixed("How many hours did it take?"),
            kind: StepKind::Quantity {
                decimal: true,
                max: 24.0,
            },
            next: NextStep::Step("work_date"),
        },
        StepDef {
            name: "work_date",
            prompt: PromptText::Fixed("Which date was this for? (e.g. 'today' or 2026-08-20)"),
            kind: StepKind::Date(DateRule::PastOrToday),
            next: NextStep::Step("photo"),
        },
        StepDef {
            name: "photo",
            prompt: PromptText::Fixed("Please send a photo of the completed work."),
            kind: StepKind::Attachment {
                mandatory: true,
                folder: "activity",
            },
            next: NextStep::Done,
        },
    ],
    assemble,
    done_text: "Work activity logged. Thank you!",
};

fn assemble(scratch: &Scratch, site: Option<&SiteContext>) -> RecordDraft {
    let mut draft = RecordDraft::new(RecordType::Activity, site.cloned());
    for key in ["activity", "description", "hours", "work_date", "photo"] {
        draft = draft.field(key, scratch.get(key).cloned().unwrap_or(Value::Null));
    }
    draft
}
