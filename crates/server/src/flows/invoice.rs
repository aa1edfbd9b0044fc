//! Invoice tracking (customers). Optional scan of the invoice.

use serde_json::Value;
use sitedesk_protocol::{RecordType, Role, SiteContext};

use super::{DateRule, FlowSpec, NextStep, PromptText, StepDef, StepKind};
use crate::records::RecordDraft;
use crate::session::{Intent, Scratch};

pub static FLOW: FlowSpec = FlowSpec {
    intent: Intent::InvoiceTrack,
    menu_id: "track_invoice",
    menu_label: "Track an invoice",
    roles: &[Role::Customer],
    needs_site: true,
    steps: &[
        StepDef {
            name: "invoice_number",
            prompt: PromptText::Fixed("What is the invoice number?"),
            kind: StepKind::Text { max_len: 60 },
            next: NextStep::Step("amount"),
        },
        StepDef {
            name: "amount",
            prompt: PromptText::Fixed("What is the invoice amount?"),
            kind: StepKind::Quantity {
                decimal: true,
                max: 10_000_000.0,
            },
            next: NextStep::Step("vendor"),
        },
        StepDef {
            name: "vendor",
            prompt: PromptText::Fixed("Who issued the invoice?"),
            kind: StepKind::Text { max_len: 120 },
            next: NextStep::Step("invoice_date"),
        },
        StepDef {
            name: "invoice_date",
            prompt: PromptText::Fixed("What date is on the invoice?"),
            kind: StepKind::Date(DateRule::PastOrToday),
            next: NextStep::Step("attachment"),
        },
        StepDef {
            name: "attachment",
            prompt: PromptText::Fixed("Optionally attach a scan of the invoice, or type 'skip'."),
            kind: StepKind::Attachment {
                mandatory: false,
                folder: "invoices",
            },
            next: NextStep::Done,
        },
    ],
    assemble,
    done_text: "Invoice recorded for tracking.",
};

fn assemble(scratch: &Scratch, site: Option<&SiteContext>) -> RecordDraft {
    let mut draft = RecordDraft::new(RecordType::Invoice, site.cloned());
    for key in [
        "invoice_number",
        "amount",
        "vendor",
        "invoice_date",
        "attachment",
    ] {
        draft = draft.field(key, scratch.get(key).cloned().unwrap_or(Value::Null));
    }
    draft
}
