//! Inventory in/out transactions (employees). No attachment step.

use serde_json::Value;
use sitedesk_protocol::{RecordType, Role, SiteContext};

use super::{Choice, FlowSpec, NextStep, PromptText, StepDef, StepKind};
use crate::records::RecordDraft;
use crate::session::{Intent, Scratch};

const DIRECTIONS: &[Choice] = &[
    Choice {
        id: "in",
        label: "Stock in",
    },
    Choice {
        id: "out",
        label: "Stock out",
    },
];

pub static FLOW: FlowSpec = FlowSpec {
    intent: Intent::InventoryTxn,
    menu_id: "inventory_txn",
    menu_label: "Record inventory movement",
    roles: &[Role::Employee],
    needs_site: true,
    steps: &[
        StepDef {
            name: "direction",
            prompt: PromptText::Fixed("Is stock coming in or going out?"),
            kind: StepKind::Choice(DIRECTIONS),
            next: NextStep::Step("item"),
        },
        StepDef {
            name: "item",
            prompt: PromptText::Fixed("Which item?"),
            kind: StepKind::Text { max_len: 120 },
            next: NextStep::Step("quantity"),
        },
        StepDef {
            name: "quantity",
            prompt: PromptText::Fixed("How many units? (whole number)"),
            kind: StepKind::Quantity {
                decimal: false,
                max: 1_000_000.0,
            },
            next: NextStep::Step("note"),
        },
        StepDef {
            name: "note",
            prompt: PromptText::Fixed("Any note for the register? (supplier, reason, etc.)"),
            kind: StepKind::Text { max_len: 300 },
            next: NextStep::Done,
        },
    ],
    assemble,
    done_text: "Inventory movement recorded.",
};

fn assemble(scratch: &Scratch, site: Option<&SiteContext>) -> RecordDraft {
    let mut draft = RecordDraft::new(RecordType::InventoryTxn, site.cloned());
    for key in ["direction", "item", "quantity", "note"] {
        draft = draft.field(key, scratch.get(key).cloned().unwrap_or(Value::Null));
    }
    draft
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::{handle_flow_event, start_flow, FlowEvent};
    use crate::session::Session;
    use crate::testutil::{employee, services_with, StubAttachmentStore, StubSink};
    use serde_json::json;
    use sitedesk_protocol::{EventKind, Response};
    use std::sync::Arc;

    fn text(body: &str) -> EventKind {
        EventKind::Text {
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn stock_out_run_records_all_fields() {
        let sink = Arc::new(StubSink::default());
        let services = services_with(
            vec![("s1", "Riverside")],
            sink.clone(),
            Arc::new(StubAttachmentStore::default()),
        );
        let mut session = Session::new("+1");
        start_flow(&services, &employee("+1"), &mut session, &FLOW)
            .await
            .unwrap();

        for body in ["out", "Cement bags", "40", "Issued to block B crew"] {
            let result = handle_flow_event(&services, &employee("+1"), &mut session, &text(body))
                .await
                .unwrap();
            assert!(matches!(result, FlowEvent::Responses(_)));
        }

        assert!(session.is_idle());
        let written = sink.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].record_type, RecordType::InventoryTxn);
        assert_eq!(written[0].fields["direction"], "out");
        assert_eq!(written[0].fields["quantity"], json!(40));
    }

    #[tokio::test]
    async fn selection_events_drive_choice_steps() {
        let services = services_with(
            vec![("s1", "Riverside")],
            Arc::new(StubSink::default()),
            Arc::new(StubAttachmentStore::default()),
        );
        let mut session = Session::new("+1");
        start_flow(&services, &employee("+1"), &mut session, &FLOW)
            .await
            .unwrap();

        let result = handle_flow_event(
            &services,
            &employee("+1"),
            &mut session,
            &EventKind::Selection { id: "in".into() },
        )
        .await
        .unwrap();
        match result {
            FlowEvent::Responses(out) => assert!(matches!(out[0], Response::Prompt { .. })),
            FlowEvent::Corrupted => panic!("unexpected corruption"),
        }
        assert_eq!(session.step.as_deref(), Some("item"));
    }
}
