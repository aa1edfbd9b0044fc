//! Material requests (employees).
//!
//! The only branching flow: ready-mix concrete needs a mix grade before
//! the quantity, and the quantity's unit and bounds depend on the
//! category picked earlier.

use serde_json::{json, Value};
use sitedesk_protocol::{RecordType, Role, SiteContext};

use super::{parse, Choice, FlowSpec, NextStep, PromptText, StepDef, StepKind};
use crate::records::RecordDraft;
use crate::session::{Intent, Scratch};

const CATEGORIES: &[Choice] = &[
    Choice {
        id: "rmc",
        label: "Ready-mix concrete",
    },
    Choice {
        id: "steel",
        label: "Steel",
    },
    Choice {
        id: "bricks",
        label: "Bricks",
    },
    Choice {
        id: "sand",
        label: "Sand",
    },
];

const MIXES: &[Choice] = &[
    Choice {
        id: "m20",
        label: "M20",
    },
    Choice {
        id: "m25",
        label: "M25",
    },
    Choice {
        id: "m30",
        label: "M30",
    },
];

pub static FLOW: FlowSpec = FlowSpec {
    intent: Intent::MaterialRequest,
    menu_id: "request_material",
    menu_label: "Request material",
    roles: &[Role::Employee],
    needs_site: true,
    steps: &[
        StepDef {
            name: "category",
            prompt: PromptText::Fixed("What material do you need?"),
            kind: StepKind::Choice(CATEGORIES),
            next: NextStep::Branch(after_category),
        },
        StepDef {
            name: "mix",
            prompt: PromptText::Fixed("Which concrete grade?"),
            kind: StepKind::Choice(MIXES),
            next: NextStep::Step("quantity"),
        },
        StepDef {
            name: "quantity",
            prompt: PromptText::Dynamic(quantity_prompt),
            kind: StepKind::Custom {
                validate: validate_quantity,
            },
            next: NextStep::Step("delivery"),
        },
        StepDef {
            name: "delivery",
            prompt: PromptText::Fixed("When and where should it be delivered?"),
            kind: StepKind::Text { max_len: 300 },
            next: NextStep::Step("attachment"),
        },
        StepDef {
            name: "attachment",
            prompt: PromptText::Fixed(
                "Optionally attach a drawing or requisition, or type 'skip'.",
            ),
            kind: StepKind::Attachment {
                mandatory: false,
                folder: "material",
            },
            next: NextStep::Done,
        },
    ],
    assemble,
    done_text: "Material request submitted. The site office will confirm shortly.",
};

fn category(scratch: &Scratch) -> &str {
    scratch
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn after_category(scratch: &Scratch) -> &'static str {
    if category(scratch) == "rmc" {
        "mix"
    } else {
        "quantity"
    }
}

/// Unit a category is ordered in. Bricks are counted, everything else
/// is measured.
fn unit_for(category: &str) -> &'static str {
    match category {
        "steel" => "tons",
        "bricks" => "pieces",
        _ => "cubic_meters",
    }
}

fn quantity_prompt(scratch: &Scratch) -> String {
    let unit = match unit_for(category(scratch)) {
        "tons" => "tons",
        "pieces" => "pieces (whole number)",
        _ => "cubic meters",
    };
    format!("How much do you need, in {unit}?")
}

fn validate_quantity(scratch: &Scratch, text: &str) -> Result<Value, String> {
    let (decimal, max) = match unit_for(category(scratch)) {
        "tons" => (true, 500.0),
        "pieces" => (false, 100_000.0),
        _ => (true, 1_000.0),
    };
    let value = parse::parse_quantity(text, decimal, max)?;
    if decimal {
        serde_json::Number::from_f64(value)
            .map(Value::Number)
            .ok_or_else(|| "Quantity must be a positive number.".to_string())
    } else {
        Ok(json!(value as i64))
    }
}

fn material_name(scratch: &Scratch) -> String {
    match category(scratch) {
        "rmc" => {
            let mix = scratch
                .get("mix")
                .and_then(Value::as_str)
                .unwrap_or("unspecified");
            format!("RMC {} concrete", mix.to_ascii_uppercase())
        }
        "steel" => "Steel".to_string(),
        "bricks" => "Bricks".to_string(),
        "sand" => "Sand".to_string(),
        other => other.to_string(),
    }
}

fn assemble(scratch: &Scratch, site: Option<&SiteContext>) -> RecordDraft {
    let mut draft = RecordDraft::new(RecordType::MaterialRequest, site.cloned())
        .field("material", Value::String(material_name(scratch)))
        .field("unit", Value::String(unit_for(category(scratch)).into()));
    for key in ["quantity", "delivery", "attachment"] {
        draft = draft.field(key, scratch.get(key).cloned().unwrap_or(Value::Null));
    }
    draft
}
