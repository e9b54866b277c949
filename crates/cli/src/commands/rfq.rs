use procura_core::config::AppConfig;
use procura_core::domain::document::ItemId;
use procura_core::domain::vendor::{VendorId, VendorRef};
use procura_core::workflow::ReviewSession;
use serde_json::json;

use super::context::ReviewContext;
use super::{execute, split_pair, workflow_failure, CommandFailure, CommandResult, GlobalOptions};

/// One edit to the working quote matrix. Every edit is written to the document's draft.
#[derive(Debug, Clone)]
pub enum RfqEdit {
    Vendors(Vec<String>),
    Quote { item: String, vendor: String, value: String },
    Make { item: String, vendor: String, make: Option<String> },
    RemoveVendor(String),
}

impl RfqEdit {
    fn command(&self) -> &'static str {
        match self {
            Self::Vendors(_) => "vendors",
            Self::Quote { .. } => "quote",
            Self::Make { .. } => "make",
            Self::RemoveVendor(_) => "remove-vendor",
        }
    }
}

pub fn run(options: &GlobalOptions, document_id: &str, edit: RfqEdit) -> CommandResult {
    execute(edit.command(), options, |config| {
        edit_matrix(config, options.actor(), document_id, edit)
    })
}

async fn edit_matrix(
    config: AppConfig,
    actor: String,
    document_id: &str,
    edit: RfqEdit,
) -> Result<CommandResult, CommandFailure> {
    let context = ReviewContext::build(&config, actor).await?;
    let outcome = apply(&context, document_id, edit).await;
    context.close().await;
    outcome
}

async fn apply(
    context: &ReviewContext,
    document_id: &str,
    edit: RfqEdit,
) -> Result<CommandResult, CommandFailure> {
    let command = edit.command();
    let mut session = context.open(document_id).await?;

    let message = match edit {
        RfqEdit::Vendors(raw) => {
            let vendors = parse_vendors(&raw)?;
            let count = vendors.len();
            session.set_vendors(vendors).await;
            format!("{count} vendor(s) invited")
        }
        RfqEdit::Quote { item, vendor, value } => {
            session
                .set_quote(&ItemId(item.clone()), &VendorId(vendor.clone()), &value)
                .await
                .map_err(workflow_failure)?;
            format!("quote for {item} from {vendor} updated")
        }
        RfqEdit::Make { item, vendor, make } => {
            session
                .set_make(&ItemId(item.clone()), &VendorId(vendor.clone()), make)
                .await
                .map_err(workflow_failure)?;
            format!("make for {item} from {vendor} updated")
        }
        RfqEdit::RemoveVendor(vendor) => {
            session.remove_vendor(&VendorId(vendor.clone())).await.map_err(workflow_failure)?;
            format!("vendor {vendor} removed")
        }
    };

    Ok(CommandResult::success_with_data(command, message, Some(matrix_payload(&session))))
}

fn matrix_payload(session: &ReviewSession) -> serde_json::Value {
    json!({
        "document_id": session.document().id,
        "matrix_version": session.matrix_version(),
        "rfq": session.rfq().as_ref(),
    })
}

/// `ID=Name` pairs; a bare `ID` is accepted and displays as its id.
fn parse_vendors(raw: &[String]) -> Result<Vec<VendorRef>, CommandFailure> {
    raw.iter()
        .map(|entry| {
            if entry.contains('=') {
                let (id, name) =
                    split_pair(entry).map_err(|message| ("validation", message, 8u8))?;
                Ok(VendorRef::new(id, name))
            } else if entry.trim().is_empty() {
                Err(("validation", "vendor id must not be empty".to_string(), 8u8))
            } else {
                Ok(VendorRef::new(entry.trim(), ""))
            }
        })
        .collect()
}
