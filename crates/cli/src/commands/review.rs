use procura_core::config::AppConfig;
use procura_core::workflow::ReviewSession;
use serde_json::{json, Value};

use super::action::{apply_selection, SelectionArgs};
use super::context::ReviewContext;
use super::{execute, CommandFailure, CommandResult, GlobalOptions};

pub fn run(options: &GlobalOptions, document_id: &str, selection: &SelectionArgs) -> CommandResult {
    execute("review", options, |config| {
        review(config, options.actor(), document_id, selection)
    })
}

async fn review(
    config: AppConfig,
    actor: String,
    document_id: &str,
    selection: &SelectionArgs,
) -> Result<CommandResult, CommandFailure> {
    let context = ReviewContext::build(&config, actor).await?;
    let outcome = inspect(&context, document_id, selection).await;
    context.close().await;
    outcome
}

async fn inspect(
    context: &ReviewContext,
    document_id: &str,
    selection: &SelectionArgs,
) -> Result<CommandResult, CommandFailure> {
    let mut session = context.open(document_id).await?;
    apply_selection(&mut session, selection)?;

    let data = snapshot(&session, !selection.is_empty());
    let message = match session.read_only_notice() {
        Some(notice) => notice.message(),
        None => format!(
            "{} pending item(s) awaiting a vendor decision",
            session.document().pending_count()
        ),
    };
    Ok(CommandResult::success_with_data("review", message, Some(data)))
}

/// The review screen as data: document header, vendor groups and, when something is
/// staged, the selection totals.
pub(crate) fn snapshot(session: &ReviewSession, with_selection: bool) -> Value {
    let document = session.document();
    let groups = session.vendor_groups();
    let mut data = json!({
        "document": {
            "id": document.id,
            "project_id": document.project_id,
            "kind": document.kind,
            "category": document.category,
            "workflow_state": document.workflow_state,
            "modified_by": document.modified_by,
            "pending": document.pending_count(),
        },
        "read_only": session.read_only_notice(),
        "target_rate_warning": session.target_rate_warning(),
        "vendor_groups": groups.as_slice(),
    });
    if with_selection {
        data["selection"] = json!(session.selection_summary());
    }
    data
}
