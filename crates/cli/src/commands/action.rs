use procura_core::config::AppConfig;
use procura_core::domain::document::ItemId;
use procura_core::domain::vendor::VendorId;
use procura_core::workflow::{ActionOutcome, ReviewAction, ReviewSession};
use serde_json::json;
use tracing::info;

use super::context::ReviewContext;
use super::review::snapshot;
use super::{execute, split_pair, workflow_failure, CommandFailure, CommandResult, GlobalOptions};

/// Rows staged from the command line: whole vendor groups and single item/vendor pairs.
#[derive(Debug, Clone, Default)]
pub struct SelectionArgs {
    pub vendors: Vec<String>,
    pub picks: Vec<String>,
}

impl SelectionArgs {
    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty() && self.picks.is_empty()
    }
}

pub(crate) fn apply_selection(
    session: &mut ReviewSession,
    selection: &SelectionArgs,
) -> Result<(), CommandFailure> {
    for vendor in &selection.vendors {
        let vendor_id = VendorId(vendor.trim().to_string());
        if session.vendor_group(&vendor_id).is_none() {
            return Err((
                "validation",
                format!("vendor `{vendor_id}` is not listed against any pending item"),
                8,
            ));
        }
        session.toggle_vendor(&vendor_id, true);
    }
    for pick in &selection.picks {
        let (item_id, vendor_id) =
            split_pair(pick).map_err(|message| ("validation", message, 8u8))?;
        session
            .toggle_item(&VendorId(vendor_id), &ItemId(item_id), true)
            .map_err(workflow_failure)?;
    }
    Ok(())
}

pub fn approve(
    options: &GlobalOptions,
    document_id: &str,
    selection: &SelectionArgs,
) -> CommandResult {
    execute("approve", options, |config| {
        submit(config, options.actor(), document_id, selection, ReviewAction::Approve, None)
    })
}

pub fn send_back(
    options: &GlobalOptions,
    document_id: &str,
    selection: &SelectionArgs,
    comment: Option<String>,
) -> CommandResult {
    execute("send-back", options, |config| {
        submit(config, options.actor(), document_id, selection, ReviewAction::SendBack, comment)
    })
}

/// Publishes the working RFQ so the document can be approved.
pub fn submit_rfq(options: &GlobalOptions, document_id: &str) -> CommandResult {
    let selection = SelectionArgs::default();
    execute("submit", options, |config| {
        submit(config, options.actor(), document_id, &selection, ReviewAction::SubmitRfq, None)
    })
}

async fn submit(
    config: AppConfig,
    actor: String,
    document_id: &str,
    selection: &SelectionArgs,
    action: ReviewAction,
    comment: Option<String>,
) -> Result<CommandResult, CommandFailure> {
    let context = ReviewContext::build(&config, actor).await?;
    let outcome = decide(&context, document_id, selection, action, comment).await;
    context.close().await;
    outcome
}

async fn decide(
    context: &ReviewContext,
    document_id: &str,
    selection: &SelectionArgs,
    action: ReviewAction,
    comment: Option<String>,
) -> Result<CommandResult, CommandFailure> {
    let command = match action {
        ReviewAction::Approve => "approve",
        ReviewAction::SendBack => "send-back",
        ReviewAction::SubmitRfq => "submit",
    };
    let mut session = context.open(document_id).await?;
    apply_selection(&mut session, selection)?;
    session.open_dialog(action).map_err(workflow_failure)?;

    let result = match action {
        ReviewAction::Approve => session.approve().await,
        ReviewAction::SendBack => session.send_back(comment).await,
        ReviewAction::SubmitRfq => session.submit_rfq().await,
    };
    let outcome = result.map_err(workflow_failure)?;

    info!(
        event_name = "cli.action.completed",
        document_id = %document_id,
        correlation_id = %context.correlation_id,
        action = action.as_str(),
        processed = outcome.processed,
        remaining = outcome.remaining_pending,
        "review action completed"
    );

    let data = json!({
        "outcome": outcome,
        "review": snapshot(&session, false),
    });
    Ok(CommandResult::success_with_data(command, summary_line(&outcome), Some(data)))
}

fn summary_line(outcome: &ActionOutcome) -> String {
    let mut line = match outcome.action {
        ReviewAction::Approve | ReviewAction::SendBack => {
            let verb = if outcome.action == ReviewAction::Approve { "approved" } else { "sent back" };
            format!(
                "{verb} {} item(s); {} of {} still pending",
                outcome.processed, outcome.remaining_pending, outcome.pending_before
            )
        }
        ReviewAction::SubmitRfq => {
            format!("submitted the RFQ; {} item(s) up for approval", outcome.remaining_pending)
        }
    };
    if !outcome.refreshed {
        line.push_str(" (document could not be reloaded)");
    }
    line
}
