pub mod action;
pub mod config;
pub mod context;
pub mod import;
pub mod migrate;
pub mod orders;
pub mod review;
pub mod rfq;
pub mod seed;

use std::path::PathBuf;

use procura_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use procura_core::errors::{ApplicationError, InterfaceError};
use procura_core::workflow::WorkflowError;
use serde::Serialize;
use serde_json::Value;

/// Options shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub actor: Option<String>,
}

impl GlobalOptions {
    pub fn actor(&self) -> String {
        self.actor.clone().unwrap_or_else(|| "cli".to_string())
    }

    fn load_options(&self) -> LoadOptions {
        LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: ConfigOverrides {
                database_url: self.database_url.clone(),
                ..ConfigOverrides::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

/// `(error_class, message, exit_code)` carried out of a failed command body.
pub type CommandFailure = (&'static str, String, u8);

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, None)
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn from_failure(command: &str, (error_class, message, exit_code): CommandFailure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn load_config(options: &GlobalOptions) -> Result<AppConfig, CommandFailure> {
    AppConfig::load(options.load_options())
        .map_err(|error| ("config_validation", format!("configuration issue: {error}"), 2))
}

/// Runs a command body on a fresh single-threaded runtime and renders its result.
pub(crate) fn execute<F, Fut>(command: &str, options: &GlobalOptions, body: F) -> CommandResult
where
    F: FnOnce(AppConfig) -> Fut,
    Fut: std::future::Future<Output = Result<CommandResult, CommandFailure>>,
{
    let config = match load_config(options) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure(command, failure),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(body(config)) {
        Ok(result) => result,
        Err(failure) => CommandResult::from_failure(command, failure),
    }
}

/// Maps a review failure onto the command error classes and exit codes.
pub(crate) fn workflow_failure(error: WorkflowError) -> CommandFailure {
    let application = ApplicationError::from(error);
    let exit_code = match &application {
        ApplicationError::Configuration(_) => 2,
        ApplicationError::Integration(_) | ApplicationError::Persistence(_) => 7,
        ApplicationError::Domain(_)
        | ApplicationError::Validation(_)
        | ApplicationError::ReadOnly(_) => 8,
    };
    let error_class = application.error_class();
    let interface = InterfaceError::from(application);
    let message = format!("{}. {}", interface.detail(), interface.user_message());
    (error_class, message, exit_code)
}

/// Parses `KEY=VALUE`, trimming both halves.
pub(crate) fn split_pair(raw: &str) -> Result<(String, String), String> {
    let (key, value) =
        raw.split_once('=').ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing key in `{raw}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use procura_core::domain::document::DocumentId;
    use procura_core::workflow::{ReadOnlyNotice, ReadOnlyReason, ValidationError, WorkflowError};
    use procura_core::WorkflowState;
    use serde_json::Value;

    use super::{split_pair, workflow_failure, CommandResult};

    #[test]
    fn failure_payload_carries_error_class_and_no_data() {
        let result = CommandResult::failure("approve", "validation", "nothing selected", 8);
        let payload: Value = serde_json::from_str(&result.output).expect("json");

        assert_eq!(result.exit_code, 8);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "validation");
        assert!(payload.get("data").is_none());
    }

    #[test]
    fn workflow_errors_map_to_stable_classes() {
        let (class, _, code) = workflow_failure(ValidationError::EmptySelection.into());
        assert_eq!((class, code), ("validation", 8));

        let notice = ReadOnlyNotice {
            document_id: DocumentId("PR-1".to_string()),
            workflow_state: WorkflowState::Approved,
            modified_by: Some("lead@example.com".to_string()),
            reason: ReadOnlyReason::StateNotActionable,
        };
        let (class, message, code) = workflow_failure(WorkflowError::ReadOnly(notice));
        assert_eq!((class, code), ("read_only", 8));
        assert!(message.contains("lead@example.com"));

        let (class, message, code) = workflow_failure(WorkflowError::ActionFailed {
            status: Some(409),
            message: "stale".to_string(),
        });
        assert_eq!((class, code), ("integration", 7));
        assert_eq!(
            message,
            "stale. The procurement service is temporarily unavailable. Your selection was kept; please retry."
        );
    }

    #[test]
    fn pairs_are_split_on_the_first_equals_sign() {
        assert_eq!(
            split_pair("CABLE = V-1").expect("pair"),
            ("CABLE".to_string(), "V-1".to_string())
        );
        assert_eq!(
            split_pair("V-1=Acme = Sons").expect("pair"),
            ("V-1".to_string(), "Acme = Sons".to_string())
        );
        assert!(split_pair("CABLE").is_err());
        assert!(split_pair("=V-1").is_err());
    }
}
