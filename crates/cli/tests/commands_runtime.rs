use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use procura_cli::commands::action::{self, SelectionArgs};
use procura_cli::commands::rfq::{self, RfqEdit};
use procura_cli::commands::{config, import, migrate, orders, review, seed, GlobalOptions};
use serde_json::Value;
use tempfile::TempDir;

const CATEGORY_DOC: &str = "PR-DEMO-0001";
const CUSTOM_DOC: &str = "PR-DEMO-0002";

#[test]
fn migrate_returns_success_on_a_fresh_database() {
    with_env(&[], || {
        let (_dir, options) = temp_database();
        let result = migrate::run(&options);
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn invalid_discount_factor_is_a_config_failure() {
    with_env(&[("PROCURA_REVIEW_TARGET_DISCOUNT_FACTOR", "1.5")], || {
        let (_dir, options) = temp_database();
        let result = review::run(&options, CATEGORY_DOC, &SelectionArgs::default());
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "review");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_reports_sources_and_redacts_tokens() {
    with_env(
        &[
            ("PROCURA_GATEWAY_MODE", "remote"),
            ("PROCURA_GATEWAY_BASE_URL", "https://procurement.example.com"),
            ("PROCURA_GATEWAY_API_TOKEN", "prc_live_0123456789"),
        ],
        || {
            let (_dir, options) = temp_database();
            let result = config::run(&options);
            assert_eq!(result.exit_code, 0, "{}", result.output);
            assert!(!result.output.contains("0123456789"), "token must be redacted");

            let payload = parse_payload(&result.output);
            let entries = payload["data"].as_array().expect("entries");
            let entry = |key: &str| {
                entries.iter().find(|entry| entry["key"] == key).cloned().expect("entry present")
            };
            assert_eq!(entry("gateway.mode")["value"], "remote");
            assert_eq!(entry("gateway.mode")["source"], "env (PROCURA_GATEWAY_MODE)");
            assert_eq!(entry("gateway.api_token")["value"], "prc_***");
            assert_eq!(entry("database.url")["source"], "flag (--database-url)");
            assert_eq!(entry("review.history_window")["source"], "default");
        },
    );
}

#[test]
fn seed_loads_the_demo_project() {
    with_env(&[], || {
        let (_dir, options) = temp_database();
        let result = seed::run(&options);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["data"]["documents"][0], CATEGORY_DOC);
        assert_eq!(payload["data"]["documents"][1], CUSTOM_DOC);

        let again = seed::run(&options);
        assert_eq!(again.exit_code, 0, "seeding twice should succeed: {}", again.output);
    });
}

#[test]
fn review_lists_vendor_groups_with_target_rates() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let result = review::run(&options, CATEGORY_DOC, &SelectionArgs::default());
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let data = &payload["data"];
        assert_eq!(data["document"]["pending"], 3);
        assert_eq!(data["document"]["workflow_state"], "Vendor Selected");
        assert!(data["read_only"].is_null());
        assert!(data["target_rate_warning"].is_null());
        assert!(data.get("selection").is_none());

        let groups = data["vendor_groups"].as_array().expect("groups");
        let vendors: Vec<_> = groups.iter().map(|group| group["vendor"]["id"].clone()).collect();
        assert_eq!(vendors, vec!["V-ACME", "V-BOLT", "V-CORE"]);
        assert_eq!(groups[2]["items"].as_array().expect("items").len(), 2);
    });
}

#[test]
fn review_with_a_selection_reports_its_totals() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let selection = SelectionArgs {
            vendors: Vec::new(),
            picks: vec!["CABLE-4SQMM=V-BOLT".to_string(), "DB-8WAY=V-BOLT".to_string()],
        };
        let result = review::run(&options, CATEGORY_DOC, &selection);
        assert_eq!(result.exit_code, 0, "{}", result.output);

        let payload = parse_payload(&result.output);
        let summary = &payload["data"]["selection"];
        assert_eq!(summary["vendor_count"], 1);
        assert_eq!(summary["item_count"], 2);
    });
}

#[test]
fn quotes_persist_between_commands_and_approval_raises_orders() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();

        let edit = RfqEdit::Quote {
            item: "MCB-32A".to_string(),
            vendor: "V-BOLT".to_string(),
            value: "290".to_string(),
        };
        let quoted = rfq::run(&options, CATEGORY_DOC, edit);
        assert_eq!(quoted.exit_code, 0, "{}", quoted.output);

        let review = parse_payload(
            &review::run(&options, CATEGORY_DOC, &SelectionArgs::default()).output,
        );
        let bolt = review["data"]["vendor_groups"]
            .as_array()
            .expect("groups")
            .iter()
            .find(|group| group["vendor"]["id"] == "V-BOLT")
            .cloned()
            .expect("bolt group");
        assert_eq!(bolt["items"].as_array().expect("items").len(), 3);

        let first = action::approve(
            &options,
            CATEGORY_DOC,
            &SelectionArgs { vendors: Vec::new(), picks: vec!["CABLE-4SQMM=V-BOLT".to_string()] },
        );
        assert_eq!(first.exit_code, 0, "{}", first.output);
        let outcome = &parse_payload(&first.output)["data"]["outcome"];
        assert_eq!(outcome["processed"], 1);
        assert_eq!(outcome["remaining_pending"], 2);
        assert_eq!(outcome["navigation"], "stay");

        let second = action::approve(
            &options,
            CATEGORY_DOC,
            &SelectionArgs { vendors: vec!["V-CORE".to_string()], picks: Vec::new() },
        );
        assert_eq!(second.exit_code, 0, "{}", second.output);
        let outcome = &parse_payload(&second.output)["data"]["outcome"];
        assert_eq!(outcome["remaining_pending"], 0);
        assert_eq!(outcome["navigation"], "leave");

        let listed = orders::run(&options, CATEGORY_DOC);
        assert_eq!(listed.exit_code, 0, "{}", listed.output);
        let payload = parse_payload(&listed.output);
        assert_eq!(payload["data"]["orders"].as_array().expect("orders").len(), 2);
    });
}

#[test]
fn approving_nothing_is_a_validation_failure() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let result = action::approve(&options, CATEGORY_DOC, &SelectionArgs::default());
        assert_eq!(result.exit_code, 8);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "approve");
        assert_eq!(payload["error_class"], "validation");
    });
}

#[test]
fn an_item_picked_under_two_vendors_is_refused() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let selection = SelectionArgs {
            vendors: Vec::new(),
            picks: vec!["CABLE-4SQMM=V-ACME".to_string(), "CABLE-4SQMM=V-BOLT".to_string()],
        };
        let result = action::approve(&options, CATEGORY_DOC, &selection);
        assert_eq!(result.exit_code, 8, "{}", result.output);
        assert_eq!(parse_payload(&result.output)["error_class"], "validation");

        let orders = parse_payload(&orders::run(&options, CATEGORY_DOC).output);
        assert!(orders["data"]["orders"].as_array().expect("orders").is_empty());
    });
}

#[test]
fn custom_send_back_rejects_the_document_and_makes_it_read_only() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let result = action::send_back(
            &options,
            CUSTOM_DOC,
            &SelectionArgs::default(),
            Some("vendor list is outdated".to_string()),
        );
        assert_eq!(result.exit_code, 0, "{}", result.output);
        let outcome = &parse_payload(&result.output)["data"]["outcome"];
        assert_eq!(outcome["navigation"], "leave");

        let review = parse_payload(
            &review::run(&options, CUSTOM_DOC, &SelectionArgs::default()).output,
        );
        assert_eq!(review["data"]["document"]["workflow_state"], "Rejected");
        assert!(!review["data"]["read_only"].is_null());

        let again = action::send_back(&options, CUSTOM_DOC, &SelectionArgs::default(), None);
        assert_eq!(again.exit_code, 8);
        assert_eq!(parse_payload(&again.output)["error_class"], "read_only");
    });
}

#[test]
fn imported_documents_can_be_reviewed() {
    with_env(&[], || {
        let (dir, options) = temp_database();
        let path = dir.path().join("request.json");
        let document = procura_db::fixtures::demo_custom_document();
        let mut value = serde_json::to_value(&document).expect("encode");
        value["id"] = Value::String("PR-IMPORT-1".to_string());
        fs::write(&path, value.to_string()).expect("write document");

        let imported = import::run(&options, &path);
        assert_eq!(imported.exit_code, 0, "{}", imported.output);
        assert_eq!(parse_payload(&imported.output)["data"]["pending"], 1);

        let review = review::run(&options, "PR-IMPORT-1", &SelectionArgs::default());
        assert_eq!(review.exit_code, 0, "{}", review.output);
        let payload = parse_payload(&review.output);
        assert_eq!(payload["data"]["vendor_groups"][0]["vendor"]["id"], "V-BOLT");
    });
}

#[test]
fn unknown_documents_surface_as_integration_failures() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let result = review::run(&options, "PR-MISSING", &SelectionArgs::default());
        assert_eq!(result.exit_code, 7, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "integration");
        let message = payload["message"].as_str().expect("message");
        assert!(message.starts_with("document `PR-MISSING` was not found."), "{message}");
        assert!(message.ends_with("please retry."), "{message}");
    });
}

#[test]
fn an_unknown_vendor_flag_is_named_in_the_failure() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let selection = SelectionArgs { vendors: vec!["V-TYPO".to_string()], picks: Vec::new() };

        let result = action::approve(&options, CATEGORY_DOC, &selection);
        assert_eq!(result.exit_code, 8, "{}", result.output);
        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "validation");
        assert!(payload["message"].as_str().expect("message").contains("V-TYPO"));
    });
}

#[test]
fn sent_back_items_are_approved_after_the_rfq_is_submitted() {
    with_env(&[], || {
        let (_dir, options) = seeded_database();
        let returned = SelectionArgs { vendors: Vec::new(), picks: vec!["DB-8WAY=V-CORE".to_string()] };
        let sent_back = action::send_back(&options, CATEGORY_DOC, &returned, None);
        assert_eq!(sent_back.exit_code, 0, "{}", sent_back.output);

        let sent_back_doc = format!("{CATEGORY_DOC}-SB1");
        let early = action::approve(&options, &sent_back_doc, &returned);
        assert_eq!(early.exit_code, 8, "{}", early.output);
        assert_eq!(parse_payload(&early.output)["error_class"], "read_only");

        let submitted = action::submit_rfq(&options, &sent_back_doc);
        assert_eq!(submitted.exit_code, 0, "{}", submitted.output);
        let payload = parse_payload(&submitted.output);
        assert_eq!(payload["command"], "submit");
        assert_eq!(payload["data"]["review"]["document"]["workflow_state"], "Vendor Selected");

        let approved = action::approve(&options, &sent_back_doc, &returned);
        assert_eq!(approved.exit_code, 0, "{}", approved.output);
        assert_eq!(parse_payload(&approved.output)["data"]["outcome"]["navigation"], "leave");
    });
}

fn temp_database() -> (TempDir, GlobalOptions) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("procura.db").display());
    let options = GlobalOptions {
        config_path: None,
        database_url: Some(url),
        actor: Some("approver@example.com".to_string()),
    };
    (dir, options)
}

fn seeded_database() -> (TempDir, GlobalOptions) {
    let (dir, options) = temp_database();
    let result = seed::run(&options);
    assert_eq!(result.exit_code, 0, "seed failed: {}", result.output);
    (dir, options)
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    let keys = [
        "PROCURA_DATABASE_URL",
        "PROCURA_DATABASE_MAX_CONNECTIONS",
        "PROCURA_DATABASE_TIMEOUT_SECS",
        "PROCURA_GATEWAY_MODE",
        "PROCURA_GATEWAY_BASE_URL",
        "PROCURA_GATEWAY_API_TOKEN",
        "PROCURA_GATEWAY_TIMEOUT_SECS",
        "PROCURA_REVIEW_TARGET_DISCOUNT_FACTOR",
        "PROCURA_REVIEW_HISTORY_WINDOW",
        "PROCURA_LOGGING_LEVEL",
        "PROCURA_LOGGING_FORMAT",
        "PROCURA_LOG_LEVEL",
        "PROCURA_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
