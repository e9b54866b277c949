pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use procura_core::config::{AppConfig, LoggingConfig};
use tracing_subscriber::EnvFilter;

use commands::action::SelectionArgs;
use commands::rfq::RfqEdit;
use commands::GlobalOptions;

#[derive(Debug, Parser)]
#[command(
    name = "procura",
    about = "Procura procurement review CLI",
    long_about = "Review vendor quotes on procurement documents, then approve or send back the selected items.",
    after_help = "Examples:\n  procura seed\n  procura review PR-DEMO-0001\n  procura submit PR-DEMO-0001-SB1\n  procura approve PR-DEMO-0001 --pick CABLE-4SQMM=V-BOLT"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (defaults to procura.toml or config/procura.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Override database.url")]
    database_url: Option<String>,
    #[arg(long, global = true, help = "Name recorded on audit events and changed documents")]
    actor: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Selection {
    #[arg(long = "vendor", value_name = "VENDOR", help = "Select every listed item of a vendor")]
    vendors: Vec<String>,
    #[arg(long = "pick", value_name = "ITEM=VENDOR", help = "Select one item under a vendor")]
    picks: Vec<String>,
}

impl From<Selection> for SelectionArgs {
    fn from(value: Selection) -> Self {
        Self { vendors: value.vendors, picks: value.picks }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Load the demo project with quotes and approved-quote history")]
    Seed,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Store a procurement document from a JSON file")]
    Import { path: PathBuf },
    #[command(about = "Show vendor groups, target rates and savings for a document")]
    Review {
        document: String,
        #[command(flatten)]
        selection: Selection,
    },
    #[command(about = "Replace the vendors invited to quote (ID=Name, repeatable)")]
    Vendors {
        document: String,
        #[arg(long = "vendor", value_name = "ID=NAME", required = true)]
        vendors: Vec<String>,
    },
    #[command(about = "Record a vendor's unit quote for an item; an empty value clears it")]
    Quote {
        document: String,
        #[arg(long)]
        item: String,
        #[arg(long)]
        vendor: String,
        #[arg(long, allow_hyphen_values = true)]
        value: String,
    },
    #[command(about = "Record the make/brand a vendor offers for an item")]
    Make {
        document: String,
        #[arg(long)]
        item: String,
        #[arg(long)]
        vendor: String,
        #[arg(long, help = "Omit to clear")]
        make: Option<String>,
    },
    #[command(about = "Remove a vendor and its quotes from the RFQ")]
    RemoveVendor {
        document: String,
        #[arg(long)]
        vendor: String,
    },
    #[command(about = "Publish the RFQ and put the document up for approval")]
    Submit { document: String },
    #[command(about = "Approve the selected items at the chosen vendors' quotes")]
    Approve {
        document: String,
        #[command(flatten)]
        selection: Selection,
    },
    #[command(about = "Send back the selected items, or the whole document when it is custom")]
    SendBack {
        document: String,
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        comment: Option<String>,
    },
    #[command(about = "List purchase orders raised for a document")]
    Orders { document: String },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = GlobalOptions {
        config_path: cli.config,
        database_url: cli.database_url,
        actor: cli.actor,
    };

    let logging = commands::load_config(&options)
        .map(|config| config.logging)
        .unwrap_or_else(|_| AppConfig::default().logging);
    init_logging(&logging);

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Seed => commands::seed::run(&options),
        Command::Config => commands::config::run(&options),
        Command::Import { path } => commands::import::run(&options, &path),
        Command::Review { document, selection } => {
            commands::review::run(&options, &document, &selection.into())
        }
        Command::Vendors { document, vendors } => {
            commands::rfq::run(&options, &document, RfqEdit::Vendors(vendors))
        }
        Command::Quote { document, item, vendor, value } => {
            commands::rfq::run(&options, &document, RfqEdit::Quote { item, vendor, value })
        }
        Command::Make { document, item, vendor, make } => {
            commands::rfq::run(&options, &document, RfqEdit::Make { item, vendor, make })
        }
        Command::RemoveVendor { document, vendor } => {
            commands::rfq::run(&options, &document, RfqEdit::RemoveVendor(vendor))
        }
        Command::Submit { document } => commands::action::submit_rfq(&options, &document),
        Command::Approve { document, selection } => {
            commands::action::approve(&options, &document, &selection.into())
        }
        Command::SendBack { document, selection, comment } => {
            commands::action::send_back(&options, &document, &selection.into(), comment)
        }
        Command::Orders { document } => commands::orders::run(&options, &document),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Logs go to stderr so stdout stays a single JSON document. `RUST_LOG` wins over the
/// configured level when set.
fn init_logging(logging: &LoggingConfig) {
    use procura_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let installed = match logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
