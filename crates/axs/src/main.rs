//! axs - accessibility settings from the command line
//!
//! Every command prints one `{success, data?, error?}` JSON document on
//! stdout. Logs go to stderr, filtered by `AXS_LOG` (default `warn`).

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use axsettings_core::prelude::*;
use axsettings_core::tree;
use axsettings_dispatch::prelude::*;
use axsettings_dispatch::system_settings::BUNDLE_ID;

#[derive(Parser)]
#[command(name = "axs")]
#[command(about = "Apply and capture OS accessibility settings through the accessibility tree")]
#[command(version)]
struct Cli {
    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check or request accessibility permission
    Permissions {
        #[arg(long)]
        request: bool,
    },
    /// Dump the accessibility tree of a running application
    Tree {
        #[arg(short, long, default_value = BUNDLE_ID)]
        bundle: String,
        #[arg(short, long, default_value = "15")]
        depth: usize,
    },
    /// Find an element by selector (e.g. "checkbox#AX_INCREASE_CONTRAST")
    Find {
        selector: String,
        #[arg(short, long, default_value = BUNDLE_ID)]
        bundle: String,
        #[arg(short, long, default_value = "5000")]
        timeout: u64,
    },
    /// Open a System Settings pane ("display", "accessibility/zoom", ...)
    Navigate {
        view: SettingsView,
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// List the settings a catalog knows about
    Keys {
        /// Catalog file; the built-in accessibility catalog when omitted
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
    /// Set one setting, skipping the change when it is already in place
    Apply {
        key: SettingKey,
        value: String,
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Read the current value of one or more settings
    Capture {
        #[arg(required = true)]
        keys: Vec<SettingKey>,
        #[arg(short, long)]
        catalog: Option<PathBuf>,
        /// Keep values equal to the declared default
        #[arg(long)]
        defaults: bool,
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

// ── Output ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Output<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Error>,
}

impl<T: Serialize> Output<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    fn err(e: Error) -> Output<()> {
        Output { success: false, data: None, error: Some(e) }
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error: failed to encode output: {}", e),
    }
}

#[derive(Serialize)]
struct PermissionStatus {
    accessibility: bool,
    requested: bool,
}

#[derive(Serialize)]
struct NavigateOutput {
    view: SettingsView,
    #[serde(skip_serializing_if = "Option::is_none")]
    window: Option<String>,
    closed: Vec<String>,
}

#[derive(Serialize)]
struct ApplyOutput {
    key: SettingKey,
    value: SettingValue,
    outcome: ApplyOutcome,
}

// ── Main ────────────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match load_automation(cli.config.as_deref()) {
        Ok(automation) => match cli.command {
            Commands::Permissions { request } => cmd_permissions(&automation, request),
            Commands::Tree { bundle, depth } => cmd_tree(&automation, &bundle, depth),
            Commands::Find { selector, bundle, timeout } => {
                cmd_find(&automation, &selector, &bundle, timeout)
            }
            Commands::Navigate { view, timeout } => cmd_navigate(&automation, view, timeout).await,
            Commands::Keys { catalog } => cmd_keys(catalog.as_deref()),
            Commands::Apply { key, value, catalog, timeout } => {
                cmd_apply(automation, catalog.as_deref(), &key, &value, timeout).await
            }
            Commands::Capture { keys, catalog, defaults, timeout } => {
                cmd_capture(automation, catalog.as_deref(), &keys, defaults, timeout).await
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "command failed");
        print_json(&Output::<()>::err(Error::from(e)));
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_env("AXS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_automation(config: Option<&Path>) -> Result<Automation> {
    let automation = Automation::native();
    Ok(match config {
        Some(path) => automation.with_config(EngineConfig::from_file(path)?),
        None => automation,
    })
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    Ok(match path {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::builtin()?,
    })
}

fn deadline(automation: &Automation, timeout: Option<u64>) -> Deadline {
    match timeout {
        Some(ms) => Deadline::after_ms(ms),
        None => automation.config().default_deadline(),
    }
}

// ── Inspection ──────────────────────────────────────────────────────────────

fn cmd_permissions(automation: &Automation, request: bool) -> Result<()> {
    let accessibility = if request {
        automation.request_authorization()
    } else {
        automation.is_trusted()
    };
    print_json(&Output::ok(PermissionStatus { accessibility, requested: request }));
    Ok(())
}

fn cmd_tree(automation: &Automation, bundle: &str, depth: usize) -> Result<()> {
    automation.ensure_authorized()?;
    let app = AutomationApp::attach(automation, bundle)?;
    let snapshot = tree::snapshot(&app.element()?, depth);
    print_json(&Output::ok(snapshot));
    Ok(())
}

fn cmd_find(automation: &Automation, selector: &str, bundle: &str, timeout: u64) -> Result<()> {
    automation.ensure_authorized()?;
    let app = AutomationApp::attach(automation, bundle)?;
    let el = Locator::parse(app.element()?, selector)?
        .depth(automation.config().search_depth)
        .wait_blocking(Deadline::after_ms(timeout))?;
    print_json(&Output::ok(el.info()));
    Ok(())
}

// ── Settings ────────────────────────────────────────────────────────────────

async fn cmd_navigate(
    automation: &Automation,
    view: SettingsView,
    timeout: Option<u64>,
) -> Result<()> {
    let mut session = AutomationSession::begin(automation);
    let pane = SystemSettings::open(view, &mut session, deadline(automation, timeout)).await?;
    let window = pane.window().title();
    // Only closes System Settings if this command launched it.
    let closed = session.end()?;
    print_json(&Output::ok(NavigateOutput { view, window, closed }));
    Ok(())
}

fn cmd_keys(catalog: Option<&Path>) -> Result<()> {
    let catalog = load_catalog(catalog)?;
    print_json(&Output::ok(catalog.entries()));
    Ok(())
}

async fn cmd_apply(
    automation: Automation,
    catalog: Option<&Path>,
    key: &SettingKey,
    raw: &str,
    timeout: Option<u64>,
) -> Result<()> {
    let deadline = deadline(&automation, timeout);
    let dispatcher = load_catalog(catalog)?.into_dispatcher(automation)?;
    let setting = dispatcher
        .get(key)
        .ok_or_else(|| unknown_key(&dispatcher, key))?;
    let value = SettingValue::parse(setting.value_type, raw)?;
    let outcome = dispatcher.apply(key, &value, deadline).await?;
    print_json(&Output::ok(ApplyOutput { key: key.clone(), value, outcome }));
    Ok(())
}

async fn cmd_capture(
    automation: Automation,
    catalog: Option<&Path>,
    keys: &[SettingKey],
    defaults: bool,
    timeout: Option<u64>,
) -> Result<()> {
    let deadline = deadline(&automation, timeout);
    let dispatcher = load_catalog(catalog)?.into_dispatcher(automation)?;
    if let Some(key) = keys.iter().find(|k| dispatcher.get(k).is_none()) {
        return Err(unknown_key(&dispatcher, key).into());
    }
    let report = dispatcher.capture_batch(keys, defaults, deadline).await;
    print_json(&Output::ok(report));
    Ok(())
}

fn unknown_key(dispatcher: &SettingsDispatcher, key: &SettingKey) -> Error {
    let suggestions = dispatcher
        .keys()
        .filter(|k| k.namespace == key.namespace || k.name.contains(key.name.as_str()))
        .take(5)
        .map(|k| k.to_string())
        .collect();
    Error::invalid_value(format!("Unknown setting '{}'", key)).with_suggestions(suggestions)
}
