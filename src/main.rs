//! ridikey CLI - finds and saves RIDI device credentials.

use anyhow::{Context, Result};
use clap::Parser;
use ridikey::config::ConfigStore;
use ridikey::console::Console;
use ridikey::cookies::{COOKIE_DOMAIN, CookieJar, CookieStoreReader, NetscapeCookieFile, unix_now};
use ridikey::error::{ConfigError, PipelineError};
use ridikey::extract::CredentialExtractor;
use ridikey::pipeline::{AcquisitionPipeline, PipelineOptions, SelectionPolicy};
use ridikey::platform::Platform;
use ridikey::probe::SessionProber;
use ridikey::prompt::TerminalPrompt;
use ridikey::record::{COMMAND_LINE, DeviceRecord};
use ridikey::validator;
use ridikey::verify::{DownstreamTool, Verification};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, prelude::*};

/// Finds the device_id and user_idx the ridiculous decryption tool needs.
#[derive(Parser, Debug)]
#[command(name = "ridikey")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Save this device ID instead of searching (requires --user-idx).
    #[arg(long, requires = "user_idx")]
    device_id: Option<String>,

    /// Save this user index instead of searching (requires --device-id).
    #[arg(long, requires = "device_id")]
    user_idx: Option<String>,

    /// Print the saved credentials and exit.
    #[arg(long)]
    show: bool,

    /// With --show, print the config as JSON.
    #[arg(long, requires = "show")]
    json: bool,

    /// Config file to read and write (default: ~/.ridiculous.toml).
    #[arg(long)]
    config_path: Option<PathBuf>,

    /// Netscape cookies.txt export to try before the browser stores.
    #[arg(long)]
    cookies_file: Option<PathBuf>,

    /// Go straight to manual entry instead of asking you to log in.
    #[arg(long)]
    no_login: bool,

    /// Pick among several registered devices instead of taking the first valid one.
    #[arg(long)]
    choose: bool,

    /// Check the saved credentials with `ridiculous --validate-only`.
    #[arg(long)]
    verify: bool,

    /// Show debug diagnostics on stderr.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    let console = Console::new();

    let store = match &args.config_path {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::open_default().context("Failed to locate config file")?,
    };

    if args.show {
        return show(&store, &console, args.json);
    }

    console.section("ridikey - RIDI credential finder");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let platform = Platform::detect();
    tracing::debug!("platform: {}", platform);

    let imported_cookies = match &args.cookies_file {
        Some(path) => Some(import_cookies(path, &console)?),
        None => None,
    };

    let extractor = CredentialExtractor::detect();
    tracing::debug!("extractor backends: {:?}", extractor.backend_names());

    let pipeline = AcquisitionPipeline::new(
        Arc::new(SessionProber::ridibooks().context("Failed to set up HTTP client")?),
        Arc::new(CookieStoreReader::new(platform)),
        extractor,
        PipelineOptions {
            platform,
            prompt_login: !args.no_login,
            policy: if args.choose {
                SelectionPolicy::Ask
            } else {
                SelectionPolicy::FirstValid
            },
            imported_cookies,
            ..PipelineOptions::default()
        },
    );

    let mut ui = TerminalPrompt::new(Console::new());
    let result = match (args.device_id, args.user_idx) {
        (Some(device_id), Some(user_idx)) => {
            let record = DeviceRecord::new(device_id.trim(), user_idx.trim(), COMMAND_LINE);
            pipeline.accept_supplied(record, &mut ui, &cancel).await
        }
        _ => {
            console.step("Searching for credentials...");
            pipeline.run(&mut ui, &cancel).await
        }
    };

    let acquisition = match result {
        Ok(acquisition) => acquisition,
        Err(err) => {
            console.section("Attempts");
            console.attempt_trail(err.attempts());
            if let PipelineError::Cancelled { .. } = err {
                console.warning("Interrupted; nothing was saved.");
            }
            console.error(&err.to_string());
            std::process::exit(1);
        }
    };

    console.section("Attempts");
    console.attempt_trail(&acquisition.attempts);

    if cancel.is_cancelled() {
        console.warning("Interrupted; nothing was saved.");
        return Ok(());
    }

    let record = &acquisition.record;
    console.section("Credentials");
    console.info(&format!("Source:    {}", acquisition.source));
    console.info(&format!("Device:    {}", record.display_name));
    console.info(&format!(
        "device_id: {} {}",
        console.value(&record.device_id),
        console.muted(&format!("({})", validator::classify(&record.device_id).describe()))
    ));
    console.info(&format!("user_idx:  {}", console.value(&record.user_idx)));
    if !acquisition.validated {
        console.warning("These values did not pass format validation; saved at your request.");
    }

    let preferences = store.preferences_or_default();
    let outcome = store
        .write(record, &preferences)
        .context("Failed to save credentials")?;

    if outcome.unchanged {
        console.success(&format!(
            "{} already holds these credentials",
            store.path().display()
        ));
    } else {
        if let Some(backup) = &outcome.backup {
            console.info(&format!("Previous config backed up to {}", backup.display()));
        }
        console.success(&format!("Saved to {}", store.path().display()));
    }

    if args.verify {
        console.step("Checking credentials with ridiculous...");
        let tool = DownstreamTool::locate();
        let verification = tokio::select! {
            biased;
            _ = cancel.cancelled() => Verification::Unconfirmed("interrupted".to_string()),
            verification = tool.verify(record) => verification,
        };
        match verification {
            Verification::Confirmed => console.success(&verification.to_string()),
            _ => console.warning(&verification.to_string()),
        }
    }

    Ok(())
}

/// Sets up stderr diagnostics; `RUST_LOG` overrides the default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Prints the saved config.
fn show(store: &ConfigStore, console: &Console, json: bool) -> Result<()> {
    let record = match store.read() {
        Ok(record) => record,
        Err(ConfigError::NotFound(path)) => {
            console.warning(&format!(
                "No config at {}. Run ridikey without --show to create it.",
                path.display()
            ));
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to read config"),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    console.section(&store.path().display().to_string());
    console.info(&format!("device_id: {}", console.value(&record.device_id)));
    console.info(&format!("user_idx:  {}", console.value(&record.user_idx)));
    if !record.preferences.is_empty() {
        console.info(&console.muted(&format!("{} preference(s) kept", record.preferences.len())));
    }

    let backups = store.backups().unwrap_or_default();
    if let Some(latest) = backups.last() {
        console.info(&console.muted(&format!(
            "{} backup(s), latest {}",
            backups.len(),
            latest.display()
        )));
    }
    Ok(())
}

/// Loads account cookies from a cookies.txt export.
fn import_cookies(path: &Path, console: &Console) -> Result<CookieJar> {
    let file = NetscapeCookieFile::load(path)
        .with_context(|| format!("Failed to load cookies from {}", path.display()))?;
    let jar = file.jar_for(COOKIE_DOMAIN, unix_now());
    if jar.is_empty() {
        console.warning(&format!(
            "{} has no live cookies for {}",
            path.display(),
            COOKIE_DOMAIN
        ));
    } else {
        tracing::debug!("imported {} cookie(s) from {}", jar.len(), path.display());
    }
    Ok(jar)
}
