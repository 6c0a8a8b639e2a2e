//! Command-line interface definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use portal_core::FieldValue;

/// Automate a course portal through one locked browser profile.
#[derive(Parser, Debug)]
#[command(name = "portal", version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (RON). Defaults to ./portal.ron when present.
    #[arg(long, global = true, env = "PORTAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level: error, warn, info, debug or trace.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Mirror the log to the terminal.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract title and visible text from one page.
    Extract {
        /// Page to open; defaults to the configured portal URL.
        url: Option<String>,
    },

    /// Collect the content of one or more pages.
    Scrape(ScrapeArgs),

    /// Fill named form fields on a page.
    FillForm(FillFormArgs),

    /// Run the job passed in AGENT_JOB and report on stdout.
    #[command(hide = true)]
    Worker,

    /// Remove the session lock and the browser's singleton marker.
    Unlock {
        /// Remove the lock even if its owner still appears to be running.
        #[arg(long)]
        force: bool,
    },

    /// Print the last successful result.
    LastResult,
}

#[derive(Args, Debug)]
pub struct ScrapeArgs {
    /// Pages to visit; defaults to the configured portal URL.
    pub urls: Vec<String>,

    /// Follow same-site links from the first URL.
    #[arg(long)]
    pub traverse: bool,
}

#[derive(Args, Debug)]
pub struct FillFormArgs {
    pub url: String,

    /// Field to fill, addressed by name or id. Repeatable.
    #[arg(long = "value", value_name = "NAME=VALUE", value_parser = parse_field)]
    pub values: Vec<(String, FieldValue)>,
}

/// Numbers stay numbers so the worker sees what the caller typed.
fn parse_field(raw: &str) -> Result<(String, FieldValue), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in {raw:?}"));
    }
    let value = if let Ok(int) = value.parse::<i64>() {
        FieldValue::from(int)
    } else if let Some(number) = value
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
    {
        FieldValue::Number(number)
    } else {
        FieldValue::from(value)
    };
    Ok((name.to_string(), value))
}
