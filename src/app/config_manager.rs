//! Configuration lifecycle: load file config, merge CLI, build the engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use driller_core::FuzzConfig;

use crate::app_config::{FileConfig, VerbositySetting, load_default_file_config};
use crate::cli::Args;

/// Default path of the discovered-endpoints file.
pub(crate) const DEFAULT_ENDPOINTS_FILE: &str = "endpoints.txt";

/// Resolved configuration bundle for one run.
#[derive(Debug)]
pub(crate) struct ResolvedConfig {
    pub(crate) fuzz: FuzzConfig,
    pub(crate) wordlist: PathBuf,
    pub(crate) include_common_paths: bool,
    pub(crate) endpoints_file: PathBuf,
    pub(crate) json: bool,
    pub(crate) quiet: bool,
    pub(crate) log_level: &'static str,
}

/// Loads the config file and merges CLI overrides on top of it.
pub(crate) fn resolve_config(args: &Args) -> Result<ResolvedConfig> {
    let file_config = load_default_file_config()?;
    merge_config(args, file_config.as_ref())
}

/// CLI values win over file values, which win over built-in defaults.
pub(crate) fn merge_config(args: &Args, file: Option<&FileConfig>) -> Result<ResolvedConfig> {
    let file = file.cloned().unwrap_or_default();
    let mut fuzz = FuzzConfig::new(args.url.clone());

    fuzz.methods.clone_from(&args.methods);
    if let Some(json) = args.headers_json.as_deref() {
        fuzz.headers = parse_json_object(json).context("Invalid --headers-json value")?;
    }
    for raw in &args.headers {
        fuzz.headers.push(parse_header_arg(raw)?);
    }
    if let Some(json) = args.cookies_json.as_deref() {
        fuzz.cookies = parse_json_object(json).context("Invalid --cookies-json value")?;
    }
    for raw in &args.cookies {
        fuzz.cookies.push(parse_cookie_arg(raw)?);
    }
    fuzz.body = args.data.as_ref().map(|data| data.as_bytes().to_vec());

    fuzz.extensions = if args.extensions.is_empty() {
        file.extensions.unwrap_or_default()
    } else {
        args.extensions.clone()
    };
    if let Some(concurrency) = args.concurrency.or(file.concurrency) {
        fuzz.concurrency = usize::from(concurrency);
    }
    if let Some(rate) = args.rate.or(file.rate) {
        fuzz.requests_per_second = rate;
    }
    if let Some(burst) = args.burst.or(file.burst) {
        fuzz.burst = burst;
    }
    if let Some(timeout) = args.timeout.or(file.timeout_secs) {
        fuzz.request_timeout = Duration::from_secs(timeout);
    }
    if let Some(retries) = args.max_retries.or(file.max_retries) {
        fuzz.max_retries = u32::from(retries);
    }
    fuzz.status_include = if args.status_include.is_empty() {
        file.status_include.unwrap_or_default().into_iter().collect()
    } else {
        args.status_include.iter().copied().collect()
    };
    fuzz.status_exclude = if args.status_exclude.is_empty() {
        file.status_exclude.unwrap_or_default().into_iter().collect()
    } else {
        args.status_exclude.iter().copied().collect()
    };
    if let Some(dir) = args.output_dir.clone().or(file.output_dir) {
        fuzz.output_directory = dir;
    }
    fuzz.download = !args.no_download;
    fuzz.follow_redirects = args.follow_redirects;

    let verbosity = file.verbosity.unwrap_or(VerbositySetting::Default);
    let log_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => verbosity.log_level(),
            1 => "debug",
            _ => "trace",
        }
    };

    Ok(ResolvedConfig {
        fuzz,
        wordlist: args.wordlist.clone(),
        include_common_paths: !args.no_common_paths,
        endpoints_file: args
            .endpoints_file
            .clone()
            .or(file.endpoints_file)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ENDPOINTS_FILE)),
        json: args.json,
        quiet: args.quiet || (args.verbose == 0 && verbosity == VerbositySetting::Quiet),
        log_level,
    })
}

/// Parses `Name: value`.
fn parse_header_arg(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Invalid header '{raw}': expected \"Name: value\"");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid header '{raw}': empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Parses `name=value`.
fn parse_cookie_arg(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once('=') else {
        bail!("Invalid cookie '{raw}': expected \"name=value\"");
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Invalid cookie '{raw}': empty name");
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Flat JSON object to name/value pairs. Non-string scalars keep their JSON text.
fn parse_json_object(raw: &str) -> Result<Vec<(String, String)>> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).context("Expected a JSON object")?;
    object
        .into_iter()
        .map(|(name, value)| -> Result<(String, String)> {
            match value {
                serde_json::Value::String(s) => Ok((name, s)),
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    bail!("Value for '{name}' must be a string or number")
                }
                other => Ok((name, other.to_string())),
            }
        })
        .collect()
}
