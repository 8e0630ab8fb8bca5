//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

/// TOML-backed file configuration for driller defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    /// Default number of concurrent workers.
    pub concurrency: Option<u8>,
    /// Default request rate ceiling (requests per second).
    pub rate: Option<f64>,
    /// Default token-bucket capacity.
    pub burst: Option<u32>,
    /// Default per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Default retries after the first attempt.
    pub max_retries: Option<u8>,
    /// Default directory for saved pages.
    pub output_dir: Option<PathBuf>,
    /// Default path of the discovered-endpoints file.
    pub endpoints_file: Option<PathBuf>,
    /// Default extensions appended to each wordlist entry.
    pub extensions: Option<Vec<String>>,
    /// Default include-set of hit statuses.
    pub status_include: Option<Vec<u16>>,
    /// Default exclude-set of statuses.
    pub status_exclude: Option<Vec<u16>>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(1..=100).contains(&concurrency)
        {
            bail!("Invalid config value for `concurrency`: {concurrency}. Expected range: 1..=100");
        }
        if let Some(rate) = self.rate
            && (!rate.is_finite() || rate <= 0.0)
        {
            bail!("Invalid config value for `rate`: {rate}. Expected a positive number");
        }
        if let Some(burst) = self.burst
            && burst == 0
        {
            bail!("Invalid config value for `burst`: 0. Expected at least 1");
        }
        if let Some(timeout) = self.timeout_secs
            && !(1..=3600).contains(&timeout)
        {
            bail!("Invalid config value for `timeout_secs`: {timeout}. Expected range: 1..=3600");
        }
        if let Some(retries) = self.max_retries
            && retries > 10
        {
            bail!("Invalid config value for `max_retries`: {retries}. Expected range: 0..=10");
        }
        validate_status_codes("status_include", self.status_include.as_deref())?;
        validate_status_codes("status_exclude", self.status_exclude.as_deref())?;
        Ok(())
    }
}

fn validate_status_codes(field: &str, codes: Option<&[u16]>) -> Result<()> {
    for code in codes.unwrap_or_default() {
        if !(100..=599).contains(code) {
            bail!("Invalid config value for `{field}`: {code}. Expected range: 100..=599");
        }
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level this setting maps to.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/driller/config.toml`
/// 2. `$HOME/.config/driller/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("driller")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("driller")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<Option<FileConfig>> {
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "concurrency" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                let n = u8::try_from(parsed)
                    .map_err(|_| anyhow!("Integer value out of range for u8"))
                    .with_context(context)?;
                cfg.concurrency = Some(n);
            }
            "rate" => {
                let parsed = value
                    .parse::<f64>()
                    .map_err(|_| anyhow!("Expected number"))
                    .with_context(context)?;
                cfg.rate = Some(parsed);
            }
            "burst" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow!("Integer value out of range for u32"))
                    .with_context(context)?;
                cfg.burst = Some(n);
            }
            "timeout_secs" => {
                cfg.timeout_secs = Some(parse_integer_u64(value).with_context(context)?);
            }
            "max_retries" => {
                let parsed = parse_integer_u64(value).with_context(context)?;
                let n = u8::try_from(parsed)
                    .map_err(|_| anyhow!("Integer value out of range for u8"))
                    .with_context(context)?;
                cfg.max_retries = Some(n);
            }
            "output_dir" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.output_dir = Some(PathBuf::from(parsed));
            }
            "endpoints_file" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.endpoints_file = Some(PathBuf::from(parsed));
            }
            "extensions" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.extensions = Some(split_list(&parsed).map(ToString::to_string).collect());
            }
            "status_include" => {
                cfg.status_include = Some(parse_status_list(value).with_context(context)?);
            }
            "status_exclude" => {
                cfg.status_exclude = Some(parse_status_list(value).with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!(
                        "Invalid `verbosity` value '{}' on line {}",
                        parsed,
                        line_index + 1
                    )
                })?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow!("Integer value out of range for u64"))
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Status lists are written as a quoted comma-separated string: `"200,301"`.
fn parse_status_list(raw_value: &str) -> Result<Vec<u16>> {
    let parsed = parse_string_literal(raw_value)?;
    split_list(&parsed)
        .map(|code| {
            code.parse::<u16>()
                .map_err(|_| anyhow!("Expected status code, got '{code}'"))
        })
        .collect()
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
