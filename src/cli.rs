//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use driller_core::HttpMethod;
use driller_core::wordlist::DEFAULT_WORDLIST;

/// Discover live endpoints on a web server by wordlist fuzzing.
///
/// Driller probes one URL per wordlist entry (and per extension), reports
/// every path whose status is interesting and saves the content it finds.
#[derive(Parser, Debug)]
#[command(name = "driller")]
#[command(author, version, about)]
pub struct Args {
    /// Target base URL (http or https)
    #[arg(short = 'u', long)]
    pub url: String,

    /// Wordlist file, one entry per line
    #[arg(short = 'w', long, default_value = DEFAULT_WORDLIST)]
    pub wordlist: PathBuf,

    /// Probe methods, comma-separated (HEAD, GET, POST, PUT, DELETE, PATCH, OPTIONS)
    #[arg(short = 'm', long = "method", value_delimiter = ',', default_value = "HEAD")]
    pub methods: Vec<HttpMethod>,

    /// Extra request header as "Name: value" (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Extra request headers as a JSON object
    #[arg(long)]
    pub headers_json: Option<String>,

    /// Cookie as "name=value" (repeatable)
    #[arg(short = 'b', long = "cookie")]
    pub cookies: Vec<String>,

    /// Cookies as a JSON object
    #[arg(long)]
    pub cookies_json: Option<String>,

    /// Request body template; FUZZ is replaced by the wordlist entry
    #[arg(short = 'd', long)]
    pub data: Option<String>,

    /// Extensions to try for every entry, comma-separated (e.g. php,html)
    #[arg(short = 'x', long, value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Maximum concurrent requests (1-100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: Option<u8>,

    /// Request rate ceiling in requests per second
    #[arg(long)]
    pub rate: Option<f64>,

    /// Burst size of the rate limiter
    #[arg(long)]
    pub burst: Option<u32>,

    /// Per-request timeout in seconds (1-3600)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,

    /// Retries for transient failures and 429 responses (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Statuses that count as hits, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub status_include: Vec<u16>,

    /// Statuses that never count as hits, comma-separated
    #[arg(long, value_delimiter = ',')]
    pub status_exclude: Vec<u16>,

    /// Directory for saved pages
    #[arg(short = 'O', long)]
    pub output_dir: Option<PathBuf>,

    /// Only report hits, do not save their content
    #[arg(long)]
    pub no_download: bool,

    /// Follow redirects instead of reporting the redirect itself
    #[arg(long)]
    pub follow_redirects: bool,

    /// File that receives the sorted list of discovered endpoints
    #[arg(short = 'o', long)]
    pub endpoints_file: Option<PathBuf>,

    /// Print one JSON line per probed URL to stdout
    #[arg(long)]
    pub json: bool,

    /// Do not add the built-in common paths to the wordlist
    #[arg(long)]
    pub no_common_paths: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
