//! Default User-Agent for probe traffic.

/// Project URL included in the User-Agent so target operators can identify the tool.
const PROJECT_UA_URL: &str = "https://github.com/fierce/driller";

/// Default User-Agent for probe and fetch requests.
#[must_use]
pub(crate) fn default_probe_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("driller/{version} (endpoint-discovery; +{PROJECT_UA_URL})")
}
