//! Shared User-Agent string for transfer and metadata HTTP clients.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/idfetch";

/// Default User-Agent for every request (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("idfetch/{version} (+{PROJECT_UA_URL})")
}
