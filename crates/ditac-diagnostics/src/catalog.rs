//! Error code catalog and lookup.
//!
//! Maps codes such as "D-3-3" to their subsystem and default wording. The
//! catalog is embedded at compile time from `error_catalog.json`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata for an error code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorCodeInfo {
    /// Subsystem name (e.g., "keys", "ditaval", "xml")
    pub subsystem: String,

    /// Short title for the error
    pub title: String,

    /// Default message template
    pub message_template: String,

    /// URL to documentation (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,

    /// When this code was introduced (version)
    pub since_version: String,
}

/// Global error catalog, parsed lazily from the embedded JSON.
pub static ERROR_CATALOG: Lazy<HashMap<String, ErrorCodeInfo>> = Lazy::new(|| {
    let json_data = include_str!("../error_catalog.json");
    serde_json::from_str(json_data).unwrap_or_default()
});

/// Look up error code information.
pub fn get_error_info(code: &str) -> Option<&ErrorCodeInfo> {
    ERROR_CATALOG.get(code)
}

/// Get the subsystem name for an error code.
///
/// ```
/// use ditac_diagnostics::catalog::get_subsystem;
///
/// assert_eq!(get_subsystem("D-3-3"), Some("keys"));
/// ```
pub fn get_subsystem(code: &str) -> Option<&str> {
    ERROR_CATALOG.get(code).map(|info| info.subsystem.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_loads() {
        assert!(!ERROR_CATALOG.is_empty());
    }

    #[test]
    fn test_internal_error_exists() {
        let info = get_error_info("D-0-1").unwrap();
        assert_eq!(info.subsystem, "internal");
        assert_eq!(info.title, "Internal Error");
    }

    #[test]
    fn test_codes_are_prefixed_by_subsystem_number() {
        for code in ERROR_CATALOG.keys() {
            let mut parts = code.split('-');
            assert_eq!(parts.next(), Some("D"), "Got: {}", code);
            assert!(parts.next().and_then(|p| p.parse::<u32>().ok()).is_some());
            assert!(parts.next().and_then(|p| p.parse::<u32>().ok()).is_some());
        }
    }

    #[test]
    fn test_nonexistent_code() {
        assert!(get_error_info("D-999-999").is_none());
        assert_eq!(get_subsystem("D-999-999"), None);
    }
}
