//! Options of a preprocessing run.
//!
//! Options are plain serde data so they can come from a JSON file as well
//! as from command line flags:
//!
//! ```json
//! { "media": "print", "externalFilter": "profiles/novice.ditaval" }
//! ```

use serde::{Deserialize, Serialize};

/// Target medium of the deliverable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Media {
    #[default]
    Screen,
    Print,
}

impl Media {
    /// The `print` attribute value excluded for this medium.
    pub fn excluded_print_value(self) -> &'static str {
        match self {
            Media::Screen => "printonly",
            Media::Print => "no",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreprocessOptions {
    pub media: Media,

    /// Path or URL of a ditaval profile applied to the whole deliverable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_filter: Option<String>,

    /// Drop topicrefs having `processing-role="resource-only"` from the map.
    pub exclude_resource_only: bool,

    /// Warn about an unsupported `DITAArchVersion`.
    pub check_dita_version: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            media: Media::Screen,
            external_filter: None,
            exclude_resource_only: true,
            check_dita_version: true,
        }
    }
}

impl PreprocessOptions {
    /// Parse options from JSON. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = PreprocessOptions::default();
        assert_eq!(options.media, Media::Screen);
        assert!(options.exclude_resource_only);
        assert!(options.check_dita_version);
        assert_eq!(PreprocessOptions::from_json_str("{}").unwrap(), options);
    }

    #[test]
    fn test_from_json() {
        let options = PreprocessOptions::from_json_str(
            r#"{"media": "print", "externalFilter": "p.ditaval", "excludeResourceOnly": false}"#,
        )
        .unwrap();
        assert_eq!(options.media, Media::Print);
        assert_eq!(options.media.excluded_print_value(), "no");
        assert_eq!(options.external_filter.as_deref(), Some("p.ditaval"));
        assert!(!options.exclude_resource_only);
        assert!(options.check_dita_version);
    }

    #[test]
    fn test_unknown_media_is_rejected() {
        assert!(PreprocessOptions::from_json_str(r#"{"media": "tv"}"#).is_err());
    }
}
