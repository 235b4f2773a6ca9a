//! Styles used to flag an element instead of removing it.

use std::fmt;
use url::Url;

/// The styling payload of a `flag` rule.
///
/// Every field is optional; [`Flags::set`] layers one payload over
/// another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    pub color: Option<String>,
    pub background_color: Option<String>,
    pub font_weight: Option<String>,
    pub font_style: Option<String>,
    pub text_decoration: Option<String>,
    /// `(change-bar-<name>, value)` pairs.
    pub change_bar: Vec<(String, String)>,
    pub start_image: Option<Url>,
    /// The image URL was written as an absolute URL in the profile.
    pub start_image_absolute: bool,
    pub start_text: Option<String>,
    pub end_image: Option<Url>,
    pub end_image_absolute: bool,
    pub end_text: Option<String>,
    pub(crate) conflict_color: Option<String>,
    pub(crate) conflict_background_color: Option<String>,
}

impl Flags {
    /// Merge `other` into these flags.
    ///
    /// Fields set in `other` win. When both sides have a different color
    /// and `other` carries a conflict color, the conflict color is used.
    pub fn set(&mut self, other: &Flags) {
        if let Some(color) = &other.color {
            self.color = Some(merge_color(self.color.as_deref(), color, other.conflict_color.as_deref()));
        }
        if let Some(color) = &other.background_color {
            self.background_color = Some(merge_color(
                self.background_color.as_deref(),
                color,
                other.conflict_background_color.as_deref(),
            ));
        }
        if other.font_weight.is_some() {
            self.font_weight.clone_from(&other.font_weight);
        }
        if other.font_style.is_some() {
            self.font_style.clone_from(&other.font_style);
        }
        if other.text_decoration.is_some() {
            self.text_decoration.clone_from(&other.text_decoration);
        }
        if !other.change_bar.is_empty() {
            self.change_bar.clone_from(&other.change_bar);
        }
        if other.start_image.is_some() {
            self.start_image.clone_from(&other.start_image);
            self.start_image_absolute = other.start_image_absolute;
        }
        if other.start_text.is_some() {
            self.start_text.clone_from(&other.start_text);
        }
        if other.end_image.is_some() {
            self.end_image.clone_from(&other.end_image);
            self.end_image_absolute = other.end_image_absolute;
        }
        if other.end_text.is_some() {
            self.end_text.clone_from(&other.end_text);
        }
    }

    /// True when no style is set. Conflict colors do not count.
    pub fn is_empty(&self) -> bool {
        self.color.is_none()
            && self.background_color.is_none()
            && self.font_weight.is_none()
            && self.font_style.is_none()
            && self.text_decoration.is_none()
            && self.change_bar.is_empty()
            && self.start_image.is_none()
            && self.start_text.is_none()
            && self.end_image.is_none()
            && self.end_text.is_none()
    }

    /// A copy without conflict colors, as stored on flagged topics.
    pub fn styles(&self) -> Flags {
        Flags {
            conflict_color: None,
            conflict_background_color: None,
            ..self.clone()
        }
    }
}

fn merge_color(current: Option<&str>, incoming: &str, conflict: Option<&str>) -> String {
    match (current, conflict) {
        (Some(current), Some(conflict)) if current != incoming => conflict.to_string(),
        _ => incoming.to_string(),
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = [
            ("color", &self.color),
            ("backgroundColor", &self.background_color),
            ("fontWeight", &self.font_weight),
            ("fontStyle", &self.font_style),
            ("textDecoration", &self.text_decoration),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                write!(f, " {}={}", name, value)?;
            }
        }
        for (name, value) in &self.change_bar {
            write!(f, " {}={}", name, value)?;
        }
        if let Some(url) = &self.start_image {
            write!(f, " startImage={}", url)?;
        }
        if let Some(text) = &self.start_text {
            write!(f, " startText=\"{}\"", text)?;
        }
        if let Some(url) = &self.end_image {
            write!(f, " endImage={}", url)?;
        }
        if let Some(text) = &self.end_text {
            write!(f, " endText=\"{}\"", text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colored(color: &str, conflict: Option<&str>) -> Flags {
        Flags {
            color: Some(color.to_string()),
            conflict_color: conflict.map(str::to_string),
            ..Flags::default()
        }
    }

    #[test]
    fn test_incoming_field_wins() {
        let mut flags = Flags {
            font_weight: Some("bold".into()),
            ..Flags::default()
        };
        flags.set(&Flags {
            font_style: Some("italic".into()),
            ..Flags::default()
        });
        assert_eq!(flags.font_weight.as_deref(), Some("bold"));
        assert_eq!(flags.font_style.as_deref(), Some("italic"));
    }

    #[test]
    fn test_conflicting_colors() {
        let mut flags = colored("red", None);
        flags.set(&colored("blue", Some("purple")));
        assert_eq!(flags.color.as_deref(), Some("purple"));

        // Same color: no conflict.
        let mut flags = colored("red", None);
        flags.set(&colored("red", Some("purple")));
        assert_eq!(flags.color.as_deref(), Some("red"));

        // No conflict color: last one wins.
        let mut flags = colored("red", None);
        flags.set(&colored("blue", None));
        assert_eq!(flags.color.as_deref(), Some("blue"));
    }

    #[test]
    fn test_is_empty_ignores_conflict_colors() {
        let flags = Flags {
            conflict_color: Some("black".into()),
            ..Flags::default()
        };
        assert!(flags.is_empty());
        assert!(!colored("red", None).is_empty());
        assert_eq!(colored("red", Some("black")).styles(), colored("red", None));
    }
}
