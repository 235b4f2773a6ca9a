/*
 * profile.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * A parsed ditaval profile: the exclude, include, passthrough and flag
 * rules of one `.ditaval` document.
 */

use super::flags::Flags;
use crate::error::{FilterError, PreprocessError, Result};
use crate::source::DocumentSource;
use crate::uri;
use ditac_dom::text::collapse_whitespace;
use ditac_dom::{Document, NodeId, XML_NS};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use url::Url;

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid regex"));

const NAMED_COLORS: [&str; 17] = [
    "aqua", "black", "blue", "fuchsia", "gray", "green", "lime", "maroon", "navy", "olive",
    "purple", "red", "silver", "teal", "white", "yellow", "orange",
];

const CHANGE_BAR_PROPERTIES: [&str; 5] = [
    "change-bar-color",
    "change-bar-offset",
    "change-bar-placement",
    "change-bar-style",
    "change-bar-width",
];

type FilterResult<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Exclude,
    Flag,
    Include,
    Passthrough,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Exclude => "exclude",
            Action::Flag => "flag",
            Action::Include => "include",
            Action::Passthrough => "passthrough",
        })
    }
}

/// One rule: a value (`None` for any value) and what to do with it.
#[derive(Debug, Clone)]
pub struct PropValue {
    pub value: Option<String>,
    pub action: Action,
    pub flags: Option<Flags>,
}

/// The rules about one attribute.
///
/// `attribute` uses Clark notation for namespaced attributes and is
/// `None` for rules about any filter attribute.
#[derive(Debug, Clone)]
pub struct Prop {
    pub attribute: Option<String>,
    values: Vec<PropValue>,
}

impl Prop {
    pub fn new(attribute: Option<String>, value: PropValue) -> Self {
        Self {
            attribute,
            values: vec![value],
        }
    }

    /// Add `value`, replacing the rule for the same value if any.
    pub fn add_value(&mut self, value: PropValue) {
        match self.values.iter_mut().find(|v| v.value == value.value) {
            Some(existing) => *existing = value,
            None => self.values.push(value),
        }
    }

    pub fn find_value(&self, searched: &str) -> Option<&PropValue> {
        self.values.iter().find(|v| v.value.as_deref() == Some(searched))
    }

    pub fn wildcard_value(&self) -> Option<&PropValue> {
        self.values.iter().find(|v| v.value.is_none())
    }

    pub fn values(&self) -> &[PropValue] {
        &self.values
    }
}

/// A conditional processing profile.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    url: Option<Url>,
    props: Vec<Prop>,
    conflict_color: Option<String>,
    conflict_background_color: Option<String>,
}

impl Filter {
    /// An empty profile, typically completed with
    /// [`Filter::add_exclude_props`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and parse the profile at `url`.
    pub fn load(url: &Url, source: &dyn DocumentSource) -> Result<Self> {
        let url = uri::without_fragment(url);
        let text = source.fetch(&url)?;
        let doc = Document::parse(&text, Some(&url))?;
        let mut filter = Filter::parse(&doc).map_err(PreprocessError::from)?;
        filter.url = Some(url);
        Ok(filter)
    }

    /// Parse a `<val>` document.
    pub fn parse(doc: &Document) -> FilterResult<Self> {
        let val = doc.root();
        if doc.namespace(val).is_some() || doc.local_name(val) != "val" {
            return Err(FilterError::NotADitaval {
                name: qualified_name(doc, val),
                location: Some(doc.location(val)),
            });
        }

        let mut filter = Filter {
            url: doc.uri().cloned(),
            ..Filter::default()
        };
        for child in doc.child_elements(val) {
            match doc.local_name(child) {
                "prop" => {
                    let attribute = doc
                        .attribute(child, "att")
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(|a| expand_qname(doc, child, a));
                    filter.parse_rule(doc, child, attribute)?;
                }
                "revprop" => filter.parse_rule(doc, child, Some("rev".to_string()))?,
                "style-conflict" => {
                    filter.conflict_color = parse_color(doc, child, "foreground-conflict-color")?;
                    filter.conflict_background_color =
                        parse_color(doc, child, "background-conflict-color")?;
                }
                _ => {
                    return Err(FilterError::UnknownElement {
                        name: qualified_name(doc, child),
                        location: Some(doc.location(child)),
                    });
                }
            }
        }

        if filter.conflict_color.is_some() || filter.conflict_background_color.is_some() {
            for prop in &mut filter.props {
                for value in &mut prop.values {
                    if let Some(flags) = &mut value.flags {
                        flags.conflict_color.clone_from(&filter.conflict_color);
                        flags.conflict_background_color.clone_from(&filter.conflict_background_color);
                    }
                }
            }
        }
        Ok(filter)
    }

    fn parse_rule(&mut self, doc: &Document, element: NodeId, attribute: Option<String>) -> FilterResult<()> {
        let value = doc
            .attribute(element, "val")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let action = doc.non_empty_attribute(element, "action").ok_or_else(|| {
            FilterError::MissingAttribute {
                name: "action".to_string(),
                location: Some(doc.location(element)),
            }
        })?;

        let (action, flags) = match action {
            "exclude" => (Action::Exclude, None),
            "include" => (Action::Include, None),
            "passthrough" => (Action::Passthrough, None),
            "flag" => {
                let flags = parse_flags(doc, element)?;
                if flags.is_empty() {
                    return Ok(());
                }
                (Action::Flag, Some(flags))
            }
            other => {
                return Err(FilterError::InvalidAttribute {
                    value: other.to_string(),
                    name: "action".to_string(),
                    location: Some(doc.location(element)),
                });
            }
        };

        let rule = PropValue { value, action, flags };
        match self.props.iter_mut().find(|p| p.attribute == attribute) {
            Some(prop) => prop.add_value(rule),
            None => self.props.push(Prop::new(attribute, rule)),
        }
        Ok(())
    }

    /// Append one exclude rule per `(attribute, value)` pair.
    pub fn add_exclude_props(&mut self, pairs: &[(&str, &str)]) {
        for (attribute, value) in pairs {
            self.props.push(Filter::new_exclude_prop(attribute, value));
        }
    }

    pub fn new_exclude_prop(attribute: &str, value: &str) -> Prop {
        Prop::new(
            Some(attribute.to_string()),
            PropValue {
                value: Some(value.to_string()),
                action: Action::Exclude,
                flags: None,
            },
        )
    }

    pub fn props(&self) -> &[Prop] {
        &self.props
    }

    /// URL of the ditaval document, if it was loaded from one.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn conflict_color(&self) -> Option<&str> {
        self.conflict_color.as_deref()
    }

    pub fn conflict_background_color(&self) -> Option<&str> {
        self.conflict_background_color.as_deref()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(color) = &self.conflict_color {
            writeln!(f, "conflictColor={}", color)?;
        }
        if let Some(color) = &self.conflict_background_color {
            writeln!(f, "conflictBackgroundColor={}", color)?;
        }
        for prop in &self.props {
            writeln!(f, "attribute={}", prop.attribute.as_deref().unwrap_or_default())?;
            for value in &prop.values {
                write!(
                    f,
                    "  value={} action={}",
                    value.value.as_deref().unwrap_or_default(),
                    value.action
                )?;
                if let Some(flags) = &value.flags {
                    write!(f, "{}", flags)?;
                }
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

fn qualified_name(doc: &Document, element: NodeId) -> String {
    doc.name(element).map(|n| n.qualified()).unwrap_or_default()
}

/// `prefix:local` to `{ns}local`. Unknown prefixes leave the name as is.
fn expand_qname(doc: &Document, context: NodeId, name: &str) -> String {
    let Some((prefix, local)) = name.split_once(':') else {
        return name.to_string();
    };
    if prefix.is_empty() || local.is_empty() {
        return name.to_string();
    }
    let ns = if prefix == "xml" {
        Some(XML_NS.to_string())
    } else {
        doc.lookup_namespace(context, prefix)
    };
    match ns {
        Some(ns) => format!("{{{}}}{}", ns, local),
        None => name.to_string(),
    }
}

fn parse_color(doc: &Document, element: NodeId, name: &str) -> FilterResult<Option<String>> {
    let Some(value) = doc.non_empty_attribute(element, name) else {
        return Ok(None);
    };
    if NAMED_COLORS.contains(&value) || HEX_COLOR.is_match(value) {
        Ok(Some(value.to_string()))
    } else {
        Err(FilterError::InvalidColor {
            value: value.to_string(),
            location: Some(doc.location(element)),
        })
    }
}

fn parse_flags(doc: &Document, element: NodeId) -> FilterResult<Flags> {
    let mut flags = Flags {
        color: parse_color(doc, element, "color")?,
        background_color: parse_color(doc, element, "backcolor")?,
        ..Flags::default()
    };

    if let Some(style) = doc.non_empty_attribute(element, "style") {
        match style {
            // double-underline is rendered as a single underline.
            "underline" | "double-underline" => flags.text_decoration = Some("underline".into()),
            "overline" => flags.text_decoration = Some("overline".into()),
            "line-through" => flags.text_decoration = Some("line-through".into()),
            "italics" => flags.font_style = Some("italic".into()),
            "bold" => flags.font_weight = Some("bold".into()),
            other => {
                return Err(FilterError::InvalidStyle {
                    value: other.to_string(),
                    location: Some(doc.location(element)),
                });
            }
        }
    }

    if let Some(changebar) = doc.non_empty_attribute(element, "changebar") {
        flags.change_bar = parse_change_bar(changebar);
    }

    if let Some(start) = doc.child_elements(element).find(|&c| doc.local_name(c) == "startflag") {
        let (image, absolute, text) = parse_start_end_flag(doc, start)?;
        if image.is_some() || text.is_some() {
            flags.start_image = image;
            flags.start_image_absolute = absolute;
            flags.start_text = text;
        }
    }
    if let Some(end) = doc.child_elements(element).find(|&c| doc.local_name(c) == "endflag") {
        let (image, absolute, text) = parse_start_end_flag(doc, end)?;
        if image.is_some() || text.is_some() {
            flags.end_image = image;
            flags.end_image_absolute = absolute;
            flags.end_text = text;
        }
    }
    Ok(flags)
}

fn parse_start_end_flag(doc: &Document, element: NodeId) -> FilterResult<(Option<Url>, bool, Option<String>)> {
    let mut image = None;
    let mut absolute = false;
    if let Some(imageref) = doc.non_empty_attribute(element, "imageref") {
        if let Some(url) = uri::parse_absolute(imageref) {
            image = Some(url);
            absolute = true;
        } else {
            let resolved = doc.uri().and_then(|base| uri::resolve(base, imageref));
            match resolved {
                Some(url) => image = Some(url),
                None => {
                    return Err(FilterError::InvalidAttribute {
                        value: imageref.to_string(),
                        name: "imageref".to_string(),
                        location: Some(doc.location(element)),
                    });
                }
            }
        }
    }

    let text = doc
        .child_elements(element)
        .find(|&c| doc.local_name(c) == "alt-text")
        .map(|alt| collapse_whitespace(&doc.text_content(alt)))
        .filter(|t| !t.is_empty());
    Ok((image, absolute, text))
}

/// `name:value` pairs of a `changebar` attribute, keeping the supported
/// change-bar properties only.
fn parse_change_bar(styles: &str) -> Vec<(String, String)> {
    split_style_props(styles)
        .into_iter()
        .filter_map(|prop| {
            let (name, value) = prop.split_once(':')?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                return None;
            }
            let name = if name.starts_with("change-bar-") {
                name.to_string()
            } else {
                format!("change-bar-{}", name)
            };
            CHANGE_BAR_PROPERTIES
                .contains(&name.as_str())
                .then(|| (name, value.to_string()))
        })
        .collect()
}

/// Split on `;` outside quoted strings. A quote preceded by a backslash
/// does not close the string.
fn split_style_props(styles: &str) -> Vec<String> {
    let mut list = Vec::new();
    let mut quote: Option<char> = None;
    let mut buffer = String::new();
    for c in styles.chars() {
        match c {
            ';' if quote.is_none() => {
                let style = buffer.trim();
                if !style.is_empty() {
                    list.push(style.to_string());
                }
                buffer.clear();
            }
            '"' | '\'' => {
                match quote {
                    Some(q) if q == c && !buffer.ends_with('\\') => quote = None,
                    Some(_) => {}
                    None => quote = Some(c),
                }
                buffer.push(c);
            }
            _ => buffer.push(c),
        }
    }
    let style = buffer.trim();
    if !style.is_empty() {
        list.push(style.to_string());
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use ditac_dom::parse;

    fn profile(xml: &str) -> FilterResult<Filter> {
        let url = Url::parse("file:///p/profile.ditaval").unwrap();
        Filter::parse(&parse(xml, Some(&url)).unwrap())
    }

    #[test]
    fn test_rules_are_grouped_by_attribute() {
        let filter = profile(
            r#"<val>
  <prop att="audience" val="internal" action="exclude"/>
  <prop att="audience" val="expert" action="include"/>
  <prop att="audience" val="internal" action="passthrough"/>
  <prop action="exclude"/>
  <revprop val="1.2" action="flag" color="red"/>
</val>"#,
        )
        .unwrap();
        let props = filter.props();
        assert_eq!(props.len(), 3);
        assert_eq!(props[0].attribute.as_deref(), Some("audience"));
        assert_eq!(props[0].values().len(), 2);
        assert_eq!(props[0].find_value("internal").unwrap().action, Action::Passthrough);
        assert_eq!(props[1].attribute, None);
        assert_eq!(props[1].wildcard_value().unwrap().action, Action::Exclude);
        assert_eq!(props[2].attribute.as_deref(), Some("rev"));
    }

    #[test]
    fn test_flag_rule() {
        let filter = profile(
            r##"<val>
  <style-conflict foreground-conflict-color="#FF00FF"/>
  <prop att="platform" val="mac" action="flag" color="blue" backcolor="#eeeeee" style="italics"
        changebar="color:red; style:'a;b'; bogus:1">
    <startflag imageref="img/mac.png"><alt-text>  Mac
      only </alt-text></startflag>
    <endflag imageref="http://example.com/end.png"/>
  </prop>
</val>"##,
        )
        .unwrap();
        let flags = filter.props()[0].find_value("mac").unwrap().flags.clone().unwrap();
        assert_eq!(flags.color.as_deref(), Some("blue"));
        assert_eq!(flags.background_color.as_deref(), Some("#eeeeee"));
        assert_eq!(flags.font_style.as_deref(), Some("italic"));
        assert_eq!(
            flags.change_bar,
            vec![
                ("change-bar-color".to_string(), "red".to_string()),
                ("change-bar-style".to_string(), "'a;b'".to_string()),
            ]
        );
        assert_eq!(flags.start_image.as_ref().map(Url::as_str), Some("file:///p/img/mac.png"));
        assert!(!flags.start_image_absolute);
        assert_eq!(flags.start_text.as_deref(), Some("Mac only"));
        assert!(flags.end_image_absolute);
        assert_eq!(flags.conflict_color.as_deref(), Some("#FF00FF"));
    }

    #[test]
    fn test_empty_flag_adds_no_rule() {
        let filter = profile(r#"<val><prop att="product" val="x" action="flag"/></val>"#).unwrap();
        assert!(filter.props().is_empty());
    }

    #[test]
    fn test_prefixed_attribute_is_expanded() {
        let filter = profile(
            r#"<val xmlns:my="urn:my"><prop att="xml:lang" val="fr" action="exclude"/><prop att="my:level" action="exclude"/><prop att="no:such" action="exclude"/></val>"#,
        )
        .unwrap();
        let names: Vec<_> = filter.props().iter().map(|p| p.attribute.clone().unwrap()).collect();
        assert_eq!(
            names,
            vec![
                "{http://www.w3.org/XML/1998/namespace}lang".to_string(),
                "{urn:my}level".to_string(),
                "no:such".to_string()
            ]
        );
    }

    #[test]
    fn test_fatal_profile_errors() {
        assert!(matches!(profile("<notval/>"), Err(FilterError::NotADitaval { .. })));
        assert!(matches!(
            profile("<val><rule/></val>"),
            Err(FilterError::UnknownElement { .. })
        ));
        assert!(matches!(
            profile(r#"<val><prop att="a"/></val>"#),
            Err(FilterError::MissingAttribute { .. })
        ));
        assert!(matches!(
            profile(r#"<val><prop att="a" action="hide"/></val>"#),
            Err(FilterError::InvalidAttribute { .. })
        ));
        assert!(matches!(
            profile(r#"<val><prop att="a" action="flag" color="mauve"/></val>"#),
            Err(FilterError::InvalidColor { .. })
        ));
        assert!(matches!(
            profile(r#"<val><prop att="a" action="flag" style="blink"/></val>"#),
            Err(FilterError::InvalidStyle { .. })
        ));
    }

    #[test]
    fn test_add_exclude_props_appends() {
        let mut filter = Filter::new();
        filter.add_exclude_props(&[("print", "printonly"), ("print", "no")]);
        assert_eq!(filter.props().len(), 2);
        insta::assert_snapshot!(filter.to_string(), @r"
        attribute=print
          value=printonly action=exclude
        attribute=print
          value=no action=exclude
        ");
    }

    #[test]
    fn test_load_through_source() {
        let source = MemorySource::new().with(
            "file:///p/a.ditaval",
            r#"<val><prop att="audience" val="internal" action="exclude"/></val>"#,
        );
        let url = Url::parse("file:///p/a.ditaval").unwrap();
        let filter = Filter::load(&url, &source).unwrap();
        assert_eq!(filter.url(), Some(&url));
        assert_eq!(filter.props().len(), 1);
    }
}
