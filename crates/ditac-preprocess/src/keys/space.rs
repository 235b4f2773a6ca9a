//! One key scope.

use super::definition::KeyDefinition;
use ditac_dom::text::split_list;
use std::collections::HashMap;
use std::fmt;

/// Index of a [`KeySpace`] in its [`KeySpaces`](super::KeySpaces) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeySpaceId(pub(crate) usize);

impl KeySpaceId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A key scope: its own bindings plus links to the enclosing and nested
/// scopes.
#[derive(Debug, Clone)]
pub struct KeySpace {
    pub id: String,
    keyscope_names: Vec<String>,
    pub(crate) parent: Option<KeySpaceId>,
    pub(crate) children: Vec<KeySpaceId>,
    bindings: HashMap<String, KeyDefinition>,
}

impl KeySpace {
    /// A scope named by the whitespace-separated `keyscope` list.
    pub fn new(id: impl Into<String>, keyscope: Option<&str>) -> Self {
        let mut space = Self {
            id: id.into(),
            keyscope_names: Vec::new(),
            parent: None,
            children: Vec::new(),
            bindings: HashMap::new(),
        };
        space.init_keyscope_names(keyscope);
        space
    }

    pub fn init_keyscope_names(&mut self, keyscope: Option<&str>) {
        self.keyscope_names = keyscope
            .map(|names| split_list(names).map(str::to_string).collect())
            .unwrap_or_default();
    }

    pub fn keyscope_names(&self) -> &[String] {
        &self.keyscope_names
    }

    pub fn parent(&self) -> Option<KeySpaceId> {
        self.parent
    }

    pub fn children(&self) -> &[KeySpaceId] {
        &self.children
    }

    pub(crate) fn add_child(&mut self, child: KeySpaceId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Bind `kd.key`, replacing any previous binding.
    pub fn set(&mut self, kd: KeyDefinition) {
        self.bindings.insert(kd.key.clone(), kd);
    }

    /// Binding of `key` in this scope only.
    pub fn get(&self, key: &str) -> Option<&KeyDefinition> {
        self.bindings.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.bindings.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Every binding, sorted by key.
    pub fn all(&self) -> Vec<&KeyDefinition> {
        let mut all: Vec<&KeyDefinition> = self.bindings.values().collect();
        all.sort();
        all
    }

    /// Write the bindings, one per line: derived keys in parentheses,
    /// followed by `=href"text"` when known.
    pub(crate) fn write_definitions(&self, f: &mut impl fmt::Write) -> fmt::Result {
        for kd in self.all() {
            f.write_str("  ")?;
            if kd.origin_depth > 0 {
                write!(f, "({})", kd.key)?;
            } else {
                f.write_str(&kd.key)?;
            }
            let href = kd.href();
            let text = kd.text();
            if href.is_some() || text.is_some() {
                f.write_char('=')?;
                if let Some(href) = href {
                    f.write_str(href)?;
                }
                if let Some(text) = text {
                    write!(f, "\"{}\"", abbreviate(text))?;
                }
            }
            f.write_char('\n')?;
        }
        Ok(())
    }
}

/// Texts longer than 40 characters keep their first 19 and last 18.
fn abbreviate(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= 40 {
        return text.to_string();
    }
    let head: String = chars[..19].iter().collect();
    let tail: String = chars[chars.len() - 18..].iter().collect();
    format!("{}...{}", head, tail)
}
