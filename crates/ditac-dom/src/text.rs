//! XML text helpers: whitespace lists, token sets and name checks.

/// XML whitespace: space, tab, carriage return and line feed.
pub fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Split a whitespace-separated list such as a `keys` or `audience` value.
pub fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(is_xml_space).filter(|token| !token.is_empty())
}

/// Replace runs of XML whitespace by single spaces and trim both ends.
pub fn collapse_whitespace(text: &str) -> String {
    split_list(text).collect::<Vec<_>>().join(" ")
}

/// Ordered union of two token lists; tokens of `base` come first.
///
/// ```
/// use ditac_dom::text::merge_tokens;
///
/// assert_eq!(merge_tokens("a b", "b c"), "a b c");
/// ```
pub fn merge_tokens(base: &str, extra: &str) -> String {
    let mut tokens: Vec<&str> = Vec::new();
    for token in split_list(base).chain(split_list(extra)) {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.join(" ")
}

fn is_name_start_char(c: char) -> bool {
    c == ':'
        || c == '_'
        || c.is_ascii_alphabetic()
        || matches!(c,
            '\u{C0}'..='\u{D6}'
            | '\u{D8}'..='\u{F6}'
            | '\u{F8}'..='\u{2FF}'
            | '\u{370}'..='\u{37D}'
            | '\u{37F}'..='\u{1FFF}'
            | '\u{200C}'..='\u{200D}'
            | '\u{2070}'..='\u{218F}'
            | '\u{2C00}'..='\u{2FEF}'
            | '\u{3001}'..='\u{D7FF}'
            | '\u{F900}'..='\u{FDCF}'
            | '\u{FDF0}'..='\u{FFFD}'
            | '\u{10000}'..='\u{EFFFF}')
}

fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || c == '-'
        || c == '.'
        || c.is_ascii_digit()
        || matches!(c, '\u{B7}' | '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}')
}

/// True if `s` matches the XML `Nmtoken` production.
pub fn is_nmtoken(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_name_char)
}

/// True if `s` matches the XML `Name` production.
pub fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => is_name_start_char(first) && chars.all(is_name_char),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_ignores_runs_of_space() {
        let tokens: Vec<_> = split_list("  a\tb\n\nc ").collect();
        assert_eq!(tokens, vec!["a", "b", "c"]);
        assert_eq!(split_list("   ").count(), 0);
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("\n  Getting\n   started  "), "Getting started");
    }

    #[test]
    fn test_merge_tokens_keeps_order_and_dedups() {
        assert_eq!(merge_tokens("", "x"), "x");
        assert_eq!(merge_tokens("admin user", "user novice admin"), "admin user novice");
    }

    #[test]
    fn test_names() {
        assert!(is_name("intro-topic"));
        assert!(!is_name("1intro"));
        assert!(is_nmtoken("1intro"));
        assert!(!is_nmtoken("a b"));
        assert!(!is_nmtoken(""));
    }
}
