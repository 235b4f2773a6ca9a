//! URL helpers: fragments, extensions and href rewriting.

use url::Url;

/// Parse `href` if it is an absolute URL, i.e. has a scheme.
///
/// Single-letter schemes are rejected so that `C:/doc.dita` is not taken
/// for a URL.
pub fn parse_absolute(href: &str) -> Option<Url> {
    let url = Url::parse(href).ok()?;
    (url.scheme().len() > 1).then_some(url)
}

/// Turn a command line argument, either a URL or a file path, into an
/// absolute URL. Relative paths are taken from the current directory.
pub fn from_path_or_url(arg: &str) -> Option<Url> {
    if let Some(url) = parse_absolute(arg) {
        return Some(url);
    }
    let path = std::path::absolute(arg).ok()?;
    Url::from_file_path(path).ok()
}

/// Resolve `href` against `base`.
pub fn resolve(base: &Url, href: &str) -> Option<Url> {
    match parse_absolute(href) {
        Some(url) => Some(url),
        None => base.join(href).ok(),
    }
}

pub fn without_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// The decoded fragment of `url`, if any and non-empty.
pub fn fragment(url: &Url) -> Option<String> {
    url.fragment().filter(|f| !f.is_empty()).map(decode)
}

/// The topic id part of a `#topic_id/element_id` fragment.
pub fn topic_id(url: &Url) -> Option<String> {
    let fragment = fragment(url)?;
    let id = match fragment.find('/') {
        Some(pos) => &fragment[..pos],
        None => fragment.as_str(),
    };
    (!id.is_empty()).then(|| id.to_string())
}

/// Lower-cased extension of the last path segment, without the dot.
pub fn extension(url: &Url) -> Option<String> {
    let segment = url.path().rsplit('/').next()?;
    let pos = segment.rfind('.')?;
    let ext = &segment[pos + 1..];
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

/// Replace the fragment of a URL string.
pub fn set_fragment(href: &str, fragment: &str) -> String {
    let base = match href.find('#') {
        Some(pos) => &href[..pos],
        None => href,
    };
    format!("{}#{}", base, quote_fragment(fragment))
}

/// Append `/id` to an existing fragment, or `#id` when there is none.
pub fn add_id(href: &str, id: &str) -> String {
    if href.contains('#') {
        format!("{}/{}", href, quote_fragment(id))
    } else {
        format!("{}#{}", href, quote_fragment(id))
    }
}

/// `url` as a string with `#id`, the way topic locations are keyed.
pub fn topic_location(url: &Url, topic_id: &str) -> String {
    format!("{}#{}", without_fragment(url), quote_fragment(topic_id))
}

fn is_fragment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~!$&'()*+,;=:@/?".contains(c)
}

/// Percent-encode the characters not allowed in a URL fragment.
pub fn quote_fragment(fragment: &str) -> String {
    let mut quoted = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if is_fragment_char(c) {
            quoted.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                quoted.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    quoted
}

/// Decode `%XX` escapes. Invalid escapes are kept as is.
pub fn decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let Some(byte) = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}
