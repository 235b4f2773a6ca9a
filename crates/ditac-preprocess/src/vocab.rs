//! Names shared by every preprocessing stage.

use ditac_dom::QName;

/// Namespace of the attributes and elements added by the preprocessor.
pub const DITAC_NS: &str = "http://www.xmlmind.com/ditac/schema/ditac";
pub const DITAC_PREFIX: &str = "ditac";

/// Namespace of `ditaarch:DITAArchVersion`.
pub const DITAARCH_NS: &str = "http://dita.oasis-open.org/architecture/2005/";

/// Set on an element whose href was absolute in the source.
pub const ABSOLUTE_HREF: &str = "absoluteHref";
/// URL of the topic an element was copied from.
pub const COPY_OF: &str = "copyOf";
/// Id of the key space an element or a submap opens.
pub const KEY_SPACE: &str = "keySpace";

/// Opens a group of nodes copied from a submap.
pub const BEGIN_GROUP_PI: &str = "ditac-begin-group";
/// Closes the innermost open group.
pub const END_GROUP_PI: &str = "ditac-end-group";

/// Pseudo-attribute prefix carrying the key space id of a begin-group PI.
pub const KEY_SPACE_START: &str = "ditac:keySpace=\"";

/// Separates the segments of composite ids.
pub const ID_SEPARATOR: &str = "__";

/// Id of the root key space.
pub const ROOT_KEY_SPACE_ID: &str = "0";

pub fn ditac_name(local: &str) -> QName {
    QName::ns(DITAC_NS, DITAC_PREFIX, local)
}

/// Attributes moved from a key definition to a referencing element.
///
/// `(namespace, local name)`; `None` is no namespace.
pub const LINKING_ATTRIBUTES: [(Option<&str>, &str); 5] = [
    (None, "href"),
    (None, "scope"),
    (None, "format"),
    (Some(DITAC_NS), ABSOLUTE_HREF),
    (Some(DITAC_NS), COPY_OF),
];

/// Build the name of an entry of [`LINKING_ATTRIBUTES`].
pub fn linking_name(ns: Option<&str>, local: &str) -> QName {
    match ns {
        Some(_) => ditac_name(local),
        None => QName::local(local),
    }
}

/// Filter attributes every map and topic supports.
pub const BASE_FILTER_ATTRIBUTES: [&str; 5] = ["audience", "platform", "product", "otherprops", "props"];

/// Attributes supporting the `group(value ...)` syntax.
pub const GROUPED_FILTER_ATTRIBUTES: [&str; 4] = ["audience", "product", "platform", "otherprops"];
