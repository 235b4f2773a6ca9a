/*
 * class.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Element classification from the space-delimited class attribute.
 */

use crate::types::QName;

bitflags::bitflags! {
    /// Capabilities of an element, derived once from its class tokens.
    ///
    /// A specialized element carries every flag of the base classes it lists,
    /// so `<chapter class="- map/topicref bookmap/chapter ">` is a `TOPICREF`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ElementKind: u64 {
        const MAP = 1 << 0;
        const BOOKMAP = 1 << 1;
        const SUBJECT_SCHEME = 1 << 2;
        const TOPICREF = 1 << 3;
        const TOPICMETA = 1 << 4;
        const KEYDEF = 1 << 5;
        const MAPREF = 1 << 6;
        const DITAVALREF = 1 << 7;
        const RELTABLE = 1 << 8;
        const RELHEADER = 1 << 9;
        const RELROW = 1 << 10;
        const RELCELL = 1 << 11;
        const FRONTMATTER = 1 << 12;
        const BACKMATTER = 1 << 13;
        const TOPIC = 1 << 14;
        const TITLE = 1 << 15;
        const NAVTITLE = 1 << 16;
        const LINKTEXT = 1 << 17;
        const SEARCHTITLE = 1 << 18;
        const SHORTDESC = 1 << 19;
        const KEYWORDS = 1 << 20;
        const KEYWORD = 1 << 21;
        const METADATA = 1 << 22;
        const SECTION = 1 << 23;
        const EXAMPLE = 1 << 24;
        const TABLE = 1 << 25;
        const FIG = 1 << 26;
        const INDEXTERM = 1 << 27;
        const XREF = 1 << 28;
        const LINK = 1 << 29;
        const IMAGE = 1 << 30;
        const ALT = 1 << 31;
        const OBJECT = 1 << 32;
        const PARAM = 1 << 33;
        const DESC = 1 << 34;
        const DATA = 1 << 35;
        const FOREIGN = 1 << 36;
        const UNKNOWN = 1 << 37;
        const ABBREVIATED_FORM = 1 << 38;
        const MAPGROUP = 1 << 39;
    }
}

impl ElementKind {
    /// Kind of one class token such as `map/topicref`.
    fn for_token(token: &str) -> ElementKind {
        match token {
            "map/map" => ElementKind::MAP,
            "bookmap/bookmap" => ElementKind::BOOKMAP,
            "subjectScheme/subjectScheme" => ElementKind::SUBJECT_SCHEME,
            "map/topicref" => ElementKind::TOPICREF,
            "map/topicmeta" => ElementKind::TOPICMETA,
            "mapgroup-d/keydef" => ElementKind::KEYDEF | ElementKind::MAPGROUP,
            "mapgroup-d/mapref" => ElementKind::MAPREF | ElementKind::MAPGROUP,
            "ditavalref-d/ditavalref" => ElementKind::DITAVALREF,
            "map/reltable" => ElementKind::RELTABLE,
            "map/relheader" => ElementKind::RELHEADER,
            "map/relrow" => ElementKind::RELROW,
            "map/relcell" => ElementKind::RELCELL,
            "bookmap/frontmatter" => ElementKind::FRONTMATTER,
            "bookmap/backmatter" => ElementKind::BACKMATTER,
            "topic/topic" => ElementKind::TOPIC,
            "topic/title" => ElementKind::TITLE,
            "topic/navtitle" => ElementKind::NAVTITLE,
            "map/linktext" => ElementKind::LINKTEXT,
            "map/searchtitle" => ElementKind::SEARCHTITLE,
            "topic/shortdesc" | "map/shortdesc" => ElementKind::SHORTDESC,
            "topic/keywords" => ElementKind::KEYWORDS,
            "topic/keyword" => ElementKind::KEYWORD,
            "topic/metadata" => ElementKind::METADATA,
            "topic/section" => ElementKind::SECTION,
            "topic/example" => ElementKind::EXAMPLE,
            "topic/table" => ElementKind::TABLE,
            "topic/fig" => ElementKind::FIG,
            "topic/indexterm" => ElementKind::INDEXTERM,
            "topic/xref" => ElementKind::XREF,
            "topic/link" => ElementKind::LINK,
            "topic/image" => ElementKind::IMAGE,
            "topic/alt" => ElementKind::ALT,
            "topic/object" => ElementKind::OBJECT,
            "topic/param" => ElementKind::PARAM,
            "topic/desc" => ElementKind::DESC,
            "topic/data" => ElementKind::DATA,
            "topic/foreign" => ElementKind::FOREIGN,
            "topic/unknown" => ElementKind::UNKNOWN,
            "abbrev-d/abbreviated-form" => ElementKind::ABBREVIATED_FORM,
            other if other.starts_with("mapgroup-d/") => ElementKind::MAPGROUP,
            _ => ElementKind::empty(),
        }
    }

    /// Kind of a whole class attribute value.
    pub fn from_class(class: &str) -> ElementKind {
        class
            .split_ascii_whitespace()
            .fold(ElementKind::empty(), |kind, token| kind | Self::for_token(token))
    }

    /// Kind of an element given its name and optional explicit class.
    ///
    /// Namespaced elements (SVG, MathML, ditac extensions) never have a kind.
    pub fn for_element(name: &QName, class: Option<&str>) -> ElementKind {
        if name.ns.is_some() {
            return ElementKind::empty();
        }
        match class.or_else(|| default_class(&name.local)) {
            Some(class) => Self::from_class(class),
            None => ElementKind::empty(),
        }
    }
}

/// The class an element would receive from schema defaulting.
///
/// Documents are not validated, so elements lacking a class attribute get
/// the class of the vocabulary element with the same name.
pub fn default_class(local: &str) -> Option<&'static str> {
    let class = match local {
        // Maps.
        "map" => "- map/map ",
        "topicref" => "- map/topicref ",
        "topicmeta" => "- map/topicmeta ",
        "navref" => "- map/navref ",
        "anchor" => "- map/anchor ",
        "reltable" => "- map/reltable ",
        "relheader" => "- map/relheader ",
        "relcolspec" => "- map/relcolspec ",
        "relrow" => "- map/relrow ",
        "relcell" => "- map/relcell ",
        "linktext" => "- map/linktext ",
        "searchtitle" => "- map/searchtitle ",
        "shortdesc" => "- topic/shortdesc map/shortdesc ",
        "mapref" => "+ map/topicref mapgroup-d/mapref ",
        "keydef" => "+ map/topicref mapgroup-d/keydef ",
        "topicgroup" => "+ map/topicref mapgroup-d/topicgroup ",
        "topichead" => "+ map/topicref mapgroup-d/topichead ",
        "topicset" => "+ map/topicref mapgroup-d/topicset ",
        "topicsetref" => "+ map/topicref mapgroup-d/topicsetref ",
        "anchorref" => "+ map/topicref mapgroup-d/anchorref ",
        "ditavalref" => "+ map/topicref ditavalref-d/ditavalref ",
        "ditavalmeta" => "+ map/topicmeta ditavalref-d/ditavalmeta ",
        "dvrResourcePrefix" => "+ topic/data ditavalref-d/dvrResourcePrefix ",
        "dvrResourceSuffix" => "+ topic/data ditavalref-d/dvrResourceSuffix ",
        "dvrKeyscopePrefix" => "+ topic/data ditavalref-d/dvrKeyscopePrefix ",
        "dvrKeyscopeSuffix" => "+ topic/data ditavalref-d/dvrKeyscopeSuffix ",
        "glossref" => "+ map/topicref glossref-d/glossref ",
        // Bookmaps.
        "bookmap" => "- map/map bookmap/bookmap ",
        "bookmeta" => "- map/topicmeta bookmap/bookmeta ",
        "booktitle" => "- topic/title bookmap/booktitle ",
        "mainbooktitle" => "- topic/ph bookmap/mainbooktitle ",
        "booktitlealt" => "- topic/ph bookmap/booktitlealt ",
        "frontmatter" => "- map/topicref bookmap/frontmatter ",
        "backmatter" => "- map/topicref bookmap/backmatter ",
        "chapter" => "- map/topicref bookmap/chapter ",
        "part" => "- map/topicref bookmap/part ",
        "appendices" => "- map/topicref bookmap/appendices ",
        "appendix" => "- map/topicref bookmap/appendix ",
        "preface" => "- map/topicref bookmap/preface ",
        "notices" => "- map/topicref bookmap/notices ",
        "dedication" => "- map/topicref bookmap/dedication ",
        "colophon" => "- map/topicref bookmap/colophon ",
        "bookabstract" => "- map/topicref bookmap/bookabstract ",
        "amendments" => "- map/topicref bookmap/amendments ",
        "booklists" => "- map/topicref bookmap/booklists ",
        "toc" => "- map/topicref bookmap/toc ",
        "indexlist" => "- map/topicref bookmap/indexlist ",
        "glossarylist" => "- map/topicref bookmap/glossarylist ",
        // Subject schemes.
        "subjectScheme" => "- map/map subjectScheme/subjectScheme ",
        "subjectdef" => "- map/topicref subjectScheme/subjectdef ",
        // Topics.
        "topic" => "- topic/topic ",
        "concept" => "- topic/topic concept/concept ",
        "task" => "- topic/topic task/task ",
        "reference" => "- topic/topic reference/reference ",
        "troubleshooting" => "- topic/topic troubleshooting/troubleshooting ",
        "glossentry" => "- topic/topic concept/concept glossentry/glossentry ",
        "glossgroup" => "- topic/topic concept/concept glossgroup/glossgroup ",
        "body" => "- topic/body ",
        "conbody" => "- topic/body concept/conbody ",
        "taskbody" => "- topic/body task/taskbody ",
        "refbody" => "- topic/body reference/refbody ",
        "glossBody" => "- topic/section concept/section glossentry/glossBody ",
        "title" => "- topic/title ",
        "titlealts" => "- topic/titlealts ",
        "navtitle" => "- topic/navtitle ",
        "abstract" => "- topic/abstract ",
        "prolog" => "- topic/prolog ",
        "metadata" => "- topic/metadata ",
        "keywords" => "- topic/keywords ",
        "keyword" => "- topic/keyword ",
        "indexterm" => "- topic/indexterm ",
        "author" => "- topic/author ",
        "source" => "- topic/source ",
        "publisher" => "- topic/publisher ",
        "copyright" => "- topic/copyright ",
        "critdates" => "- topic/critdates ",
        "permissions" => "- topic/permissions ",
        "audience" => "- topic/audience ",
        "category" => "- topic/category ",
        "prodinfo" => "- topic/prodinfo ",
        "othermeta" => "- topic/othermeta ",
        "resourceid" => "- topic/resourceid ",
        "data" => "- topic/data ",
        "data-about" => "- topic/data-about ",
        "foreign" => "- topic/foreign ",
        "unknown" => "- topic/unknown ",
        "section" => "- topic/section ",
        "example" => "- topic/example ",
        "table" => "- topic/table ",
        "fig" => "- topic/fig ",
        "p" => "- topic/p ",
        "ph" => "- topic/ph ",
        "text" => "- topic/text ",
        "term" => "- topic/term ",
        "cite" => "- topic/cite ",
        "q" => "- topic/q ",
        "tm" => "- topic/tm ",
        "dt" => "- topic/dt ",
        "dd" => "- topic/dd ",
        "dl" => "- topic/dl ",
        "ul" => "- topic/ul ",
        "ol" => "- topic/ol ",
        "li" => "- topic/li ",
        "note" => "- topic/note ",
        "xref" => "- topic/xref ",
        "link" => "- topic/link ",
        "related-links" => "- topic/related-links ",
        "image" => "- topic/image ",
        "alt" => "- topic/alt ",
        "object" => "- topic/object ",
        "param" => "- topic/param ",
        "desc" => "- topic/desc ",
        "longdescref" => "- topic/longdescref ",
        "glossterm" => "- topic/title concept/title glossentry/glossterm ",
        "glossdef" => "- topic/abstract concept/abstract glossentry/glossdef ",
        "glossSurfaceForm" => "- topic/p concept/p glossentry/glossSurfaceForm ",
        "glossAlt" => "- topic/section concept/section glossentry/glossAlt ",
        "glossAbbreviation" => "- topic/title concept/title glossentry/glossAbbreviation ",
        "glossAcronym" => "- topic/title concept/title glossentry/glossAcronym ",
        "glossShortForm" => "- topic/title concept/title glossentry/glossShortForm ",
        "abbreviated-form" => "+ topic/term abbrev-d/abbreviated-form ",
        // Common domain elements.
        "b" => "+ topic/ph hi-d/b ",
        "i" => "+ topic/ph hi-d/i ",
        "u" => "+ topic/ph hi-d/u ",
        "codeph" => "+ topic/ph pr-d/codeph ",
        "codeblock" => "+ topic/pre pr-d/codeblock ",
        "apiname" => "+ topic/keyword pr-d/apiname ",
        "option" => "+ topic/keyword pr-d/option ",
        "parmname" => "+ topic/keyword pr-d/parmname ",
        "cmdname" => "+ topic/keyword sw-d/cmdname ",
        "varname" => "+ topic/keyword sw-d/varname ",
        "filepath" => "+ topic/ph sw-d/filepath ",
        "uicontrol" => "+ topic/ph ui-d/uicontrol ",
        "wintitle" => "+ topic/keyword ui-d/wintitle ",
        "svg-container" => "+ topic/foreign svg-d/svg-container ",
        "mathml" => "+ topic/foreign mathml-d/mathml ",
        _ => return None,
    };
    Some(class)
}

/// True if `class` lists `token` (e.g. `map/topicref`) among its tokens.
pub fn class_has_token(class: &str, token: &str) -> bool {
    class.split_ascii_whitespace().any(|t| t == token)
}
