/*
 * tests/pipeline.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * End-to-end tests of the preprocessing pipeline on in-memory documents.
 */

use ditac_diagnostics::DiagnosticSink;
use ditac_dom::{Document, ElementKind, NodeId};
use ditac_preprocess::{
    Filter, Filters, KeyDefinition, MemorySource, PreProcessor, Preprocessed, PreprocessOptions,
};
use std::rc::Rc;
use url::Url;

fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

fn run_with(options: PreprocessOptions, source: MemorySource, inputs: &[&str]) -> (Preprocessed, DiagnosticSink) {
    let sink = DiagnosticSink::new();
    let inputs: Vec<Url> = inputs.iter().map(|s| url(s)).collect();
    let out = PreProcessor::new(options, Rc::new(source), sink.clone())
        .run(&inputs)
        .unwrap();
    (out, sink)
}

fn run(source: MemorySource, inputs: &[&str]) -> (Preprocessed, DiagnosticSink) {
    run_with(PreprocessOptions::default(), source, inputs)
}

fn document<'a>(out: &'a Preprocessed, s: &str) -> &'a Document {
    &out.documents.get(&url(s)).unwrap().document
}

fn find(doc: &Document, local: &str) -> NodeId {
    doc.descendants(doc.root())
        .into_iter()
        .find(|&n| doc.local_name(n) == local)
        .unwrap()
}

fn find_all(doc: &Document, local: &str) -> Vec<NodeId> {
    doc.descendants(doc.root())
        .into_iter()
        .filter(|&n| doc.local_name(n) == local)
        .collect()
}

fn root_href<'a>(out: &'a Preprocessed, key: &str) -> Option<&'a str> {
    out.key_spaces
        .lookup_key_definition(out.key_spaces.root(), key)
        .and_then(KeyDefinition::href)
}

// ============================================================================
// Key references
// ============================================================================

fn key_source() -> MemorySource {
    MemorySource::new()
        .with(
            "file:///d/m.ditamap",
            r#"<map>
  <keydef keys="intro" href="topics/intro.dita"/>
  <keydef keys="gloss" href="gloss.dita"/>
  <topicref href="guide.dita"/>
</map>"#,
        )
        .with(
            "file:///d/topics/intro.dita",
            r#"<topic id="intro-topic"><title>Introduction</title></topic>"#,
        )
        .with(
            "file:///d/gloss.dita",
            r#"<topic id="glossary"><title>Glossary</title><body><p id="term1">Term</p></body></topic>"#,
        )
        .with(
            "file:///d/guide.dita",
            r#"<topic id="guide"><title>Guide</title><body>
<p>See <xref keyref="intro"/>.</p>
<p conkeyref="gloss/term1"/>
</body></topic>"#,
        )
}

#[test]
fn test_keyref_gets_href_and_title() {
    let (out, sink) = run(key_source(), &["file:///d/m.ditamap"]);
    let guide = document(&out, "file:///d/guide.dita");
    let xref = find(guide, "xref");
    assert_eq!(
        guide.attribute(xref, "href"),
        Some("file:///d/topics/intro.dita#intro-topic")
    );
    assert_eq!(guide.attribute(xref, "keyref"), None);
    assert_eq!(guide.text_content(xref), "Introduction");
    assert!(!sink.has_errors());
}

#[test]
fn test_conkeyref_becomes_conref() {
    let (out, _) = run(key_source(), &["file:///d/m.ditamap"]);
    let guide = document(&out, "file:///d/guide.dita");
    let p = find_all(guide, "p")[1];
    assert_eq!(guide.attribute(p, "conkeyref"), None);
    assert_eq!(
        guide.attribute(p, "conref"),
        Some("file:///d/gloss.dita#glossary/term1")
    );
}

#[test]
fn test_referenced_topics_are_loaded() {
    let (out, _) = run(key_source(), &["file:///d/m.ditamap"]);
    for topic in [
        "file:///d/guide.dita",
        "file:///d/gloss.dita",
        "file:///d/topics/intro.dita",
    ] {
        let loaded = out.documents.get(&url(topic)).unwrap();
        assert!(loaded.is_processed(), "{} not processed", topic);
    }
}

#[test]
fn test_keyref_chain_converges() {
    let source = MemorySource::new()
        .with(
            "file:///d/m.ditamap",
            r#"<map>
  <keydef keys="a" keyref="b"/>
  <keydef keys="b" keyref="c"/>
  <keydef keys="c" href="c.dita"/>
</map>"#,
        )
        .with("file:///d/c.dita", r#"<topic id="c"><title>C</title></topic>"#);
    let (out, sink) = run(source, &["file:///d/m.ditamap"]);
    for key in ["a", "b", "c"] {
        assert_eq!(root_href(&out, key), Some("file:///d/c.dita#c"), "key {}", key);
    }
    assert_eq!(sink.count_code("D-3-1"), 0);
}

// ============================================================================
// Key scopes
// ============================================================================

#[test]
fn test_scoped_key_is_visible_from_ancestors() {
    let source = MemorySource::new()
        .with(
            "file:///d/m.ditamap",
            r#"<map>
  <topicgroup keyscope="lib">
    <keydef keys="x" href="x.dita"/>
    <topicgroup keyscope="inner"><keydef keys="y" href="x.dita"/></topicgroup>
  </topicgroup>
</map>"#,
        )
        .with("file:///d/x.dita", r#"<topic id="x"><title>X</title></topic>"#);
    let (out, _) = run(source, &["file:///d/m.ditamap"]);
    assert_eq!(root_href(&out, "lib.x"), Some("file:///d/x.dita#x"));
    assert_eq!(root_href(&out, "lib.inner.y"), Some("file:///d/x.dita#x"));
    assert_eq!(root_href(&out, "x"), None);

    let lib = out.key_spaces.by_id("1").unwrap();
    assert_eq!(
        out.key_spaces
            .lookup_key_definition(lib, "inner.y")
            .and_then(KeyDefinition::href),
        Some("file:///d/x.dita#x")
    );
}

#[test]
fn test_ancestor_binding_shadows_scoped_one() {
    let source = MemorySource::new()
        .with(
            "file:///d/m.ditamap",
            r#"<map>
  <keydef keys="k" href="root.dita"/>
  <topicgroup keyscope="s">
    <keydef keys="k" href="inner.dita"/>
    <topicref keyref="k"/>
  </topicgroup>
</map>"#,
        )
        .with("file:///d/root.dita", r#"<topic id="r"><title>Root</title></topic>"#)
        .with("file:///d/inner.dita", r#"<topic id="i"><title>Inner</title></topic>"#);
    let (out, _) = run(source, &["file:///d/m.ditamap"]);
    let map = &out.map.document;
    let topicref = find(map, "topicref");
    assert!(map.is(topicref, ElementKind::TOPICREF));
    assert_eq!(map.attribute(topicref, "href"), Some("file:///d/root.dita#r"));
}

#[test]
fn test_submap_keys_are_scoped() {
    let source = MemorySource::new()
        .with(
            "file:///d/m.ditamap",
            r#"<map>
  <mapref href="sub.ditamap" keyscope="sub"/>
  <topicref href="t.dita"/>
</map>"#,
        )
        .with(
            "file:///d/sub.ditamap",
            r#"<map><keydef keys="k" href="k.dita"/></map>"#,
        )
        .with("file:///d/k.dita", r#"<topic id="k"><title>Key target</title></topic>"#)
        .with(
            "file:///d/t.dita",
            r#"<topic id="t"><title>T</title><body><p><xref keyref="sub.k"/></p></body></topic>"#,
        );
    let (out, sink) = run(source, &["file:///d/m.ditamap"]);

    let map = &out.map.document;
    assert!(find_all(map, "mapref").is_empty());
    let t = document(&out, "file:///d/t.dita");
    let xref = find(t, "xref");
    assert_eq!(t.attribute(xref, "href"), Some("file:///d/k.dita#k"));
    assert_eq!(t.text_content(xref), "Key target");
    assert!(!sink.has_errors());

    let dump = out.key_spaces.to_string();
    assert!(dump.contains("KeySpace[id=1, keyscope=sub, parent=0"), "{}", dump);
}

// ============================================================================
// Filtering
// ============================================================================

const INTERNAL_DITAVAL: &str = r#"<val><prop att="audience" val="internal" action="exclude"/></val>"#;

#[test]
fn test_token_set_excluded_only_when_all_tokens_are() {
    let source = MemorySource::new()
        .with("file:///d/internal.ditaval", INTERNAL_DITAVAL)
        .with(
            "file:///d/t.dita",
            r#"<topic id="t"><title>T</title><body>
<p audience="internal external">Both</p>
<p audience="internal">Internal</p>
<p>Everyone</p>
</body></topic>"#,
        );
    let options = PreprocessOptions {
        external_filter: Some("file:///d/internal.ditaval".to_string()),
        ..PreprocessOptions::default()
    };
    let (out, _) = run_with(options, source, &["file:///d/t.dita"]);
    let t = document(&out, "file:///d/t.dita");
    let texts: Vec<String> = find_all(t, "p").into_iter().map(|p| t.text_content(p)).collect();
    assert_eq!(texts, ["Both", "Everyone"]);
}

#[test]
fn test_grouped_values_exclude_precedence() {
    let map = r#"<map>
  <topicref href="a.dita" audience="novice expert"/>
</map>"#;
    let source = |profile: &str| {
        MemorySource::new()
            .with("file:///d/m.ditamap", map)
            .with("file:///d/a.dita", r#"<topic id="a"><title>A</title></topic>"#)
            .with("file:///d/p.ditaval", profile)
    };
    let options = PreprocessOptions {
        external_filter: Some("file:///d/p.ditaval".to_string()),
        ..PreprocessOptions::default()
    };

    let one = source(r#"<val><prop att="audience" val="novice" action="exclude"/></val>"#);
    let (out, _) = run_with(options.clone(), one, &["file:///d/m.ditamap"]);
    assert_eq!(find_all(&out.map.document, "topicref").len(), 1);

    let both = source(
        r#"<val>
<prop att="audience" val="novice" action="exclude"/>
<prop att="audience" val="expert" action="exclude"/>
</val>"#,
    );
    let (out, _) = run_with(options, both, &["file:///d/m.ditamap"]);
    assert!(find_all(&out.map.document, "topicref").is_empty());
}

#[test]
fn test_filter_map_is_idempotent() {
    let source = MemorySource::new().with("file:///d/internal.ditaval", INTERNAL_DITAVAL);
    let filter = Filter::load(&url("file:///d/internal.ditaval"), &source).unwrap();
    let mut filters = Filters::new(Rc::new(source), DiagnosticSink::new());
    filters.set_external_filter(Some(filter));

    let mut map = Document::parse(
        r#"<map>
<topicref href="a.dita" audience="internal"><topicref href="b.dita"/></topicref>
<topicref href="c.dita" audience="internal"/>
<topicref href="d.dita"><topicmeta><navtitle>D <ph audience="internal">secret</ph></navtitle></topicmeta></topicref>
</map>"#,
        Some(&url("file:///d/m.ditamap")),
    )
    .unwrap();
    filters.filter_map(&mut map);
    let once = map.subtree_to_string(map.root()).unwrap();
    filters.filter_map(&mut map);
    let twice = map.subtree_to_string(map.root()).unwrap();
    assert_eq!(once, twice);
    insta::assert_snapshot!(once, @r#"
    <map>
    <topicref audience="internal"><topicref href="b.dita"/></topicref>

    <topicref href="d.dita"><topicmeta><navtitle>D </navtitle></topicmeta></topicref>
    </map>
    "#);
}

// ============================================================================
// Href rewriting
// ============================================================================

#[test]
fn test_dot_fragment_names_the_enclosing_topic() {
    let source = MemorySource::new().with(
        "file:///d/t.dita",
        r##"<topic id="T"><title>T</title><body><p><xref href="#."/><xref href="#./child"/></p></body></topic>"##,
    );
    let (out, _) = run(source, &["file:///d/t.dita"]);
    assert!(out.is_auto_map);
    let t = document(&out, "file:///d/t.dita");
    let hrefs: Vec<&str> = find_all(t, "xref")
        .into_iter()
        .filter_map(|x| t.attribute(x, "href"))
        .collect();
    assert_eq!(hrefs, ["file:///d/t.dita#T", "file:///d/t.dita#T/child"]);
}
