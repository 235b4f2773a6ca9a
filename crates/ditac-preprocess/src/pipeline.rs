/*
 * pipeline.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The preprocessing pipeline: from input files to a resolved, filtered map
 * and the topics it references.
 */

//! The preprocessing pipeline.
//!
//! ## Stages
//!
//! 1. **Preload**: parse every input; the first map is the main map
//! 2. **Keys**: collect the key spaces from a filtered, simplified copy of the map
//! 3. **Simplify**: inline submaps into the main map, resolving keys
//! 4. **Scopes**: associate each referenced topic with its key space
//! 5. **Resolve**: resolve references in every document, loading referenced topics
//! 6. **Filter**: apply the profiles to the map, then to the topics
//!
//! Without a map among the inputs, an automatic map referencing every input
//! is used and stages 2, 3 and the map filtering are skipped.

use crate::dita;
use crate::documents::{LoadedDocument, LoadedDocuments};
use crate::error::{PreprocessError, Result};
use crate::filter::{Filter, Filters};
use crate::keys::{KeyLoader, KeySpaces};
use crate::options::PreprocessOptions;
use crate::resolve::Resolver;
use crate::simplify::MapSimplifier;
use crate::source::DocumentSource;
use crate::uri;
use crate::vocab::{KEY_SPACE, ROOT_KEY_SPACE_ID, ditac_name};
use ditac_diagnostics::DiagnosticSink;
use ditac_dom::{Document, ElementKind, NodeId, QName};
use std::rc::Rc;
use std::time::Instant;
use url::Url;

/// File name of the map synthesized when no input is a map.
pub const AUTO_MAP_NAME: &str = "__MAP.ditamap";

/// Output of [`PreProcessor::run`].
pub struct Preprocessed {
    /// The simplified, resolved and filtered main map.
    pub map: LoadedDocument,
    /// Every other document of the run, resolved.
    pub documents: LoadedDocuments,
    pub key_spaces: KeySpaces,
    /// The filtering engine, holding the profiles loaded during the run.
    pub filters: Filters,
    /// True when `map` was synthesized from the inputs.
    pub is_auto_map: bool,
}

/// Runs the stages of one preprocessing run.
///
/// A `PreProcessor` may be reused: every call to [`PreProcessor::run`]
/// starts with a fresh document cache and fresh key spaces.
pub struct PreProcessor {
    options: PreprocessOptions,
    source: Rc<dyn DocumentSource>,
    sink: DiagnosticSink,
}

impl PreProcessor {
    pub fn new(options: PreprocessOptions, source: Rc<dyn DocumentSource>, sink: DiagnosticSink) -> Self {
        Self { options, source, sink }
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    pub fn run(&self, inputs: &[Url]) -> Result<Preprocessed> {
        let started = Instant::now();
        let external = self.load_external_filter()?;

        let mut docs = LoadedDocuments::new(Rc::clone(&self.source), self.sink.clone());
        docs.set_check_dita_version(self.options.check_dita_version);
        let mut main_map = None;
        for input in inputs {
            let loaded = docs.preload(input)?;
            if main_map.is_none() && loaded.doc_type.is_map() {
                main_map = Some(loaded.url.clone());
            }
        }

        let mut filters = Filters::new(Rc::clone(&self.source), self.sink.clone());
        let is_auto_map = main_map.is_none();
        let (map_url, key_spaces) = match main_map {
            Some(url) => {
                let key_spaces = self.load_keys(&url, &external, &mut filters, &mut docs)?;
                (url, key_spaces)
            }
            None => {
                tracing::info!(inputs = inputs.len(), "no map among inputs, using an automatic map");
                let (url, map) = auto_map(inputs, &docs)?;
                docs.put(&url, map, None)?;
                (url, KeySpaces::new())
            }
        };

        let mut map = docs
            .remove(&map_url)
            .ok_or_else(|| PreprocessError::load(&map_url, "map vanished from cache"))?;
        let mut key_spaces = key_spaces;
        key_spaces.map_topics_to_key_spaces(&map.document, &mut docs)?;

        tracing::info!("resolving references");
        let resolver = Resolver::new(Some(&key_spaces), self.sink.clone());
        let mut documents = docs.sibling();
        // The main map, unless automatic, was resolved by the simplifier.
        documents.insert(map, Some(&resolver));
        for loaded in docs.drain() {
            documents.insert(loaded, Some(&resolver));
        }
        map = documents
            .remove(&map_url)
            .ok_or_else(|| PreprocessError::load(&map_url, "map vanished from cache"))?;
        if !is_auto_map {
            load_topics(&map.document, map.document.root(), &mut documents, &resolver)?;
        }

        if !is_auto_map {
            tracing::info!("filtering map");
            let mut map_filter = self.media_filter(&external);
            if self.options.exclude_resource_only {
                map_filter.add_exclude_props(&[("processing-role", "resource-only")]);
            }
            filters.set_external_filter(Some(map_filter));
            filters.filter_map(&mut map.document);
        }

        if external.is_some() || contains_ditavalrefs(&map.document) {
            tracing::info!("filtering topics");
            filters.set_external_filter(external);
            filters.filter_topics(&map.document, &mut documents);
        } else {
            filters.set_external_filter(None);
        }

        tracing::info!(
            documents = documents.len(),
            key_spaces = key_spaces.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "preprocessing done"
        );
        Ok(Preprocessed {
            map,
            documents,
            key_spaces,
            filters,
            is_auto_map,
        })
    }

    fn load_external_filter(&self) -> Result<Option<Filter>> {
        let Some(location) = self.options.external_filter.as_deref() else {
            return Ok(None);
        };
        let url = uri::from_path_or_url(location)
            .ok_or_else(|| PreprocessError::load(location, "not a valid path or URL"))?;
        tracing::info!(url = %url, "loading filter");
        Filter::load(&url, self.source.as_ref()).map(Some)
    }

    /// The external profile, or an empty one, excluding what the target
    /// medium does not show.
    fn media_filter(&self, external: &Option<Filter>) -> Filter {
        let mut filter = external.clone().unwrap_or_default();
        filter.add_exclude_props(&[("print", self.options.media.excluded_print_value())]);
        filter
    }

    /// Build the key spaces of the map at `url`, then replace the cached map
    /// by its simplified form.
    fn load_keys(
        &self,
        url: &Url,
        external: &Option<Filter>,
        filters: &mut Filters,
        docs: &mut LoadedDocuments,
    ) -> Result<KeySpaces> {
        tracing::info!(url = %url, "loading keys");
        let map = docs
            .get(url)
            .map(|loaded| loaded.document.clone())
            .ok_or_else(|| PreprocessError::load(url, "map vanished from cache"))?;

        let mut loader = KeyLoader::new(self.sink.clone());
        loader.prepare_map(&map, url, docs)?;
        filters.set_external_filter(Some(self.media_filter(external)));
        loader.set_filters(Some(filters.clone()));
        let key_spaces = loader.create_key_spaces(docs)?;

        let simplified = MapSimplifier::new(docs, Some(&key_spaces)).simplify(map, url)?;
        docs.insert(simplified, None);
        Ok(key_spaces)
    }
}

/// A map with one topicref per input, for runs without a map.
fn auto_map(inputs: &[Url], docs: &LoadedDocuments) -> Result<(Url, Document)> {
    let base = std::env::current_dir()
        .ok()
        .and_then(|dir| Url::from_directory_path(dir).ok())
        .or_else(|| inputs.first().cloned())
        .ok_or_else(|| PreprocessError::Internal("no input to build a map from".to_string()))?;
    let url = base
        .join(AUTO_MAP_NAME)
        .map_err(|e| PreprocessError::load(AUTO_MAP_NAME, e))?;

    let mut map = Document::new(QName::local("map"));
    map.set_uri(Some(url.clone()));
    let root = map.root();
    map.set_attribute(root, "class", "- map/map ");
    if inputs.len() == 1 {
        map.set_attribute(root, "chunk", "to-content");
    }
    map.set_attribute_qname(root, ditac_name(KEY_SPACE), ROOT_KEY_SPACE_ID);

    for input in inputs {
        let href = docs
            .get(input)
            .map(|loaded| loaded.url.to_string())
            .unwrap_or_else(|| uri::without_fragment(input).to_string());
        let topicref = map.create_element(QName::local("topicref"));
        map.set_attribute(topicref, "class", "- map/topicref ");
        map.set_attribute(topicref, "href", href);
        map.append_child(root, topicref);
    }
    Ok((url, map))
}

/// Load and resolve every local topic referenced below `element`.
fn load_topics(
    map: &Document,
    element: NodeId,
    documents: &mut LoadedDocuments,
    resolver: &Resolver<'_>,
) -> Result<()> {
    for child in map.child_elements(element).collect::<Vec<_>>() {
        if map.is(child, ElementKind::TOPICREF)
            && let Some(url) = dita::local_topic_url(map, child)
        {
            let loaded = documents.load(&url, Some(resolver))?;
            if !loaded.doc_type.has_topics() {
                return Err(PreprocessError::NotATopic {
                    url: loaded.url.to_string(),
                    location: Some(map.location(child)),
                });
            }
        }
        load_topics(map, child, documents, resolver)?;
    }
    Ok(())
}

fn contains_ditavalrefs(map: &Document) -> bool {
    map.descendants(map.root())
        .into_iter()
        .any(|element| dita::is_ditavalref(map, element))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Media;
    use crate::source::MemorySource;

    fn run(options: PreprocessOptions, source: MemorySource, inputs: &[&str]) -> (Result<Preprocessed>, DiagnosticSink) {
        let sink = DiagnosticSink::new();
        let inputs: Vec<Url> = inputs.iter().map(|s| Url::parse(s).unwrap()).collect();
        let result = PreProcessor::new(options, Rc::new(source), sink.clone()).run(&inputs);
        (result, sink)
    }

    fn topicref_hrefs(map: &LoadedDocument) -> Vec<String> {
        let doc = &map.document;
        doc.descendants(doc.root())
            .into_iter()
            .filter(|&e| doc.is(e, ElementKind::TOPICREF))
            .filter_map(|e| doc.attribute(e, "href").map(str::to_string))
            .collect()
    }

    #[test]
    fn test_auto_map_for_topic_inputs() {
        let source = MemorySource::new()
            .with("file:///d/a.dita", r#"<topic id="a"><title>A</title></topic>"#)
            .with("file:///d/b.dita", r#"<topic id="b"><title>B</title></topic>"#);
        let (result, sink) = run(
            PreprocessOptions::default(),
            source,
            &["file:///d/a.dita", "file:///d/b.dita"],
        );
        let out = result.unwrap();
        assert!(out.is_auto_map);
        assert!(out.map.url.as_str().ends_with(AUTO_MAP_NAME));
        assert_eq!(topicref_hrefs(&out.map), ["file:///d/a.dita", "file:///d/b.dita"]);
        assert_eq!(out.documents.len(), 2);
        assert!(out.documents.iter().all(LoadedDocument::is_processed));
        assert!(!sink.has_errors());
    }

    #[test]
    fn test_media_exclusion() {
        let source = MemorySource::new()
            .with(
                "file:///d/m.ditamap",
                r#"<map>
<topicref href="screen.dita" print="no"/>
<topicref href="print.dita" print="printonly"/>
<topicref href="lib.dita" processing-role="resource-only"/>
</map>"#,
            )
            .with("file:///d/screen.dita", r#"<topic id="s"/>"#)
            .with("file:///d/print.dita", r#"<topic id="p"/>"#)
            .with("file:///d/lib.dita", r#"<topic id="l"/>"#);

        let (screen, _) = run(PreprocessOptions::default(), source.clone(), &["file:///d/m.ditamap"]);
        assert_eq!(topicref_hrefs(&screen.unwrap().map), ["file:///d/screen.dita"]);

        let print = PreprocessOptions {
            media: Media::Print,
            exclude_resource_only: false,
            ..PreprocessOptions::default()
        };
        let (print, _) = run(print, source, &["file:///d/m.ditamap"]);
        assert_eq!(
            topicref_hrefs(&print.unwrap().map),
            ["file:///d/print.dita", "file:///d/lib.dita"]
        );
    }

    #[test]
    fn test_topicref_to_a_map_file_is_not_a_topic() {
        let source = MemorySource::new()
            .with("file:///d/m.ditamap", r#"<map><topicref href="other.dita"/></map>"#)
            .with("file:///d/other.dita", r#"<map/>"#);
        let (result, _) = run(PreprocessOptions::default(), source, &["file:///d/m.ditamap"]);
        assert!(matches!(result, Err(PreprocessError::NotATopic { .. })));
    }

    #[test]
    fn test_missing_external_filter_aborts() {
        let source = MemorySource::new().with("file:///d/m.ditamap", "<map/>");
        let options = PreprocessOptions {
            external_filter: Some("file:///d/none.ditaval".to_string()),
            ..PreprocessOptions::default()
        };
        let (result, _) = run(options, source, &["file:///d/m.ditamap"]);
        assert!(matches!(result, Err(PreprocessError::Load { .. })));
    }
}
