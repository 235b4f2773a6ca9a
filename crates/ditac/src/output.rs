/*
 * output.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Writing preprocessed documents to an output directory.
 */

use anyhow::{Context, Result};
use ditac_preprocess::{LoadedDocument, Preprocessed};
use std::path::{Path, PathBuf};

/// Write the map and every loaded document below `dir`.
///
/// Paths mirror the input layout relative to the deepest directory shared
/// by all local documents. Documents not read from a file are skipped, and
/// so is an automatic map.
pub fn write_documents(preprocessed: &Preprocessed, dir: &Path) -> Result<Vec<PathBuf>> {
    let documents: Vec<(&LoadedDocument, PathBuf)> = std::iter::once(&preprocessed.map)
        .filter(|_| !preprocessed.is_auto_map)
        .chain(preprocessed.documents.iter())
        .filter_map(|loaded| loaded.url.to_file_path().ok().map(|path| (loaded, path)))
        .collect();
    let base = common_base(documents.iter().map(|(_, path)| path.as_path()));

    let mut written = Vec::with_capacity(documents.len());
    for (loaded, path) in documents {
        let relative = match base.as_deref().and_then(|base| path.strip_prefix(base).ok()) {
            Some(relative) => relative.to_path_buf(),
            None => PathBuf::from(path.file_name().unwrap_or_default()),
        };
        let target = dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        let xml = loaded
            .document
            .to_xml_string()
            .with_context(|| format!("Cannot serialize {}", loaded.url))?;
        std::fs::write(&target, xml).with_context(|| format!("Cannot write {}", target.display()))?;
        tracing::debug!(path = %target.display(), "wrote document");
        written.push(target);
    }
    Ok(written)
}

/// Deepest directory containing every path.
fn common_base<'a>(paths: impl Iterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut base: Option<PathBuf> = None;
    for path in paths {
        let parent = path.parent()?;
        base = Some(match base {
            None => parent.to_path_buf(),
            Some(base) => parent
                .ancestors()
                .find(|ancestor| base.starts_with(ancestor))?
                .to_path_buf(),
        });
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_base() {
        let paths = [
            Path::new("/d/maps/m.ditamap"),
            Path::new("/d/topics/a.dita"),
            Path::new("/d/topics/sub/b.dita"),
        ];
        assert_eq!(common_base(paths.into_iter()), Some(PathBuf::from("/d")));
        assert_eq!(
            common_base([Path::new("/d/topics/a.dita")].into_iter()),
            Some(PathBuf::from("/d/topics"))
        );
        assert_eq!(common_base(std::iter::empty()), None);
    }
}
