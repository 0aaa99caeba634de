//! One directory per collection, one `<id>.json` file per document.
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a
//! reader never sees a half-written document.

use std::fs;
use std::path::{Path, PathBuf};

use super::document::Document;
use super::error::{NoSqlError, Result};

const DOC_EXT: &str = "json";
const TMP_EXT: &str = "tmp";

pub struct Collection {
    pub name: String,
    path: PathBuf,
}

impl Collection {
    pub fn open(base_path: &Path, name: &str) -> Result<Self> {
        let collection = Self::at(base_path, name)?;
        if !collection.path.is_dir() {
            return Err(NoSqlError::CollectionNotFound(name.to_string()));
        }
        Ok(collection)
    }

    /// Open `name`, creating its directory on first use
    pub fn open_or_create(base_path: &Path, name: &str) -> Result<Self> {
        let collection = Self::at(base_path, name)?;
        if !collection.path.is_dir() {
            fs::create_dir_all(&collection.path)?;
            tracing::debug!(collection = name, "created collection");
        }
        Ok(collection)
    }

    fn at(base_path: &Path, name: &str) -> Result<Self> {
        if !is_collection_name(name) {
            return Err(NoSqlError::InvalidCollectionName(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            path: base_path.join(name),
        })
    }

    fn doc_path(&self, id: &str) -> Result<PathBuf> {
        if !is_document_id(id) {
            return Err(NoSqlError::InvalidDocumentId(id.to_string()));
        }
        Ok(self.path.join(format!("{}.{}", id, DOC_EXT)))
    }

    fn write(&self, path: &Path, doc: &Document) -> Result<()> {
        let tmp = path.with_extension(TMP_EXT);
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn insert(&self, doc: &Document) -> Result<()> {
        let path = self.doc_path(&doc.id)?;
        if path.exists() {
            return Err(NoSqlError::DuplicateId(doc.id.clone()));
        }
        self.write(&path, doc)
    }

    pub fn get(&self, id: &str) -> Result<Document> {
        let path = self.existing(id)?;
        Ok(serde_json::from_slice(&fs::read(path)?)?)
    }

    /// Overwrite a stored document; it must already exist
    pub fn replace(&self, doc: &Document) -> Result<()> {
        let path = self.existing(&doc.id)?;
        self.write(&path, doc)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        fs::remove_file(self.existing(id)?)?;
        Ok(())
    }

    fn existing(&self, id: &str) -> Result<PathBuf> {
        let path = self.doc_path(id)?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(NoSqlError::DocumentNotFound(id.to_string()))
        }
    }

    /// Stored ids in lexical order
    pub fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            if !path.is_file() || !path.extension().is_some_and(|ext| ext == DOC_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                ids.push(stem.to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn all(&self) -> Result<Vec<Document>> {
        self.list_ids()?.iter().map(|id| self.get(id)).collect()
    }
}

/// `[A-Za-z0-9_]+`, not starting with `_`
fn is_collection_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('_') && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Ids become file names: no separators, no leading dot.
pub(crate) fn is_document_id(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
