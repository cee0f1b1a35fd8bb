use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::error::StoreError;

const MAX_ID_BYTES: usize = 1500;

static RESERVED_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^__.*__$").expect("valid regex"));

fn validate_id(kind: &str, id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::invalid(format!("{kind} id must not be empty")));
    }
    if id.len() > MAX_ID_BYTES {
        return Err(StoreError::invalid(format!(
            "{kind} id exceeds {MAX_ID_BYTES} bytes"
        )));
    }
    if id.contains('/') {
        return Err(StoreError::invalid(format!(
            "{kind} id must not contain '/': {id}"
        )));
    }
    if id == "." || id == ".." {
        return Err(StoreError::invalid(format!("{kind} id must not be '{id}'")));
    }
    if RESERVED_ID.is_match(id) {
        return Err(StoreError::invalid(format!("{kind} id is reserved: {id}")));
    }
    Ok(())
}

/// A named group of documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    id: String,
}

impl CollectionRef {
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        validate_id("collection", &id)?;
        Ok(Self { id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn doc(&self, id: impl Into<String>) -> Result<DocumentRef, StoreError> {
        DocumentRef::new(self.clone(), id)
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A single document inside a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    collection: CollectionRef,
    id: String,
}

impl DocumentRef {
    pub fn new(collection: CollectionRef, id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        validate_id("document", &id)?;
        Ok(Self { collection, id })
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_ids() {
        let boards = CollectionRef::new("boards").unwrap();
        let doc = boards.doc("abc123").unwrap();
        assert_eq!(doc.to_string(), "boards/abc123");
        assert_eq!(doc.collection().id(), "boards");
    }

    #[test]
    fn rejects_slashes_dots_and_reserved_names() {
        for bad in ["", "a/b", ".", "..", "__meta__"] {
            let err = CollectionRef::new(bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidArgument(_)), "{bad}");
        }
    }

    #[test]
    fn rejects_oversized_ids() {
        let boards = CollectionRef::new("boards").unwrap();
        assert!(boards.doc("x".repeat(1501)).is_err());
        assert!(boards.doc("x".repeat(1500)).is_ok());
    }
}
