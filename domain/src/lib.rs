//! Domain library for the library catalog.
//!
//! This crate stays free of IO and adapter dependencies (serde only) and holds
//! the book entity, the backend selector, the repository port and the error
//! definitions. Storage engines live in the adapter crates.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A single catalog record. The id is assigned by the caller, never generated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    /// Required by the relational schema; the document store accepts `None`.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl Book {
    pub fn new<T: Into<String>, A: Into<String>>(id: i64, title: T, author: A) -> Self {
        Self {
            id,
            title: Some(title.into()),
            author: Some(author.into()),
        }
    }
}

impl Display for Book {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Book #{}: '{}' by '{}'",
            self.id,
            self.title.as_deref().unwrap_or(""),
            self.author.as_deref().unwrap_or("")
        )
    }
}

/// Which persistence adapter serves a call.
///
/// The two backends hold independent datasets; the same id may exist in both.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    Relational,
    Document,
}

impl Backend {
    pub const RELATIONAL_TAG: &'static str = "mysql";
    pub const DOCUMENT_TAG: &'static str = "mongo";

    /// Map a caller-supplied selector to a backend.
    ///
    /// Only `"mongo"` (any case) selects the document store; every other value,
    /// including none at all, falls back to the relational store.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(t) if t.trim().eq_ignore_ascii_case(Self::DOCUMENT_TAG) => Backend::Document,
            _ => Backend::Relational,
        }
    }

    /// Wire tag for this backend.
    pub fn tag(&self) -> &'static str {
        match self {
            Backend::Relational => Self::RELATIONAL_TAG,
            Backend::Document => Self::DOCUMENT_TAG,
        }
    }
}

impl Display for Backend {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Repository port implemented by every storage adapter.
pub trait BookRepository: Send + Sync {
    /// Every persisted book, in backend-native order.
    fn find_all(&self) -> Result<Vec<Book>, CoreError>;
    /// Insert a new record and return what was persisted.
    fn save(&self, book: Book) -> Result<Book, CoreError>;
    /// Remove the record with `id`. `Ok(false)` when nothing matched.
    fn delete_by_id(&self, id: i64) -> Result<bool, CoreError>;
    /// Release adapter-held resources. Idempotent.
    fn close(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

impl<T: BookRepository + ?Sized> BookRepository for Box<T> {
    fn find_all(&self) -> Result<Vec<Book>, CoreError> {
        (**self).find_all()
    }
    fn save(&self, book: Book) -> Result<Book, CoreError> {
        (**self).save(book)
    }
    fn delete_by_id(&self, id: i64) -> Result<bool, CoreError> {
        (**self).delete_by_id(id)
    }
    fn close(&self) -> Result<(), CoreError> {
        (**self).close()
    }
}

impl<T: BookRepository + ?Sized> BookRepository for Arc<T> {
    fn find_all(&self) -> Result<Vec<Book>, CoreError> {
        (**self).find_all()
    }
    fn save(&self, book: Book) -> Result<Book, CoreError> {
        (**self).save(book)
    }
    fn delete_by_id(&self, id: i64) -> Result<bool, CoreError> {
        (**self).delete_by_id(id)
    }
    fn close(&self) -> Result<(), CoreError> {
        (**self).close()
    }
}

/// Core domain errors (no external error crates to keep deps at zero).
#[derive(Debug)]
pub enum CoreError {
    /// A record with the same id already exists in the selected backend.
    AlreadyExists,
    /// The record violates a backend constraint (e.g. missing title).
    ConstraintViolation(String),
    /// The backend could not be reached or its pool was closed.
    Connectivity(String),
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::AlreadyExists => write!(f, "resource already exists"),
            CoreError::ConstraintViolation(msg) => write!(f, "constraint violation: {}", msg),
            CoreError::Connectivity(msg) => write!(f, "backend unreachable: {}", msg),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for the binaries to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - library catalog domain", pkg, ver)
}

pub mod adapters;
pub mod service;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_defaults_to_relational() {
        assert_eq!(Backend::from_tag(None), Backend::Relational);
        assert_eq!(Backend::from_tag(Some("mysql")), Backend::Relational);
        assert_eq!(Backend::from_tag(Some("")), Backend::Relational);
        assert_eq!(Backend::from_tag(Some("postgres")), Backend::Relational);
    }

    #[test]
    fn backend_mongo_is_case_insensitive() {
        assert_eq!(Backend::from_tag(Some("mongo")), Backend::Document);
        assert_eq!(Backend::from_tag(Some("MONGO")), Backend::Document);
        assert_eq!(Backend::from_tag(Some("MoNgO")), Backend::Document);
        assert_eq!(Backend::from_tag(Some(" mongo ")), Backend::Document);
        // Only the exact tag selects the document store
        assert_eq!(Backend::from_tag(Some("mongodb")), Backend::Relational);
    }

    #[test]
    fn backend_tags_round_trip() {
        for b in [Backend::Relational, Backend::Document] {
            assert_eq!(Backend::from_tag(Some(b.tag())), b);
        }
    }

    #[test]
    fn book_deserializes_without_optional_fields() {
        let b: Book = serde_json::from_str("{\"id\":7}").unwrap();
        assert_eq!(b.id, 7);
        assert!(b.title.is_none());
        assert!(b.author.is_none());
    }

    #[test]
    fn book_display() {
        let b = Book::new(1, "The Hobbit", "J.R.R. Tolkien");
        assert_eq!(b.to_string(), "Book #1: 'The Hobbit' by 'J.R.R. Tolkien'");
    }
}
