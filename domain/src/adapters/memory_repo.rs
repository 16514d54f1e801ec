use std::sync::Mutex;

use crate::{Book, BookRepository, CoreError};

/// Which storage rules an [`InMemoryRepo`] mimics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flavor {
    /// Title required, results ordered by id.
    Relational,
    /// Title optional, results in insertion order.
    Document,
}

/// Simple in-memory repository for tests. Not built for high concurrency
/// beyond the internal mutex guarding the records.
pub struct InMemoryRepo {
    flavor: Flavor,
    inner: Mutex<Vec<Book>>,
    closed: Mutex<bool>,
}

impl InMemoryRepo {
    /// Behaves like the relational adapter: NOT NULL title, primary key on id.
    pub fn relational() -> Self {
        Self::with_flavor(Flavor::Relational)
    }

    /// Behaves like the document adapter: any title, unique index on id.
    pub fn document() -> Self {
        Self::with_flavor(Flavor::Document)
    }

    fn with_flavor(flavor: Flavor) -> Self {
        Self {
            flavor,
            inner: Mutex::new(Vec::new()),
            closed: Mutex::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        let closed = self
            .closed
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        if *closed {
            return Err(CoreError::Connectivity("in-memory repository closed".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::relational()
    }
}

impl BookRepository for InMemoryRepo {
    fn find_all(&self) -> Result<Vec<Book>, CoreError> {
        self.ensure_open()?;
        let books = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let mut out = books.clone();
        if self.flavor == Flavor::Relational {
            out.sort_by_key(|b| b.id);
        }
        Ok(out)
    }

    fn save(&self, book: Book) -> Result<Book, CoreError> {
        self.ensure_open()?;
        if self.flavor == Flavor::Relational {
            match book.title.as_deref() {
                None => return Err(CoreError::ConstraintViolation("title must not be null".into())),
                Some("") => return Err(CoreError::ConstraintViolation("title must not be empty".into())),
                Some(_) => {}
            }
        }
        let mut books = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        if books.iter().any(|b| b.id == book.id) {
            return Err(CoreError::AlreadyExists);
        }
        books.push(book.clone());
        Ok(book)
    }

    fn delete_by_id(&self, id: i64) -> Result<bool, CoreError> {
        self.ensure_open()?;
        let mut books = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        match books.iter().position(|b| b.id == id) {
            Some(idx) => {
                books.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn close(&self) -> Result<(), CoreError> {
        let mut closed = self
            .closed
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        *closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relational_orders_by_id() {
        let repo = InMemoryRepo::relational();
        repo.save(Book::new(3, "c", "x")).unwrap();
        repo.save(Book::new(1, "a", "x")).unwrap();
        repo.save(Book::new(2, "b", "x")).unwrap();
        let ids: Vec<i64> = repo.find_all().unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn document_keeps_insertion_order() {
        let repo = InMemoryRepo::document();
        repo.save(Book::new(3, "c", "x")).unwrap();
        repo.save(Book::new(1, "a", "x")).unwrap();
        let ids: Vec<i64> = repo.find_all().unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn relational_rejects_missing_title() {
        let repo = InMemoryRepo::relational();
        let err = repo
            .save(Book { id: 1, title: None, author: None })
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
        assert!(repo.find_all().unwrap().is_empty());
    }

    #[test]
    fn relational_rejects_empty_title() {
        let repo = InMemoryRepo::relational();
        let err = repo
            .save(Book { id: 1, title: Some(String::new()), author: None })
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
        assert!(repo.find_all().unwrap().is_empty());

        let doc = InMemoryRepo::document();
        doc.save(Book { id: 1, title: Some(String::new()), author: None })
            .unwrap();
    }

    #[test]
    fn document_accepts_missing_title() {
        let repo = InMemoryRepo::document();
        let saved = repo
            .save(Book { id: 1, title: None, author: None })
            .unwrap();
        assert_eq!(repo.find_all().unwrap(), vec![saved]);
    }

    #[test]
    fn duplicate_id_conflicts() {
        for repo in [InMemoryRepo::relational(), InMemoryRepo::document()] {
            repo.save(Book::new(1, "a", "x")).unwrap();
            let err = repo.save(Book::new(1, "b", "y")).unwrap_err();
            assert!(matches!(err, CoreError::AlreadyExists));
        }
    }

    #[test]
    fn delete_reports_presence() {
        let repo = InMemoryRepo::relational();
        repo.save(Book::new(1, "a", "x")).unwrap();
        repo.save(Book::new(2, "b", "y")).unwrap();
        assert!(repo.delete_by_id(1).unwrap());
        assert!(!repo.delete_by_id(1).unwrap());
        assert!(!repo.delete_by_id(42).unwrap());
        assert_eq!(repo.find_all().unwrap(), vec![Book::new(2, "b", "y")]);
    }

    #[test]
    fn closed_repo_reports_connectivity() {
        let repo = InMemoryRepo::document();
        repo.close().unwrap();
        repo.close().unwrap();
        assert!(matches!(repo.find_all(), Err(CoreError::Connectivity(_))));
    }
}
