use crate::{Backend, Book, BookRepository, CoreError};

/// Application service dispatching catalog operations to one of two adapters.
///
/// The backend is resolved from the caller's selector on every call and never
/// cached, so one service instance serves both datasets side by side. The
/// service holds no mutable state of its own; concurrency control is left to
/// the adapters.
pub struct BookService<R: BookRepository, D: BookRepository> {
    relational: R,
    document: D,
}

impl<R: BookRepository, D: BookRepository> BookService<R, D> {
    pub fn new(relational: R, document: D) -> Self {
        Self {
            relational,
            document,
        }
    }

    /// The adapter serving `backend`.
    pub fn repository(&self, backend: Backend) -> &dyn BookRepository {
        match backend {
            Backend::Relational => &self.relational,
            Backend::Document => &self.document,
        }
    }

    /// List every book held by the selected backend.
    pub fn list(&self, data_source: Option<&str>) -> Result<Vec<Book>, CoreError> {
        self.repository(Backend::from_tag(data_source)).find_all()
    }

    /// Persist a new book in the selected backend.
    pub fn add(&self, book: Book, data_source: Option<&str>) -> Result<Book, CoreError> {
        self.repository(Backend::from_tag(data_source)).save(book)
    }

    /// Delete by id; `Ok(false)` means nothing matched in the selected backend.
    pub fn delete(&self, id: i64, data_source: Option<&str>) -> Result<bool, CoreError> {
        self.repository(Backend::from_tag(data_source)).delete_by_id(id)
    }

    /// Close both adapters, reporting the first failure.
    pub fn close(&self) -> Result<(), CoreError> {
        let rel = self.relational.close();
        let doc = self.document.close();
        rel.and(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_repo::InMemoryRepo;

    fn svc() -> BookService<InMemoryRepo, InMemoryRepo> {
        BookService::new(InMemoryRepo::relational(), InMemoryRepo::document())
    }

    #[test]
    fn hobbit_scenario() {
        let svc = svc();
        let hobbit = Book::new(1, "The Hobbit", "J.R.R. Tolkien");
        svc.add(hobbit.clone(), Some("mysql")).unwrap();

        assert_eq!(svc.list(Some("mysql")).unwrap(), vec![hobbit]);
        assert!(svc.list(Some("mongo")).unwrap().is_empty());

        assert!(svc.delete(1, Some("mysql")).unwrap());
        assert!(!svc.delete(1, Some("mysql")).unwrap());
    }

    #[test]
    fn backends_are_isolated() {
        let svc = svc();
        svc.add(Book::new(5, "Dune", "Frank Herbert"), Some("MONGO")).unwrap();
        assert!(svc.list(None).unwrap().is_empty());
        assert_eq!(svc.list(Some("mongo")).unwrap().len(), 1);

        // Same id on the other backend is an independent record
        svc.add(Book::new(5, "Emma", "Jane Austen"), None).unwrap();
        assert_eq!(svc.list(Some("mysql")).unwrap()[0].title.as_deref(), Some("Emma"));
        assert_eq!(svc.list(Some("mongo")).unwrap()[0].title.as_deref(), Some("Dune"));

        assert!(svc.delete(5, Some("mongo")).unwrap());
        assert!(svc.list(Some("mongo")).unwrap().is_empty());
        assert_eq!(svc.list(Some("mysql")).unwrap().len(), 1);
    }

    #[test]
    fn unknown_tag_falls_back_to_relational() {
        let svc = svc();
        svc.add(Book::new(1, "a", "b"), Some("oracle")).unwrap();
        assert_eq!(svc.list(Some("mysql")).unwrap().len(), 1);
    }

    #[test]
    fn missing_title_depends_on_backend() {
        let svc = svc();
        let untitled = Book { id: 9, title: None, author: Some("anon".into()) };
        let err = svc.add(untitled.clone(), Some("mysql")).unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));

        let saved = svc.add(untitled, Some("mongo")).unwrap();
        assert!(saved.title.is_none());
    }

    #[test]
    fn find_all_is_idempotent() {
        let svc = svc();
        for i in 0..3 {
            svc.add(Book::new(i, format!("t{i}"), "a"), None).unwrap();
        }
        assert_eq!(svc.list(None).unwrap(), svc.list(None).unwrap());
    }

    #[test]
    fn delete_missing_leaves_rest_untouched() {
        let svc = svc();
        svc.add(Book::new(1, "a", "b"), Some("mongo")).unwrap();
        let before = svc.list(Some("mongo")).unwrap();
        assert!(!svc.delete(77, Some("mongo")).unwrap());
        assert_eq!(svc.list(Some("mongo")).unwrap(), before);
    }

    #[test]
    fn close_closes_both() {
        let svc = svc();
        svc.close().unwrap();
        assert!(matches!(svc.list(None), Err(CoreError::Connectivity(_))));
        assert!(matches!(svc.list(Some("mongo")), Err(CoreError::Connectivity(_))));
    }
}
