//! sqlite-adapter — relational implementation of the `BookRepository` port.
//!
//! Purpose
//! - Persist books as rows of the `books` table keyed by the caller's integer id.
//! - Run every mutating operation inside an explicit transaction: begin, execute,
//!   commit on success, rollback on failure.
//! - Keep the connection lifecycle in an explicitly owned [`SqlitePool`] that the
//!   process entry point opens at startup and closes at shutdown.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - `title` is `NOT NULL` and non-empty; a book without one is rejected as a
//!   constraint violation.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use domain::{Book, BookRepository, CoreError};
use rusqlite::{ffi, params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, error, info, warn};

/// Owner of the SQLite connection shared by every relational unit of work.
pub struct SqlitePool {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
}

impl SqlitePool {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)
            .map_err(|e| CoreError::Connectivity(format!("sqlite open {}: {e}", path.display())))?;
        init_schema(&conn)?;
        info!(path = %path.display(), "sqlite pool opened");
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/library.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/library.db".to_string());
        if let Some(dir) = Path::new(&path).parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!(dir = %dir.display(), err = %e, "could not create database directory");
            }
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `work` against the connection. The unit of work is released when
    /// `work` returns, whatever the outcome.
    pub fn with_conn<T>(
        &self,
        work: impl FnOnce(&mut Connection) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        match guard.as_mut() {
            Some(conn) => work(conn),
            None => Err(CoreError::Connectivity("sqlite pool closed".into())),
        }
    }

    /// Close the underlying connection. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), CoreError> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| map_sqerr(e))?;
            info!(path = %self.path.display(), "sqlite pool closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().map(|g| g.is_none()).unwrap_or(true)
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS books (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL CHECK (title <> ''),
            author TEXT
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::Repository(format!("sqlite error: {e}"))
}

/// Classify failures of INSERT/DELETE statements.
fn map_write_err(e: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(err, msg) = &e {
        if err.code == ErrorCode::ConstraintViolation {
            return match err.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => {
                    CoreError::AlreadyExists
                }
                _ => CoreError::ConstraintViolation(
                    msg.clone().unwrap_or_else(|| e.to_string()),
                ),
            };
        }
    }
    map_sqerr(e)
}

fn row_to_book(row: &rusqlite::Row) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
    })
}

/// Relational book repository over a shared [`SqlitePool`].
#[derive(Clone)]
pub struct SqliteBookRepo {
    pool: Arc<SqlitePool>,
}

impl SqliteBookRepo {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }
}

impl BookRepository for SqliteBookRepo {
    fn find_all(&self) -> Result<Vec<Book>, CoreError> {
        let books = self.pool.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, title, author FROM books ORDER BY id")
                .map_err(map_sqerr)?;
            let rows = stmt.query_map([], row_to_book).map_err(map_sqerr)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sqerr)
        })?;
        info!(count = books.len(), backend = "relational", "found books");
        Ok(books)
    }

    fn save(&self, book: Book) -> Result<Book, CoreError> {
        let res = self.pool.with_conn(|conn| {
            let tx = conn.transaction().map_err(map_sqerr)?;
            let inserted = tx.execute(
                "INSERT INTO books(id, title, author) VALUES (?1, ?2, ?3)",
                params![book.id, book.title, book.author],
            );
            match inserted {
                Ok(_) => tx.commit().map_err(map_sqerr),
                Err(e) => {
                    if let Err(rb) = tx.rollback() {
                        warn!(err = %rb, "rollback failed");
                    }
                    Err(map_write_err(e))
                }
            }
        });
        match res {
            Ok(()) => {
                info!(book_id = book.id, backend = "relational", "saved book");
                Ok(book)
            }
            Err(e) => {
                error!(book_id = book.id, err = %e, "failed to save book");
                Err(e)
            }
        }
    }

    fn delete_by_id(&self, id: i64) -> Result<bool, CoreError> {
        let res = self.pool.with_conn(|conn| {
            let tx = conn.transaction().map_err(map_sqerr)?;
            let found: Result<Option<i64>, _> = tx
                .query_row("SELECT id FROM books WHERE id = ?1", params![id], |r| r.get(0))
                .optional();
            let outcome = match found {
                Ok(Some(_)) => tx
                    .execute("DELETE FROM books WHERE id = ?1", params![id])
                    .map(|_| true),
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            match outcome {
                // An absent row still commits the (empty) transaction
                Ok(deleted) => tx.commit().map(|_| deleted).map_err(map_sqerr),
                Err(e) => {
                    if let Err(rb) = tx.rollback() {
                        warn!(err = %rb, "rollback failed");
                    }
                    Err(map_write_err(e))
                }
            }
        });
        match res {
            Ok(true) => {
                info!(book_id = id, backend = "relational", "deleted book");
                Ok(true)
            }
            Ok(false) => {
                warn!(book_id = id, backend = "relational", "no book to delete");
                Ok(false)
            }
            Err(e) => {
                error!(book_id = id, err = %e, "failed to delete book");
                Err(e)
            }
        }
    }

    fn close(&self) -> Result<(), CoreError> {
        // The pool belongs to whoever opened it
        debug!(path = %self.pool.path().display(), "relational repository released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_pool() -> (Arc<SqlitePool>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let pool = SqlitePool::open(path).unwrap();
        (Arc::new(pool), dir)
    }

    #[test]
    fn save_then_find_all() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        let hobbit = Book::new(1, "The Hobbit", "J.R.R. Tolkien");
        let saved = repo.save(hobbit.clone()).unwrap();
        assert_eq!(saved, hobbit);
        assert_eq!(repo.find_all().unwrap(), vec![hobbit]);
    }

    #[test]
    fn find_all_orders_by_id() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        for id in [3, 1, 2] {
            repo.save(Book::new(id, format!("t{id}"), "a")).unwrap();
        }
        let ids: Vec<i64> = repo.find_all().unwrap().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn author_is_optional() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        let b = Book { id: 4, title: Some("Beowulf".into()), author: None };
        repo.save(b.clone()).unwrap();
        assert_eq!(repo.find_all().unwrap(), vec![b]);
    }

    #[test]
    fn missing_title_is_constraint_violation_and_rolled_back() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        let err = repo
            .save(Book { id: 1, title: None, author: Some("x".into()) })
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
        assert!(repo.find_all().unwrap().is_empty());
        // The connection is usable after the rollback
        repo.save(Book::new(1, "ok", "x")).unwrap();
    }

    #[test]
    fn empty_title_is_constraint_violation() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        let err = repo
            .save(Book { id: 1, title: Some(String::new()), author: None })
            .unwrap_err();
        assert!(matches!(err, CoreError::ConstraintViolation(_)));
        assert!(repo.find_all().unwrap().is_empty());
    }

    #[test]
    fn duplicate_id_conflict() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        repo.save(Book::new(1, "a", "x")).unwrap();
        let err = repo.save(Book::new(1, "b", "y")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
        assert_eq!(repo.find_all().unwrap()[0].title.as_deref(), Some("a"));
    }

    #[test]
    fn delete_true_once_then_false() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        repo.save(Book::new(1, "a", "x")).unwrap();
        repo.save(Book::new(2, "b", "y")).unwrap();
        assert!(repo.delete_by_id(1).unwrap());
        assert!(!repo.delete_by_id(1).unwrap());
        assert_eq!(repo.find_all().unwrap(), vec![Book::new(2, "b", "y")]);
    }

    #[test]
    fn delete_missing_is_false() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool);
        assert!(!repo.delete_by_id(99).unwrap());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");
        {
            let pool = Arc::new(SqlitePool::open(&path).unwrap());
            SqliteBookRepo::new(pool.clone())
                .save(Book::new(7, "Ulysses", "James Joyce"))
                .unwrap();
            pool.close().unwrap();
        }
        let pool = Arc::new(SqlitePool::open(&path).unwrap());
        let books = SqliteBookRepo::new(pool).find_all().unwrap();
        assert_eq!(books, vec![Book::new(7, "Ulysses", "James Joyce")]);
    }

    #[test]
    fn closed_pool_reports_connectivity() {
        let (pool, _dir) = tmp_pool();
        let repo = SqliteBookRepo::new(pool.clone());
        repo.close().unwrap();
        // Repository close leaves the pool to its owner
        assert!(repo.find_all().is_ok());

        pool.close().unwrap();
        pool.close().unwrap();
        assert!(pool.is_closed());
        assert!(matches!(repo.find_all(), Err(CoreError::Connectivity(_))));
        assert!(matches!(
            repo.save(Book::new(1, "a", "b")),
            Err(CoreError::Connectivity(_))
        ));
        assert!(matches!(repo.delete_by_id(1), Err(CoreError::Connectivity(_))));
    }
}
