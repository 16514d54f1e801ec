//! MongoDB adapter implementing the `BookRepository` port.
//!
//! - Stores books as documents `{id, title, author}` in a single collection
//!   (default `books`), with a unique index on `id`.
//! - The client lives in an explicitly owned [`MongoPool`]; the process entry
//!   point connects it at startup and closes it at shutdown.
//! - Provides `from_env()` wiring using `MONGODB_URI`, `MONGODB_DATABASE` and
//!   `MONGODB_COLLECTION`.
//!
//! Notes:
//! - The domain `BookRepository` trait is synchronous. We bridge to the async
//!   driver using an internal `tokio::runtime::Runtime` and `block_on`, or the
//!   ambient runtime when constructed inside one.
//! - Documents with malformed fields are mapped leniently (defaults) and logged
//!   rather than failing the whole scan.

use std::future::Future;
use std::sync::{Arc, Mutex};

use domain::{Book, BookRepository, CoreError};
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use tracing::{debug, error, info, warn};

const DUPLICATE_KEY: i32 = 11000;

/// Owner of the MongoDB client shared by every document repository.
///
/// Supports both standalone mode (creates its own Tokio runtime) and embedded
/// mode (reuses the runtime it was constructed in via `Handle::current()`).
pub struct MongoPool {
    database: String,
    client: Mutex<Option<Client>>,
    // None when constructed inside a runtime (reuses it)
    rt: Option<Arc<tokio::runtime::Runtime>>,
}

impl MongoPool {
    /// Connect to `uri` and ping the deployment before handing out the pool.
    pub fn connect(uri: &str, database: impl Into<String>) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        let database = database.into();
        let fut = async {
            let opts = ClientOptions::parse(uri).await.map_err(map_driver_err)?;
            let client = Client::with_options(opts).map_err(map_driver_err)?;
            client
                .database("admin")
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(map_driver_err)?;
            Ok::<_, CoreError>(client)
        };
        let client = Self::block_on_with_rt(&rt, fut)?;
        info!(database = %database, "connected to mongodb");
        Ok(Self {
            database,
            client: Mutex::new(Some(client)),
            rt,
        })
    }

    /// Construct from environment variables:
    /// - `MONGODB_URI` (defaults to `mongodb://localhost:27017`)
    /// - `MONGODB_DATABASE` (defaults to `libraryDB`)
    pub fn from_env() -> Result<Self, CoreError> {
        let uri = std::env::var("MONGODB_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017".into());
        let database = std::env::var("MONGODB_DATABASE").unwrap_or_else(|_| "libraryDB".into());
        Self::connect(&uri, database)
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Typed handle to `name` within the pool's database.
    pub fn collection(&self, name: &str) -> Result<Collection<Document>, CoreError> {
        let guard = self
            .client
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        match guard.as_ref() {
            Some(client) => Ok(client.database(&self.database).collection(name)),
            None => Err(CoreError::Connectivity("mongodb pool closed".into())),
        }
    }

    /// Shut the client down. Calling it again is a no-op.
    pub fn close(&self) -> Result<(), CoreError> {
        let client = self
            .client
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?
            .take();
        if let Some(client) = client {
            self.block_on(async move { client.shutdown().await });
            info!(database = %self.database, "mongodb pool closed");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.client.lock().map(|g| g.is_none()).unwrap_or(true)
    }

    /// Check if we're inside a Tokio runtime. If yes, return None (reuse existing).
    /// If no, create a new runtime.
    fn maybe_create_runtime() -> Result<Option<Arc<tokio::runtime::Runtime>>, CoreError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            Ok(None)
        } else {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| CoreError::Repository(format!("tokio runtime init: {e}")))?;
            Ok(Some(Arc::new(rt)))
        }
    }

    /// Run an async future, using either our owned runtime or the current runtime.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        Self::block_on_with_rt(&self.rt, fut)
    }

    fn block_on_with_rt<F: Future>(rt: &Option<Arc<tokio::runtime::Runtime>>, fut: F) -> F::Output {
        match rt {
            Some(rt) => rt.block_on(fut),
            None => tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut)),
        }
    }
}

/// Document book repository over a shared [`MongoPool`].
#[derive(Clone)]
pub struct MongoBookRepo {
    pool: Arc<MongoPool>,
    collection: String,
}

impl MongoBookRepo {
    /// Bind to `collection` and make sure the unique `id` index exists.
    pub fn new(pool: Arc<MongoPool>, collection: impl Into<String>) -> Result<Self, CoreError> {
        let repo = Self {
            pool,
            collection: collection.into(),
        };
        repo.ensure_indexes()?;
        Ok(repo)
    }

    /// Collection name from `MONGODB_COLLECTION` (defaults to `books`).
    pub fn from_env(pool: Arc<MongoPool>) -> Result<Self, CoreError> {
        let collection = std::env::var("MONGODB_COLLECTION").unwrap_or_else(|_| "books".into());
        Self::new(pool, collection)
    }

    fn books(&self) -> Result<Collection<Document>, CoreError> {
        self.pool.collection(&self.collection)
    }

    fn ensure_indexes(&self) -> Result<(), CoreError> {
        let coll = self.books()?;
        let index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.pool
            .block_on(async move { coll.create_index(index).await })
            .map_err(map_driver_err)?;
        debug!(collection = %self.collection, "ensured unique id index");
        Ok(())
    }
}

impl BookRepository for MongoBookRepo {
    fn find_all(&self) -> Result<Vec<Book>, CoreError> {
        let coll = self.books()?;
        let fut = async move {
            let mut cursor = coll.find(doc! {}).await?;
            let mut docs = Vec::new();
            while cursor.advance().await? {
                docs.push(cursor.deserialize_current()?);
            }
            Ok::<_, mongodb::error::Error>(docs)
        };
        let docs = self.pool.block_on(fut).map_err(map_driver_err)?;
        let mut books = Vec::with_capacity(docs.len());
        for d in &docs {
            let (book, malformed) = document_to_book(d);
            if !malformed.is_empty() {
                warn!(book_id = book.id, fields = ?malformed, "defaulted malformed document fields");
            }
            books.push(book);
        }
        info!(count = books.len(), backend = "document", "found books");
        Ok(books)
    }

    fn save(&self, book: Book) -> Result<Book, CoreError> {
        let coll = self.books()?;
        let document = book_to_document(&book);
        let res = self
            .pool
            .block_on(async move { coll.insert_one(document).await })
            .map_err(map_driver_err);
        match res {
            Ok(_) => {
                info!(book_id = book.id, backend = "document", "saved book");
                Ok(book)
            }
            Err(e) => {
                error!(book_id = book.id, err = %e, "failed to save book");
                Err(e)
            }
        }
    }

    fn delete_by_id(&self, id: i64) -> Result<bool, CoreError> {
        let coll = self.books()?;
        let res = self
            .pool
            .block_on(async move { coll.delete_one(doc! { "id": id }).await })
            .map_err(map_driver_err);
        match res {
            Ok(out) if out.deleted_count > 0 => {
                info!(book_id = id, backend = "document", "deleted book");
                Ok(true)
            }
            Ok(_) => {
                warn!(book_id = id, backend = "document", "no book to delete");
                Ok(false)
            }
            Err(e) => {
                error!(book_id = id, err = %e, "failed to delete book");
                Err(e)
            }
        }
    }

    fn close(&self) -> Result<(), CoreError> {
        // The pool belongs to whoever connected it
        debug!(collection = %self.collection, "document repository released");
        Ok(())
    }
}

/// Absent optional fields are stored as explicit nulls.
pub fn book_to_document(book: &Book) -> Document {
    doc! {
        "id": book.id,
        "title": book.title.clone(),
        "author": book.author.clone(),
    }
}

/// Map a stored document to a book, defaulting fields that are missing or of
/// the wrong type. Returns the names of the defaulted fields alongside.
pub fn document_to_book(d: &Document) -> (Book, Vec<&'static str>) {
    let mut malformed = Vec::new();
    let id = match d.get("id").and_then(bson_to_i64) {
        Some(v) => v,
        None => {
            malformed.push("id");
            0
        }
    };
    let title = optional_string(d, "title", &mut malformed);
    let author = optional_string(d, "author", &mut malformed);
    (Book { id, title, author }, malformed)
}

fn optional_string(d: &Document, key: &'static str, malformed: &mut Vec<&'static str>) -> Option<String> {
    match d.get(key) {
        None | Some(Bson::Null) => None,
        Some(Bson::String(s)) => Some(s.clone()),
        Some(_) => {
            malformed.push(key);
            None
        }
    }
}

fn bson_to_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

fn map_driver_err(e: mongodb::error::Error) -> CoreError {
    match e.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY => {
            CoreError::AlreadyExists
        }
        ErrorKind::ServerSelection { .. } | ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } => {
            CoreError::Connectivity(format!("mongodb: {e}"))
        }
        _ => CoreError::Repository(format!("mongodb error: {e}")),
    }
}
