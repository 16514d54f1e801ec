//! library-console — interactive command-line front end for the catalog.
//!
//! Asks for a backend first and opens only that backend's pool:
//! - MongoDB via `MONGODB_URI` / `MONGODB_DATABASE` / `MONGODB_COLLECTION`
//! - SQLite via `DB_PATH`
//!
//! Logs go to stderr (default level `warn`, override with `RUST_LOG`) so they
//! don't interleave with the menu.

mod menu;

use std::io;
use std::sync::Arc;

use domain::{Backend, BookRepository, CoreError};
use mongo_adapter::{MongoBookRepo, MongoPool};
use sqlite_adapter::{SqliteBookRepo, SqlitePool};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

/// An opened backend together with the pool that has to be closed after it.
enum Session {
    Relational(SqliteBookRepo, Arc<SqlitePool>),
    Document(MongoBookRepo, Arc<MongoPool>),
}

impl Session {
    fn open(backend: Backend) -> Result<Self, CoreError> {
        match backend {
            Backend::Relational => {
                let pool = Arc::new(SqlitePool::from_env()?);
                Ok(Self::Relational(SqliteBookRepo::new(pool.clone()), pool))
            }
            Backend::Document => {
                let pool = Arc::new(MongoPool::from_env()?);
                let repo = MongoBookRepo::from_env(pool.clone())?;
                Ok(Self::Document(repo, pool))
            }
        }
    }

    fn repo(&self) -> &dyn BookRepository {
        match self {
            Self::Relational(repo, _) => repo,
            Self::Document(repo, _) => repo,
        }
    }

    fn close(&self) -> Result<(), CoreError> {
        match self {
            Self::Relational(_, pool) => pool.close(),
            Self::Document(_, pool) => pool.close(),
        }
    }
}

fn main() {
    init_tracing();

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut out = io::stdout();

    let backend = match menu::choose_backend(&mut input, &mut out) {
        Ok(Some(b)) => b,
        Ok(None) => return,
        Err(e) => {
            error!(err = %e, "console io failed");
            std::process::exit(1);
        }
    };

    let session = match Session::open(backend) {
        Ok(s) => s,
        Err(e) => {
            error!(%backend, err = %e, "failed to open backend");
            eprintln!("Could not open the {} backend: {}", backend, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = menu::run(session.repo(), &mut input, &mut out) {
        error!(err = %e, "console io failed");
    }
    if let Err(e) = session.close() {
        error!(%backend, err = %e, "failed to close backend pool");
    }
}
