//! Bounded worker pool running blocking repository calls off the async runtime.
//!
//! Every submitted job runs on `tokio::task::spawn_blocking` once a permit is
//! available, so at most `size` repository calls are in flight at any time.
//! Jobs start immediately; the returned [`Task`] resolves with the job's result.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use domain::CoreError;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

pub struct WorkerPool<S> {
    service: Arc<S>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl<S> Clone for WorkerPool<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            permits: self.permits.clone(),
            size: self.size,
        }
    }
}

impl<S: Send + Sync + 'static> WorkerPool<S> {
    pub fn new(service: S, size: usize) -> Self {
        let size = size.max(1);
        Self {
            service: Arc::new(service),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Direct access for non-request work such as shutdown.
    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Schedule `job` against the shared service.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit<T, F>(&self, job: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, CoreError> + Send + 'static,
    {
        let service = self.service.clone();
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| CoreError::Repository("worker pool closed".into()))?;
            tokio::task::spawn_blocking(move || job(&service))
                .await
                .map_err(|e| CoreError::Repository(format!("worker task failed: {e}")))?
        });
        Task { handle }
    }

    /// Stop admitting new jobs. Jobs already holding a permit finish normally.
    pub fn shutdown(&self) {
        self.permits.close();
    }
}

/// Handle to a submitted job.
pub struct Task<T> {
    handle: JoinHandle<Result<T, CoreError>>,
}

impl<T> Future for Task<T> {
    type Output = Result<T, CoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.handle).poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(e)) => Poll::Ready(Err(CoreError::Repository(format!(
                "worker task failed: {e}"
            )))),
            Poll::Pending => Poll::Pending,
        }
    }
}
