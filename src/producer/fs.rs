//! Non-blocking file reads expressed as deferreds.
//!
//! Read failures always reject; they are never dropped on the floor.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use thiserror::Error;

use crate::deferred::Deferred;
use crate::scheduler::Scheduler;

/// A file could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to read {}: {message}", .path.display())]
pub struct ReadError {
    pub path: PathBuf,
    pub kind: io::ErrorKind,
    pub message: String,
}

impl ReadError {
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Anything that can start a file read and hand back a pending result.
///
/// Closures `Fn(&Path) -> Deferred<Vec<u8>, ReadError>` implement it, so
/// callers can substitute their own source (an in-memory map in tests).
pub trait FileReader: Send + Sync {
    fn read(&self, path: &Path) -> Deferred<Vec<u8>, ReadError>;
}

impl<F> FileReader for F
where
    F: Fn(&Path) -> Deferred<Vec<u8>, ReadError> + Send + Sync,
{
    fn read(&self, path: &Path) -> Deferred<Vec<u8>, ReadError> {
        self(path)
    }
}

/// Reads each file on a freshly spawned thread.
#[derive(Clone)]
pub struct ThreadFileReader {
    scheduler: Arc<dyn Scheduler>,
}

impl ThreadFileReader {
    pub fn new<S: Scheduler + 'static>(scheduler: S) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
        }
    }
}

impl FileReader for ThreadFileReader {
    fn read(&self, path: &Path) -> Deferred<Vec<u8>, ReadError> {
        let deferred = Deferred::with_scheduler(Arc::clone(&self.scheduler));
        let producer = deferred.clone();
        let path = path.to_path_buf();

        thread::spawn(move || {
            let result = std::fs::read(&path).map_err(|err| ReadError::from_io(&path, &err));
            if let Err(err) = &result {
                tracing::debug!(path = %path.display(), kind = ?err.kind, "file read failed");
            }
            producer.resolve(result);
        });

        deferred
    }
}

/// Read a whole file without blocking the caller.
///
/// ## Example
///
/// ```no_run
/// use deferred_bus::producer::read_file;
/// use deferred_bus::TaskQueue;
///
/// let queue = TaskQueue::new();
/// let contents = read_file(queue.clone(), "./content/textFile.txt");
/// contents.on_settle(
///     |bytes| println!("{}", String::from_utf8_lossy(bytes)),
///     |err| eprintln!("{}", err),
/// );
/// println!("started next task");
/// ```
pub fn read_file<S, P>(scheduler: S, path: P) -> Deferred<Vec<u8>, ReadError>
where
    S: Scheduler + 'static,
    P: AsRef<Path>,
{
    ThreadFileReader::new(scheduler).read(path.as_ref())
}

/// Read a whole file as UTF-8. Invalid UTF-8 rejects with `InvalidData`.
pub fn read_to_string<S, P>(scheduler: S, path: P) -> Deferred<String, ReadError>
where
    S: Scheduler + 'static,
    P: AsRef<Path>,
{
    let path = path.as_ref().to_path_buf();
    read_file(scheduler, &path).then(move |bytes| {
        String::from_utf8(bytes.clone()).map_err(|err| ReadError {
            path: path.clone(),
            kind: io::ErrorKind::InvalidData,
            message: err.to_string(),
        })
    })
}

/// Read a whole file with `tokio::fs`.
///
/// Must be called from inside a tokio runtime.
#[cfg(feature = "tokio")]
pub fn read_file_async<S, P>(scheduler: S, path: P) -> Deferred<Vec<u8>, ReadError>
where
    S: Scheduler + 'static,
    P: AsRef<Path>,
{
    let deferred = Deferred::new(scheduler);
    let producer = deferred.clone();
    let path = path.as_ref().to_path_buf();

    tokio::spawn(async move {
        let result = tokio::fs::read(&path)
            .await
            .map_err(|err| ReadError::from_io(&path, &err));
        producer.resolve(result);
    });

    deferred
}
