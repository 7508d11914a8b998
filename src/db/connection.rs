use std::{
    fs,
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

/// The ingestion side writes to the same file; readers wait this long for
/// its lock before failing.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Location {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    location: Location,
    busy_timeout: Duration,
}

impl DatabaseOptions {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create database directory {}", parent.display())
                    })?;
                }
                Connection::open(path)
                    .with_context(|| format!("failed to open SQLite database {}", path.display()))?
            }
            Location::Memory => {
                Connection::open_in_memory().context("failed to open in-memory SQLite database")?
            }
        };

        conn.busy_timeout(self.busy_timeout)
            .context("failed to set SQLite busy timeout")?;

        if let Location::File(_) = self.location {
            match conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            }) {
                Ok(mode) if mode.eq_ignore_ascii_case("wal") => {
                    if let Err(err) = conn.pragma_update(None, "synchronous", "NORMAL") {
                        warn!("Failed to relax synchronous mode: {err}");
                    }
                }
                Ok(mode) => warn!("SQLite kept journal mode {mode}; WAL unavailable"),
                Err(err) => error!("Failed to enable WAL mode: {err}"),
            }
        }
        Ok(conn)
    }
}

struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop once pending jobs drain.
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Database worker panicked");
            }
        }
    }
}

/// Handle to the SQLite store. Statements run on one dedicated thread in
/// submission order; clones share that thread.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    path: Option<Arc<PathBuf>>,
}

impl Database {
    pub fn open(options: DatabaseOptions) -> Result<Self> {
        let mut conn = options.connect()?;
        let version = run_migrations(&mut conn).context("failed to run database migrations")?;

        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name("smokegpt-db".into())
            .spawn(move || {
                while let Ok(job) = jobs_rx.recv() {
                    job(&mut conn);
                }
                debug!("Database worker drained; closing connection");
            })
            .context("failed to spawn database worker thread")?;

        let path = match options.location {
            Location::File(path) => {
                info!("Database ready at {} (schema v{version})", path.display());
                Some(Arc::new(path))
            }
            Location::Memory => None,
        };

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Some(jobs_tx),
                thread: Some(thread),
            }),
            path,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(DatabaseOptions::in_memory())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref().map(PathBuf::as_path)
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            if reply_tx.send(task(conn)).is_err() {
                debug!("Database caller went away before its result was ready");
            }
        });

        self.worker
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("database is closed"))?
            .send(job)
            .map_err(|_| anyhow!("database worker has exited"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}
