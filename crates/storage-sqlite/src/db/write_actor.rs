//! Single-writer actor.
//!
//! Every write runs on one dedicated thread inside an IMMEDIATE transaction,
//! so read-modify-write jobs never interleave and a failing job rolls back
//! everything it touched.

use diesel::sqlite::SqliteConnection;
use tokio::sync::{mpsc, oneshot};

use super::{DbConnection, DbPool};
use crate::errors::StorageError;
use fieldsync_core::{Error, Result};

type Job = Box<dyn FnOnce(std::result::Result<&mut SqliteConnection, Error>) + Send + 'static>;

/// Cheap, cloneable handle used by repositories to submit write jobs.
#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

enum TxError {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

impl WriteHandle {
    /// Run `job` on the writer thread inside a transaction and await its result.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let wrapped: Job = Box::new(move |conn| {
            let result = conn.and_then(|conn| run_in_transaction(conn, job));
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(wrapped)
            .map_err(|_| StorageError::WriterUnavailable("writer thread stopped".to_string()))?;

        reply_rx.await.map_err(|_| {
            Error::from(StorageError::WriterUnavailable(
                "writer dropped the job".to_string(),
            ))
        })?
    }
}

fn run_in_transaction<F, T>(conn: &mut SqliteConnection, job: F) -> Result<T>
where
    F: FnOnce(&mut SqliteConnection) -> Result<T>,
{
    conn.immediate_transaction::<T, TxError, _>(|conn| job(conn).map_err(TxError::Job))
        .map_err(|err| match err {
            TxError::Job(e) => e,
            TxError::Diesel(e) => StorageError::from(e).into(),
        })
}

/// Start the writer thread. It exits once every handle is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("fieldsync-db-writer".to_string())
        .spawn(move || {
            let mut conn: Option<DbConnection> = None;
            while let Some(job) = rx.blocking_recv() {
                if conn.is_none() {
                    match pool.get() {
                        Ok(c) => conn = Some(c),
                        Err(e) => {
                            job(Err(StorageError::from(e).into()));
                            continue;
                        }
                    }
                }
                if let Some(c) = conn.as_mut() {
                    job(Ok(&mut **c));
                }
            }
            log::debug!("[OfflineStore] Writer thread exiting");
        });

    if let Err(e) = spawned {
        // Handle stays usable; every exec reports the writer as unavailable.
        log::error!("[OfflineStore] Failed to spawn writer thread: {}", e);
    }

    WriteHandle { tx }
}
