//! LMDB wrapper: resize/retry around an embedded key/value store.
//!
//! Grounded on `util/slmdb.c`. LMDB requires the application to size the
//! memory map in advance; writers that outgrow it get `MDB_MAP_FULL`
//! instead of growing automatically, and readers with a stale map size
//! get `MDB_MAP_RESIZED` after another process grows it. This wrapper
//! hides both behind a bounded retry loop so callers see a plain
//! `Result`. The retry policy is tested against an in-memory
//! [`MdbEnv`] stand-in; [`HeedMdbEnv`] is the real backing, built on
//! `heed` since nothing in the rest of the pack touches LMDB.

use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MdbCondition {
    /// The write did not fit in the current map size.
    MapFull,
    /// Another process grew the map; the local environment's cached size
    /// is stale and must be refreshed before retrying.
    MapResized,
    /// The configured maximum number of concurrent readers is in use.
    ReadersFull,
    /// Any other (non-retriable) failure.
    Other(&'static str),
}

/// Abstraction over the handful of LMDB operations the retry wrapper needs.
/// A production backing implements this against `heed::Env`; tests use an
/// in-memory stand-in that can be told to fail on demand.
pub trait MdbEnv {
    /// Attempt the operation once. Returns `Ok(())` on success or the
    /// `MdbCondition` that requires a retry/resize/backoff.
    fn try_write(&mut self, key: &[u8], value: &[u8]) -> Result<(), MdbCondition>;
    fn current_map_size(&self) -> u64;
    fn set_map_size(&mut self, new_size: u64) -> Result<(), MdbCondition>;
    fn refresh_map_size(&mut self) -> Result<(), MdbCondition>;
}

pub struct SlmdbConfig {
    pub size_incr_factor: u64,
    pub hard_limit: u64,
    pub api_retry_limit: u32,
    pub bulk_retry_limit: u32,
}

impl Default for SlmdbConfig {
    fn default() -> Self {
        SlmdbConfig {
            size_incr_factor: 2,
            hard_limit: 16 * 1024 * 1024 * 1024,
            api_retry_limit: 10,
            bulk_retry_limit: 3,
        }
    }
}

#[derive(Debug)]
pub enum SlmdbError {
    RetryLimitExceeded,
    HardLimitReached,
    Fatal(&'static str),
}

pub struct Slmdb<E: MdbEnv> {
    env: E,
    config: SlmdbConfig,
}

impl<E: MdbEnv> Slmdb<E> {
    pub fn new(env: E, config: SlmdbConfig) -> Self {
        Slmdb { env, config }
    }

    /// Write with the wrapper's retry/resize policy (§4.14). A bulk writer
    /// instead calls [`Slmdb::bulk_write`], which applies
    /// `bulk_retry_limit` to the whole transaction rather than per-call.
    pub fn write(&mut self, key: &[u8], value: &[u8]) -> Result<(), SlmdbError> {
        let mut attempts = 0;
        loop {
            match self.env.try_write(key, value) {
                Ok(()) => return Ok(()),
                Err(condition) => {
                    attempts += 1;
                    if attempts > self.config.api_retry_limit {
                        return Err(SlmdbError::RetryLimitExceeded);
                    }
                    self.handle_condition(condition)?;
                }
            }
        }
    }

    /// Runs `body` under the `bulk_retry_limit` budget: if `body` reports
    /// that the whole transaction must be redone (the C original's
    /// `longjmp` back to the start), the closure is invoked again from
    /// scratch, up to the configured limit.
    pub fn bulk_write<F>(&mut self, mut body: F) -> Result<(), SlmdbError>
    where
        F: FnMut(&mut E) -> Result<(), MdbCondition>,
    {
        let mut attempts = 0;
        loop {
            match body(&mut self.env) {
                Ok(()) => return Ok(()),
                Err(condition) => {
                    attempts += 1;
                    if attempts > self.config.bulk_retry_limit {
                        return Err(SlmdbError::RetryLimitExceeded);
                    }
                    self.handle_condition(condition)?;
                }
            }
        }
    }

    fn handle_condition(&mut self, condition: MdbCondition) -> Result<(), SlmdbError> {
        match condition {
            MdbCondition::MapFull => {
                let current = self.env.current_map_size();
                let grown = current
                    .saturating_mul(self.config.size_incr_factor)
                    .min(self.config.hard_limit);
                if grown <= current {
                    return Err(SlmdbError::HardLimitReached);
                }
                self.env
                    .set_map_size(grown)
                    .map_err(|_| SlmdbError::Fatal("set_map_size failed"))?;
                Ok(())
            }
            MdbCondition::MapResized => self
                .env
                .refresh_map_size()
                .map_err(|_| SlmdbError::Fatal("refresh_map_size failed")),
            MdbCondition::ReadersFull => {
                std::thread::sleep(Duration::from_secs(1));
                Ok(())
            }
            MdbCondition::Other(reason) => Err(SlmdbError::Fatal(reason)),
        }
    }
}

/// [`MdbEnv`] backed by a real `heed::Env` against a single fixed
/// database. `Slmdb<HeedMdbEnv>` is what a running process actually
/// opens; [`MdbEnv`]'s other implementor in this file exists purely to
/// drive the retry-policy tests without touching the filesystem.
pub struct HeedMdbEnv {
    env: heed::Env,
    db: heed::Database<heed::types::Bytes, heed::types::Bytes>,
}

impl HeedMdbEnv {
    pub fn open(path: &Path, initial_map_size: usize) -> Result<Self, heed::Error> {
        let env = unsafe {
            heed::EnvOpenOptions::new()
                .map_size(initial_map_size)
                .max_dbs(1)
                .open(path)?
        };
        let mut wtxn = env.write_txn()?;
        let db = env.create_database(&mut wtxn, None)?;
        wtxn.commit()?;
        Ok(HeedMdbEnv { env, db })
    }

    fn classify(err: heed::Error) -> MdbCondition {
        match err {
            heed::Error::Mdb(heed::MdbError::MapFull) => MdbCondition::MapFull,
            heed::Error::Mdb(heed::MdbError::MapResized) => MdbCondition::MapResized,
            heed::Error::Mdb(heed::MdbError::ReadersFull) => MdbCondition::ReadersFull,
            _ => MdbCondition::Other("lmdb operation failed"),
        }
    }
}

impl MdbEnv for HeedMdbEnv {
    fn try_write(&mut self, key: &[u8], value: &[u8]) -> Result<(), MdbCondition> {
        let mut wtxn = self.env.write_txn().map_err(Self::classify)?;
        self.db.put(&mut wtxn, key, value).map_err(Self::classify)?;
        wtxn.commit().map_err(Self::classify)
    }

    fn current_map_size(&self) -> u64 {
        self.env.info().map(|info| info.map_size as u64).unwrap_or(0)
    }

    fn set_map_size(&mut self, new_size: u64) -> Result<(), MdbCondition> {
        unsafe { self.env.resize(new_size as usize) }.map_err(Self::classify)
    }

    fn refresh_map_size(&mut self) -> Result<(), MdbCondition> {
        self.env.info().map(|_| ()).map_err(Self::classify)
    }
}
