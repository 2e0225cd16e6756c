// LMDB environment handle, scoped transactions, and storage error mapping.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use heed::types::Bytes;
use heed::{CompactionOption, Database, Env, EnvOpenOptions, MdbError, RoTxn, RwTxn};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_READERS: u32 = 126;
/// LMDB's compiled-in key size limit.
pub const MAX_KEY_BYTES: usize = 511;
const MAP_SIZE_GRANULE: usize = 64 * 1024;
const BACKUP_FILE_NAME: &str = "data.mdb";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StoreOptions {
    pub map_size: usize,
    pub max_readers: u32,
}

impl StoreOptions {
    pub fn new() -> Self {
        Self {
            map_size: DEFAULT_MAP_SIZE,
            max_readers: DEFAULT_MAX_READERS,
        }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.map_size == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("map size must be greater than zero")
                .with_hint("Use bytes or K/M/G (e.g. 64M)."));
        }
        if self.max_readers == 0 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("max readers must be greater than zero"));
        }
        Ok(())
    }

    /// LMDB wants the map size to be a multiple of the OS page size.
    fn rounded_map_size(&self) -> usize {
        self.map_size
            .div_ceil(MAP_SIZE_GRANULE)
            .saturating_mul(MAP_SIZE_GRANULE)
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StoreStats {
    pub path: PathBuf,
    pub entries: u64,
    pub map_size: usize,
}

/// Process-wide handle to one LMDB environment and its unnamed database.
///
/// Cloning is cheap and shares the same environment. The environment closes
/// once the last clone is dropped.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish()
    }
}

impl Store {
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, Error> {
        options.validate()?;
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create database directory")
                .with_path(&path)
                .with_source(err)
        })?;

        // SAFETY: the environment is opened once per process for this path and
        // the memory map is never handed out beyond transaction lifetimes.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(options.rounded_map_size())
                .max_readers(options.max_readers)
                .max_dbs(1)
                .open(&path)
        }
        .map_err(|err| storage_error(err, "failed to open database").with_path(&path))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|err| storage_error(err, "failed to begin write transaction"))?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|err| storage_error(err, "failed to open main database").with_path(&path))?;
        wtxn.commit()
            .map_err(|err| storage_error(err, "failed to commit database setup"))?;

        tracing::debug!(path = %path.display(), map_size = options.map_size, "opened store");
        Ok(Self { path, env, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn database(&self) -> Database<Bytes, Bytes> {
        self.db
    }

    pub(crate) fn read_txn(&self) -> Result<RoTxn<'_>, Error> {
        self.env
            .read_txn()
            .map_err(|err| storage_error(err, "failed to begin read transaction"))
    }

    pub(crate) fn write_txn(&self) -> Result<RwTxn<'_>, Error> {
        self.env
            .write_txn()
            .map_err(|err| storage_error(err, "failed to begin write transaction"))
    }

    pub fn stats(&self) -> Result<StoreStats, Error> {
        let rtxn = self.read_txn()?;
        let entries = self
            .db
            .len(&rtxn)
            .map_err(|err| storage_error(err, "failed to count entries"))?;
        Ok(StoreStats {
            path: self.path.clone(),
            entries,
            map_size: self.env.info().map_size,
        })
    }

    /// Write a compacted copy of the environment into `dest_dir`, returning the
    /// path of the copied data file. The copy is taken from a consistent snapshot.
    pub fn backup(&self, dest_dir: impl AsRef<Path>) -> Result<PathBuf, Error> {
        let dest_dir = dest_dir.as_ref();
        if dest_dir == self.path {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("backup destination must differ from the database directory")
                .with_path(dest_dir));
        }
        fs::create_dir_all(dest_dir).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create backup directory")
                .with_path(dest_dir)
                .with_source(err)
        })?;
        let dest_file = dest_dir.join(BACKUP_FILE_NAME);
        if dest_file.exists() {
            return Err(Error::new(ErrorKind::AlreadyExists)
                .with_message("backup destination already holds a database")
                .with_path(&dest_file)
                .with_hint("Choose an empty directory for the backup."));
        }
        self.env
            .copy_to_file(&dest_file, CompactionOption::Enabled)
            .map_err(|err| storage_error(err, "failed to copy database").with_path(&dest_file))?;
        tracing::info!(dest = %dest_file.display(), "database backup written");
        Ok(dest_file)
    }
}

/// Reject keys LMDB cannot store before any transaction is opened.
pub(crate) fn validate_key(key: &str) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("key exceeds {MAX_KEY_BYTES} bytes"))
            .with_key(key));
    }
    Ok(())
}

/// Lossy rendering for log fields only; never hand this back to callers as a key.
pub(crate) fn display_key(key: &[u8]) -> String {
    key.to_str_lossy().into_owned()
}

/// A stored key as a caller-usable string, or `None` when it is not UTF-8 and
/// therefore could not be passed back to address the same record.
pub(crate) fn scanned_key(key: &[u8]) -> Option<String> {
    match key.to_str() {
        Ok(key) => Some(key.to_owned()),
        Err(_) => {
            tracing::warn!(key = %display_key(key), "skipping record with non-UTF-8 key");
            None
        }
    }
}

pub(crate) fn storage_error(err: heed::Error, message: &str) -> Error {
    let kind = match &err {
        heed::Error::Io(_) => ErrorKind::Io,
        heed::Error::Mdb(mdb) => match mdb {
            MdbError::MapFull | MdbError::PageFull | MdbError::TxnFull => ErrorKind::Full,
            MdbError::ReadersFull
            | MdbError::TlsFull
            | MdbError::CursorFull
            | MdbError::MapResized => ErrorKind::Busy,
            MdbError::Corrupted
            | MdbError::PageNotFound
            | MdbError::VersionMismatch
            | MdbError::Invalid
            | MdbError::Incompatible => ErrorKind::Corrupt,
            MdbError::BadValSize => ErrorKind::Usage,
            _ => ErrorKind::Io,
        },
        _ => ErrorKind::Internal,
    };
    let error = Error::new(kind).with_message(message);
    let error = match kind {
        ErrorKind::Busy => error.with_hint("Storage is temporarily unavailable. Retry with backoff."),
        ErrorKind::Full => error.with_hint("The database map is full. Reopen with a larger map size."),
        _ => error,
    };
    error.with_source(err)
}
