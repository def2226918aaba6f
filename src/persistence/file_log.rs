use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};

use crate::utils::error::PersistenceError;

/// Append-only, per-topic payload log.
///
/// Appends to different topics never contend: each topic has its own file
/// handle behind its own lock, and the outer map lock is only held long
/// enough to look the handle up.
#[derive(Debug)]
pub struct FileLog {
    dir: PathBuf,
    files: RwLock<HashMap<String, Arc<Mutex<File>>>>,
}

impl FileLog {
    /// Creates a log writer rooted at `dir`. Files are opened lazily on the
    /// first append to each topic.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: RwLock::new(HashMap::new()),
        }
    }

    /// Appends the raw payload to the topic's `<topic>.mq` file, creating it
    /// if absent. No framing is written between records.
    pub fn append(&self, topic: &str, payload: &[u8]) -> Result<(), PersistenceError> {
        let file = self.handle(topic)?;
        let mut file = file.lock().unwrap();
        file.write_all(payload).map_err(|source| PersistenceError {
            topic: topic.to_string(),
            source,
        })
    }

    /// Path of the log file backing `topic`.
    pub fn path(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{topic}.mq"))
    }

    fn handle(&self, topic: &str) -> Result<Arc<Mutex<File>>, PersistenceError> {
        if let Some(file) = self.files.read().unwrap().get(topic) {
            return Ok(file.clone());
        }

        let mut files = self.files.write().unwrap();
        // Lost the race? Another append opened it while we waited.
        if let Some(file) = files.get(topic) {
            return Ok(file.clone());
        }
        let file = open_append(&self.path(topic)).map_err(|source| PersistenceError {
            topic: topic.to_string(),
            source,
        })?;
        let file = Arc::new(Mutex::new(file));
        files.insert(topic.to_string(), file.clone());
        Ok(file)
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
