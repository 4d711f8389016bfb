use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::Display,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, RwLock},
    time::{Instant, SystemTime},
};

use crate::lock::{lock_path_for, FileLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Like,
    Pass,
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Like => write!(f, "like"),
            Action::Pass => write!(f, "pass"),
        }
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(Action::Like),
            "pass" => Ok(Action::Pass),
            other => Err(anyhow!("unknown action {other:?}")),
        }
    }
}

/// The current action a user took on a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub book_id: u64,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

/// Per-user like/pass log.
///
/// `record` upserts on (user_id, book_id): a later action replaces the
/// earlier one instead of accumulating next to it.
pub trait InteractionStore: Send + Sync {
    fn record(&self, user_id: &str, book_id: u64, action: Action) -> anyhow::Result<Interaction>;
    fn list(&self, user_id: &str) -> anyhow::Result<Vec<Interaction>>;
}

/// Interaction log kept in `interactions.csv`.
///
/// Several processes may share the file (the daemon and one-off CLI runs),
/// so every write re-reads the file under an exclusive [`FileLock`] before
/// applying the upsert, and reads reload the cached rows whenever the file
/// was replaced by someone else.
#[derive(Debug, Clone)]
pub struct BackendCsv {
    state: Arc<RwLock<LogState>>,
    path: PathBuf,
    lock_path: PathBuf,
}

#[derive(Debug, Default)]
struct LogState {
    rows: Vec<Interaction>,
    stamp: Option<FileStamp>,
}

/// Identifies one version of the log file. Saves rename a fresh file into
/// place, so any write changes the inode as well as size or mtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
    inode: u64,
}

impl FileStamp {
    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;

        #[cfg(unix)]
        let inode = std::os::unix::fs::MetadataExt::ino(&meta);
        #[cfg(not(unix))]
        let inode = 0;

        Ok(FileStamp {
            modified: meta.modified().ok(),
            len: meta.len(),
            inode,
        })
    }
}

const CSV_HEADERS: [&str; 4] = ["user_id", "book_id", "action", "timestamp"];

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let path = PathBuf::from(path);
        let lock_path = lock_path_for(&path);

        if let Err(err) = std::fs::metadata(&path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    let _lock = FileLock::exclusive(&lock_path)?;
                    // another process may have created it while we waited
                    if !path.exists() {
                        log::info!("Creating new interaction log at {}", path.display());
                        write_log(&path, &[])?;
                    }
                }
                _ => Err(err)?,
            }
        }

        let store = BackendCsv {
            state: Arc::new(RwLock::new(LogState::default())),
            path,
            lock_path,
        };
        store.reload()?;

        Ok(store)
    }

    /// Replace the cached rows with the file's current contents.
    fn reload(&self) -> anyhow::Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow!("interaction log lock poisoned"))?;

        let _lock = FileLock::shared(&self.lock_path)?;
        state.rows = read_log(&self.path)?;
        state.stamp = FileStamp::of(&self.path).ok();

        Ok(())
    }

    fn is_stale(&self) -> anyhow::Result<bool> {
        let state = self
            .state
            .read()
            .map_err(|_| anyhow!("interaction log lock poisoned"))?;

        Ok(state.stamp.is_none() || state.stamp != FileStamp::of(&self.path).ok())
    }

    fn save(&self, interactions: &[Interaction]) -> anyhow::Result<()> {
        let mut temp_path = self.path.clone().into_os_string();
        temp_path.push("-tmp");
        let temp_path = PathBuf::from(temp_path);

        if let Err(err) = write_log(&temp_path, interactions) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }

        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

fn read_log(path: &Path) -> anyhow::Result<Vec<Interaction>> {
    let now = Instant::now();
    let mut csv_reader = csv::Reader::from_path(path)?;

    let mut interactions: Vec<Interaction> = vec![];
    let mut positions: HashMap<(String, u64), usize> = HashMap::new();
    for record in csv_reader.records() {
        let record = record?;
        let user_id = record
            .get(0)
            .ok_or(anyhow!("couldnt get record user_id"))?
            .to_string();
        let book_id = record
            .get(1)
            .ok_or(anyhow!("couldnt get record book_id"))?
            .parse::<u64>()?;
        let action = record
            .get(2)
            .ok_or(anyhow!("couldnt get record action"))?
            .parse::<Action>()?;
        let timestamp = DateTime::parse_from_rfc3339(
            record
                .get(3)
                .ok_or(anyhow!("couldnt get record timestamp"))?,
        )?
        .with_timezone(&Utc);

        let interaction = Interaction {
            user_id,
            book_id,
            action,
            timestamp,
        };

        // tolerate logs written by hand with repeated pairs, last one wins
        let key = (interaction.user_id.clone(), interaction.book_id);
        match positions.get(&key) {
            Some(&idx) => interactions[idx] = interaction,
            None => {
                positions.insert(key, interactions.len());
                interactions.push(interaction);
            }
        }
    }

    log::debug!(
        "took {}ms to read interactions",
        now.elapsed().as_micros() as f64 / 1000.0
    );

    Ok(interactions)
}

/// Write a complete log to `path` and fsync it.
fn write_log(path: &Path, interactions: &[Interaction]) -> anyhow::Result<()> {
    let mut csv_wrt = csv::Writer::from_path(path)?;
    csv_wrt.write_record(CSV_HEADERS)?;
    for interaction in interactions {
        csv_wrt.write_record([
            interaction.user_id.as_str(),
            &interaction.book_id.to_string(),
            &interaction.action.to_string(),
            &interaction.timestamp.to_rfc3339(),
        ])?;
    }
    csv_wrt.flush()?;

    let file = csv_wrt
        .into_inner()
        .map_err(|err| anyhow!("failed to flush {}: {}", path.display(), err.error()))?;
    file.sync_all()?;

    Ok(())
}

fn upsert(interactions: &mut Vec<Interaction>, interaction: Interaction) {
    match interactions
        .iter()
        .position(|i| i.user_id == interaction.user_id && i.book_id == interaction.book_id)
    {
        Some(idx) => interactions[idx] = interaction,
        None => interactions.push(interaction),
    }
}

impl InteractionStore for BackendCsv {
    fn record(&self, user_id: &str, book_id: u64, action: Action) -> anyhow::Result<Interaction> {
        let interaction = Interaction {
            user_id: user_id.to_string(),
            book_id,
            action,
            timestamp: Utc::now(),
        };

        // in-process writers queue on the RwLock, other processes on the flock
        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow!("interaction log lock poisoned"))?;
        let _lock = FileLock::exclusive(&self.lock_path)?;

        let mut rows = read_log(&self.path)?;
        upsert(&mut rows, interaction.clone());

        // the cache only changes once the new file is in place
        self.save(&rows)?;
        state.rows = rows;
        state.stamp = FileStamp::of(&self.path).ok();

        Ok(interaction)
    }

    fn list(&self, user_id: &str) -> anyhow::Result<Vec<Interaction>> {
        if self.is_stale()? {
            log::debug!("{} changed on disk, reloading", self.path.display());
            self.reload()?;
        }

        let state = self
            .state
            .read()
            .map_err(|_| anyhow!("interaction log lock poisoned"))?;

        Ok(state
            .rows
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
impl BackendCsv {
    pub fn len(&self) -> usize {
        self.state.read().unwrap().rows.len()
    }
}
