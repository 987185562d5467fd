use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElemState {
    Insert,
    Update,
    Delete,
}

#[derive(Clone, Debug)]
pub struct VersionEntry {
    pub version: u64,
    pub elem_id: String,
    pub state: ElemState,
}

// Append-only per-owner change log. `id` is the log identity: it changes when
// the log is recreated, forcing clients onto a full resync.
#[derive(Clone, Debug)]
pub struct VersionLog {
    pub id: String,
    pub version: u64,
    pub entries: Vec<VersionEntry>,
    // False when retention no longer covers the requested window.
    pub complete: bool,
}

#[async_trait]
pub trait VersionLogStore: Send + Sync {
    async fn append(
        &self,
        owner: &str,
        changes: &[(String, ElemState)],
    ) -> Result<u64, CoreError>;

    // Header only: identity and current version.
    async fn latest(&self, owner: &str) -> Result<VersionLog, CoreError>;

    // Entries with version > after_version, up to limit.
    async fn tail(
        &self,
        owner: &str,
        after_version: u64,
        limit: usize,
    ) -> Result<VersionLog, CoreError>;
}

// Element lookups for the list being synchronized.
#[async_trait]
pub trait ListSource<T: Send>: Send + Sync {
    async fn sort_ids(&self, owner: &str) -> Result<Vec<String>, CoreError>;

    async fn find(&self, owner: &str, ids: &[String]) -> Result<Vec<T>, CoreError>;

    fn id_of(&self, elem: &T) -> String;
}

#[derive(Clone, Debug, Default)]
pub struct SyncRequest {
    pub version_id: String,
    pub version_number: u64,
    pub limit: usize,
}

#[derive(Clone, Debug)]
pub enum SyncOutcome<T> {
    // The presented cursor is unusable; ship the whole list.
    Full {
        version_id: String,
        version: u64,
        items: Vec<T>,
    },
    Delta {
        version_id: String,
        version: u64,
        delete_ids: Vec<String>,
        changed: Vec<T>,
    },
    UpToDate {
        version_id: String,
        version: u64,
    },
}

// A client presenting (version_id, version_number) gets an incremental delta
// or a full snapshot, never a silently truncated history.
pub async fn sync_list<T: Send>(
    store: &dyn VersionLogStore,
    source: &dyn ListSource<T>,
    owner: &str,
    req: &SyncRequest,
) -> Result<SyncOutcome<T>, CoreError> {
    if req.limit == 0 {
        return Err(CoreError::ArgInvalid("limit"));
    }
    let latest = store.latest(owner).await?;
    let valid_cursor = !req.version_id.is_empty() && req.version_number > 0;
    let full = if !valid_cursor || req.version_id != latest.id {
        true
    } else if req.version_number > latest.version {
        true
    } else if req.version_number == latest.version {
        return Ok(SyncOutcome::UpToDate {
            version_id: latest.id,
            version: latest.version,
        });
    } else {
        false
    };
    if full {
        let ids = source.sort_ids(owner).await?;
        let items = source.find(owner, &ids).await?;
        return Ok(SyncOutcome::Full {
            version_id: latest.id,
            version: latest.version,
            items,
        });
    }
    let tail = store.tail(owner, req.version_number, req.limit).await?;
    if !tail.complete {
        let ids = source.sort_ids(owner).await?;
        let items = source.find(owner, &ids).await?;
        return Ok(SyncOutcome::Full {
            version_id: latest.id,
            version: latest.version,
            items,
        });
    }
    let mut delete_ids = Vec::new();
    let mut changed_ids = Vec::new();
    for entry in &tail.entries {
        match entry.state {
            ElemState::Delete => delete_ids.push(entry.elem_id.clone()),
            ElemState::Insert | ElemState::Update => changed_ids.push(entry.elem_id.clone()),
        }
    }
    let changed = if changed_ids.is_empty() {
        Vec::new()
    } else {
        source.find(owner, &changed_ids).await?
    };
    // Changed entries that no longer resolve are deletions the log has not
    // caught up with yet.
    if changed.len() != changed_ids.len() {
        let found: std::collections::HashSet<String> =
            changed.iter().map(|e| source.id_of(e)).collect();
        for id in changed_ids {
            if !found.contains(&id) {
                delete_ids.push(id);
            }
        }
    }
    Ok(SyncOutcome::Delta {
        version_id: tail.id,
        version: tail.version,
        delete_ids,
        changed,
    })
}

struct OwnerLog {
    id: String,
    version: u64,
    entries: Vec<VersionEntry>,
}

pub struct InMemoryVersionLogStore {
    retention: usize,
    logs: Mutex<HashMap<String, OwnerLog>>,
}

impl InMemoryVersionLogStore {
    pub fn new(retention: usize) -> InMemoryVersionLogStore {
        InMemoryVersionLogStore {
            retention: retention.max(1),
            logs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl VersionLogStore for InMemoryVersionLogStore {
    async fn append(
        &self,
        owner: &str,
        changes: &[(String, ElemState)],
    ) -> Result<u64, CoreError> {
        let mut logs = self.logs.lock().await;
        let log = logs.entry(owner.to_string()).or_insert_with(|| OwnerLog {
            id: Uuid::new_v4().to_string(),
            version: 0,
            entries: Vec::new(),
        });
        for (elem_id, state) in changes {
            log.version += 1;
            // A newer change to the same element supersedes the older entry.
            log.entries.retain(|e| e.elem_id != *elem_id);
            log.entries.push(VersionEntry {
                version: log.version,
                elem_id: elem_id.clone(),
                state: *state,
            });
        }
        if log.entries.len() > self.retention {
            let cut = log.entries.len() - self.retention;
            log.entries.drain(..cut);
        }
        Ok(log.version)
    }

    async fn latest(&self, owner: &str) -> Result<VersionLog, CoreError> {
        let logs = self.logs.lock().await;
        Ok(match logs.get(owner) {
            Some(log) => VersionLog {
                id: log.id.clone(),
                version: log.version,
                entries: Vec::new(),
                complete: true,
            },
            None => VersionLog {
                id: String::new(),
                version: 0,
                entries: Vec::new(),
                complete: true,
            },
        })
    }

    async fn tail(
        &self,
        owner: &str,
        after_version: u64,
        limit: usize,
    ) -> Result<VersionLog, CoreError> {
        let logs = self.logs.lock().await;
        let Some(log) = logs.get(owner) else {
            return Ok(VersionLog {
                id: String::new(),
                version: 0,
                entries: Vec::new(),
                complete: false,
            });
        };
        let oldest_retained = log.entries.first().map(|e| e.version).unwrap_or(log.version + 1);
        // Entries between the cursor and the oldest retained one are gone;
        // the window no longer covers the request.
        let covered = after_version + 1 >= oldest_retained || log.version <= after_version;
        let entries: Vec<VersionEntry> = log
            .entries
            .iter()
            .filter(|e| e.version > after_version)
            .take(limit)
            .cloned()
            .collect();
        let truncated = log
            .entries
            .iter()
            .filter(|e| e.version > after_version)
            .count()
            > entries.len();
        Ok(VersionLog {
            id: log.id.clone(),
            version: log.version,
            entries,
            complete: covered && !truncated,
        })
    }
}
