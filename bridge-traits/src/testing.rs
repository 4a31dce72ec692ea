//! In-memory collaborators for tests
//!
//! Enabled with the `test-utils` feature. Each fake records the calls it
//! receives and supports scripted failures so retry and conflict paths can be
//! driven without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};

use crate::error::{BridgeError, Result};
use crate::ocr::{OcrHealth, OcrRequest, OcrResponse, OcrService};
use crate::storage::{parent_folder, FileRecord, FileStore};
use crate::time::{Clock, SystemClock};
use crate::workspace::{EntryPatch, EntrySyncStatus, WorkspaceEntry, WorkspaceStore};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *lock(&self.now) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

/// Per-call failure script shared by the fakes
#[derive(Debug, Default)]
struct FailurePlan {
    pending: HashMap<String, VecDeque<BridgeError>>,
}

impl FailurePlan {
    fn push(&mut self, call: &str, error: BridgeError) {
        self.pending
            .entry(call.to_string())
            .or_default()
            .push_back(error);
    }

    fn take(&mut self, call: &str) -> Option<BridgeError> {
        self.pending.get_mut(call).and_then(|queue| queue.pop_front())
    }
}

// ============================================================================
// File store
// ============================================================================

#[derive(Debug, Default)]
struct FileStoreState {
    files: HashMap<String, FileRecord>,
    contents: HashMap<String, Bytes>,
    failures: FailurePlan,
    calls: Vec<String>,
}

/// In-memory cloud file store
pub struct InMemoryFileStore {
    state: Mutex<FileStoreState>,
    next_id: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(FileStoreState::default()),
            next_id: AtomicU64::new(1),
            clock,
        }
    }

    /// Seed a file without recording a call
    pub fn insert(&self, record: FileRecord, content: impl Into<Bytes>) {
        let mut state = lock(&self.state);
        state.contents.insert(record.id.clone(), content.into());
        state.files.insert(record.id.clone(), record);
    }

    /// Mutate a stored record as an external user would
    pub fn edit<F: FnOnce(&mut FileRecord)>(&self, file_id: &str, f: F) {
        if let Some(record) = lock(&self.state).files.get_mut(file_id) {
            f(record);
        }
    }

    /// Remove a file out of band (it disappears from listings)
    pub fn remove(&self, file_id: &str) {
        let mut state = lock(&self.state);
        state.files.remove(file_id);
        state.contents.remove(file_id);
    }

    pub fn get(&self, file_id: &str) -> Option<FileRecord> {
        lock(&self.state).files.get(file_id).cloned()
    }

    pub fn files(&self) -> Vec<FileRecord> {
        let mut files: Vec<_> = lock(&self.state).files.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Make the next `call` (e.g. `"upload"`) fail with `error`
    pub fn fail_next(&self, call: &str, error: BridgeError) {
        lock(&self.state).failures.push(call, error);
    }

    /// Calls received so far, formatted as `call:argument`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        let prefix = format!("{}:", call);
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    fn begin(&self, call: &str, arg: &str) -> Result<MutexGuard<'_, FileStoreState>> {
        let mut state = lock(&self.state);
        state.calls.push(format!("{}:{}", call, arg));
        match state.failures.take(call) {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

fn join_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    format!("{}/{}", folder, name)
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn list(&self, folder: &str, recursive: bool) -> Result<Vec<FileRecord>> {
        let state = self.begin("list", folder)?;
        let root = folder.trim_end_matches('/');
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| {
                if recursive {
                    root.is_empty() || f.path.starts_with(&format!("{}/", root))
                } else {
                    let parent = parent_folder(&f.path);
                    parent == folder || (root.is_empty() && parent == "/")
                }
            })
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn upload(&self, data: Bytes, name: &str, subfolder: &str) -> Result<FileRecord> {
        let mut state = self.begin("upload", name)?;
        let id = format!("a-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = FileRecord::new(
            id.clone(),
            name,
            join_path(subfolder, name),
            data.len() as u64,
            self.clock.now(),
        );
        state.contents.insert(id.clone(), data);
        state.files.insert(id, record.clone());
        Ok(record)
    }

    async fn download(&self, file_id: &str) -> Result<Bytes> {
        let state = self.begin("download", file_id)?;
        state
            .contents
            .get(file_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(file_id.to_string()))
    }

    async fn delete(&self, file_id: &str) -> Result<bool> {
        let mut state = self.begin("delete", file_id)?;
        state.contents.remove(file_id);
        Ok(state.files.remove(file_id).is_some())
    }

    async fn move_file(&self, file_id: &str, new_path: &str) -> Result<FileRecord> {
        let mut state = self.begin("move", file_id)?;
        let record = state
            .files
            .get_mut(file_id)
            .ok_or_else(|| BridgeError::NotFound(file_id.to_string()))?;
        record.path = new_path.to_string();
        if let Some((_, name)) = new_path.rsplit_once('/') {
            record.name = name.to_string();
        }
        Ok(record.clone())
    }

    async fn get_download_url(&self, file_id: &str) -> Result<String> {
        let state = self.begin("url", file_id)?;
        if !state.files.contains_key(file_id) {
            return Err(BridgeError::NotFound(file_id.to_string()));
        }
        Ok(format!("https://files.test/{}", file_id))
    }
}

// ============================================================================
// Workspace
// ============================================================================

#[derive(Debug, Default)]
struct WorkspaceState {
    entries: Vec<WorkspaceEntry>,
    attachments: HashMap<String, Bytes>,
    failures: FailurePlan,
    calls: Vec<String>,
}

impl WorkspaceState {
    fn find_mut(&mut self, file_id: &str) -> Option<&mut WorkspaceEntry> {
        // Prefer the live entry when a tombstoned one shares the id
        let idx = self
            .entries
            .iter()
            .position(|e| e.file_id == file_id && !e.is_tombstoned())
            .or_else(|| self.entries.iter().position(|e| e.file_id == file_id))?;
        self.entries.get_mut(idx)
    }
}

/// In-memory workspace database
#[derive(Default)]
pub struct InMemoryWorkspace {
    state: Mutex<WorkspaceState>,
    next_id: AtomicU64,
}

impl InMemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without recording a call
    pub fn insert(&self, mut entry: WorkspaceEntry) {
        if entry.id.is_empty() {
            entry.id = format!("page-seed-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        }
        lock(&self.state).entries.push(entry);
    }

    /// Mutate an entry as a workspace user would
    pub fn edit<F: FnOnce(&mut WorkspaceEntry)>(&self, file_id: &str, f: F) {
        if let Some(entry) = lock(&self.state).find_mut(file_id) {
            f(entry);
        }
    }

    /// Attach file content to an entry
    pub fn attach(&self, file_id: &str, content: impl Into<Bytes>) {
        lock(&self.state)
            .attachments
            .insert(file_id.to_string(), content.into());
    }

    pub fn get(&self, file_id: &str) -> Option<WorkspaceEntry> {
        lock(&self.state).find_mut(file_id).map(|e| e.clone())
    }

    pub fn entries(&self) -> Vec<WorkspaceEntry> {
        lock(&self.state).entries.clone()
    }

    pub fn fail_next(&self, call: &str, error: BridgeError) {
        lock(&self.state).failures.push(call, error);
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self, call: &str) -> usize {
        let prefix = format!("{}:", call);
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    fn begin(&self, call: &str, arg: &str) -> Result<MutexGuard<'_, WorkspaceState>> {
        let mut state = lock(&self.state);
        state.calls.push(format!("{}:{}", call, arg));
        match state.failures.take(call) {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspace {
    async fn create_entry(&self, mut entry: WorkspaceEntry) -> Result<WorkspaceEntry> {
        let mut state = self.begin("create", &entry.file_id)?;
        if state
            .entries
            .iter()
            .any(|e| e.file_id == entry.file_id && !e.is_tombstoned())
        {
            return Err(BridgeError::OperationFailed(format!(
                "Entry for {} already exists",
                entry.file_id
            )));
        }
        state.entries.retain(|e| e.file_id != entry.file_id);
        entry.id = format!("page-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        state.entries.push(entry.clone());
        Ok(entry)
    }

    async fn update_entry(&self, file_id: &str, patch: EntryPatch) -> Result<WorkspaceEntry> {
        let mut state = self.begin("update", file_id)?;
        let entry = state
            .find_mut(file_id)
            .ok_or_else(|| BridgeError::NotFound(file_id.to_string()))?;
        entry.apply(&patch);
        let updated = entry.clone();
        if let Some(new_id) = patch.file_id.filter(|id| id != file_id) {
            if let Some(content) = state.attachments.remove(file_id) {
                state.attachments.insert(new_id, content);
            }
        }
        Ok(updated)
    }

    async fn delete_entry(&self, file_id: &str) -> Result<bool> {
        let mut state = self.begin("delete", file_id)?;
        match state.find_mut(file_id) {
            Some(entry) if !entry.is_tombstoned() => {
                entry.sync_status = EntrySyncStatus::Deleted;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_all_entries(&self) -> Result<Vec<WorkspaceEntry>> {
        let state = self.begin("list", "all")?;
        Ok(state.entries.clone())
    }

    async fn get_entry(&self, file_id: &str) -> Result<Option<WorkspaceEntry>> {
        let mut state = self.begin("get", file_id)?;
        Ok(state.find_mut(file_id).map(|e| e.clone()))
    }

    async fn search_entries(&self, query: &str) -> Result<Vec<WorkspaceEntry>> {
        let state = self.begin("search", query)?;
        let needle = query.to_lowercase();
        Ok(state
            .entries
            .iter()
            .filter(|e| {
                e.file_name.to_lowercase().contains(&needle)
                    || e
                        .extracted_text
                        .as_deref()
                        .is_some_and(|t| t.to_lowercase().contains(&needle))
                    || e.tags.iter().any(|t| t.to_lowercase() == needle)
            })
            .cloned()
            .collect())
    }

    async fn download_attachment(&self, entry: &WorkspaceEntry) -> Result<Bytes> {
        let state = self.begin("attachment", &entry.file_id)?;
        state
            .attachments
            .get(&entry.file_id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("attachment for {}", entry.file_id)))
    }
}

// ============================================================================
// OCR
// ============================================================================

#[derive(Debug, Default)]
struct OcrState {
    script: VecDeque<Result<OcrResponse>>,
    requests: Vec<OcrRequest>,
    healthy: bool,
}

/// OCR service that replays scripted responses, falling back to a default
pub struct ScriptedOcr {
    state: Mutex<OcrState>,
    fallback: OcrResponse,
}

impl ScriptedOcr {
    /// Every request succeeds with `fallback` unless a response is scripted
    pub fn new(fallback: OcrResponse) -> Self {
        Self {
            state: Mutex::new(OcrState {
                healthy: true,
                ..Default::default()
            }),
            fallback,
        }
    }

    pub fn push_response(&self, response: OcrResponse) {
        lock(&self.state).script.push_back(Ok(response));
    }

    pub fn push_error(&self, error: BridgeError) {
        lock(&self.state).script.push_back(Err(error));
    }

    pub fn set_healthy(&self, healthy: bool) {
        lock(&self.state).healthy = healthy;
    }

    pub fn requests(&self) -> Vec<OcrRequest> {
        lock(&self.state).requests.clone()
    }
}

#[async_trait]
impl OcrService for ScriptedOcr {
    async fn perform_ocr(&self, request: OcrRequest) -> Result<OcrResponse> {
        let mut state = lock(&self.state);
        state.requests.push(request);
        match state.script.pop_front() {
            Some(scripted) => scripted,
            None => Ok(self.fallback.clone()),
        }
    }

    async fn health_check(&self) -> Result<OcrHealth> {
        let state = lock(&self.state);
        Ok(OcrHealth {
            healthy: state.healthy,
            model: Some("scripted".to_string()),
            message: None,
        })
    }
}
