use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{domain::StatusAction, protocol::StatusMessage};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

const UPDATE_CHANNEL_CAPACITY: usize = 1024;
const RELOAD_CHANNEL_CAPACITY: usize = 64;

/// How an ERROR status affects the record it is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// ERROR marks the record as failed but leaves it open; only RESULT finishes it.
    #[default]
    KeepOpen,
    /// ERROR marks the record as failed and finished.
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Pending,
    FinishedOk,
    FinishedFailed,
}

/// Aggregated state of one tracked task.
///
/// Flags are monotonic: `is_finished` never goes back to false and
/// `is_successful` never goes back to true. Messages are kept in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecord {
    task_id: String,
    is_finished: bool,
    is_successful: bool,
    messages: Vec<StatusMessage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProcessRecord {
    fn new(task_id: String, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            is_finished: false,
            is_successful: true,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    pub fn is_successful(&self) -> bool {
        self.is_successful
    }

    pub fn messages(&self) -> &[StatusMessage] {
        &self.messages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn state(&self) -> RecordState {
        match (self.is_finished, self.is_successful) {
            (false, _) => RecordState::Pending,
            (true, true) => RecordState::FinishedOk,
            (true, false) => RecordState::FinishedFailed,
        }
    }

    pub fn last_message(&self) -> Option<&StatusMessage> {
        self.messages.last()
    }

    /// Progress of the most recent message that reported one.
    pub fn latest_progress(&self) -> Option<u8> {
        self.messages
            .iter()
            .rev()
            .find_map(StatusMessage::progress_percent)
    }
}

/// Effect of applying one message to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// No task id; nothing changed.
    Dropped,
    Appended,
    /// ERROR applied to a record that stays open.
    Failed,
    Finished { successful: bool },
}

/// Change notifications for views that need more than the single notifier slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Changed { task_id: String },
    Failed { task_id: String },
    Finished { task_id: String, successful: bool },
    Dismissed { task_id: String },
}

/// Insertion-ordered map from task id to its process record.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    records: HashMap<String, ProcessRecord>,
    order: Vec<String>,
    error_policy: ErrorPolicy,
}

impl CorrelationTable {
    pub fn new(error_policy: ErrorPolicy) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            error_policy,
        }
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    pub fn apply(&mut self, message: StatusMessage) -> Transition {
        if !message.has_task_id() {
            return Transition::Dropped;
        }

        let now = Utc::now();
        let error_policy = self.error_policy;
        let action = message.action;
        let order = &mut self.order;
        let record = self
            .records
            .entry(message.task_id.clone())
            .or_insert_with(|| {
                order.push(message.task_id.clone());
                ProcessRecord::new(message.task_id.clone(), now)
            });

        record.messages.push(message);
        record.updated_at = now;

        match action {
            StatusAction::Received
            | StatusAction::Added
            | StatusAction::Changed
            | StatusAction::Process => Transition::Appended,
            StatusAction::Result => {
                record.is_finished = true;
                Transition::Finished {
                    successful: record.is_successful,
                }
            }
            StatusAction::Error => {
                record.is_successful = false;
                match error_policy {
                    ErrorPolicy::KeepOpen => Transition::Failed,
                    ErrorPolicy::Finish => {
                        record.is_finished = true;
                        Transition::Finished { successful: false }
                    }
                }
            }
        }
    }

    pub fn dismiss(&mut self, task_id: &str) -> bool {
        if self.records.remove(task_id).is_none() {
            return false;
        }
        self.order.retain(|id| id != task_id);
        true
    }

    pub fn get(&self, task_id: &str) -> Option<&ProcessRecord> {
        self.records.get(task_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ProcessRecord> + '_ {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    pub fn snapshot(&self) -> Vec<ProcessRecord> {
        self.records().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub type FinishedNotifier = Arc<dyn Fn(bool) + Send + Sync>;

/// Owns the correlation table of one session and fans out its transitions.
///
/// Every mutation goes through the table lock; the finished notifier and the
/// broadcasts run after the lock is released so callbacks may query the
/// collector again.
pub struct StatusCollector {
    table: Mutex<CorrelationTable>,
    finished_notifier: RwLock<Option<FinishedNotifier>>,
    reload: broadcast::Sender<()>,
    updates: broadcast::Sender<StatusUpdate>,
}

impl StatusCollector {
    pub fn new() -> Arc<Self> {
        Self::with_error_policy(ErrorPolicy::default())
    }

    pub fn with_error_policy(error_policy: ErrorPolicy) -> Arc<Self> {
        let (reload, _) = broadcast::channel(RELOAD_CHANNEL_CAPACITY);
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Arc::new(Self {
            table: Mutex::new(CorrelationTable::new(error_policy)),
            finished_notifier: RwLock::new(None),
            reload,
            updates,
        })
    }

    pub async fn receive_status(&self, message: StatusMessage) -> Transition {
        let task_id = message.task_id.clone();
        let action = message.action;
        let transition = self.table.lock().await.apply(message);
        self.dispatch(&task_id, action, transition).await;
        transition
    }

    /// Seeds a pending record right after the platform accepted an operation.
    pub async fn add_received_message(&self, text: &str, task_id: &str) -> Transition {
        self.receive_status(StatusMessage::received(task_id, text))
            .await
    }

    pub async fn dismiss_status(&self, task_id: &str) -> bool {
        let removed = self.table.lock().await.dismiss(task_id);
        if removed {
            debug!("status: dismissed task_id={task_id}");
            let _ = self.updates.send(StatusUpdate::Dismissed {
                task_id: task_id.to_string(),
            });
        }
        removed
    }

    /// Replaces the terminal callback; the last registration wins.
    pub async fn set_finished_notifier<F>(&self, notifier: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        *self.finished_notifier.write().await = Some(Arc::new(notifier));
    }

    pub async fn clear_finished_notifier(&self) {
        self.finished_notifier.write().await.take();
    }

    pub fn trigger_data_reloading_action(&self) {
        let _ = self.reload.send(());
    }

    pub fn subscribe_reload(&self) -> broadcast::Receiver<()> {
        self.reload.subscribe()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    pub async fn list(&self) -> Vec<ProcessRecord> {
        self.table.lock().await.snapshot()
    }

    pub async fn get(&self, task_id: &str) -> Option<ProcessRecord> {
        self.table.lock().await.get(task_id).cloned()
    }

    pub async fn error_policy(&self) -> ErrorPolicy {
        self.table.lock().await.error_policy()
    }

    async fn dispatch(&self, task_id: &str, action: StatusAction, transition: Transition) {
        match transition {
            Transition::Dropped => {
                warn!("status: dropping {action} message without task id");
            }
            Transition::Appended => {
                debug!("status: {action} recorded task_id={task_id}");
                let _ = self.updates.send(StatusUpdate::Changed {
                    task_id: task_id.to_string(),
                });
            }
            Transition::Failed => {
                warn!("status: {action} marks task as failed task_id={task_id}");
                self.notify_finished(false).await;
                let _ = self.updates.send(StatusUpdate::Failed {
                    task_id: task_id.to_string(),
                });
            }
            Transition::Finished { successful } => {
                info!("status: task finished task_id={task_id} successful={successful}");
                self.notify_finished(successful).await;
                let _ = self.updates.send(StatusUpdate::Finished {
                    task_id: task_id.to_string(),
                    successful,
                });
                self.trigger_data_reloading_action();
            }
        }
    }

    async fn notify_finished(&self, successful: bool) {
        let notifier = self.finished_notifier.read().await.clone();
        if let Some(notifier) = notifier {
            notifier(successful);
        }
    }
}

#[cfg(test)]
#[path = "tests/collector_tests.rs"]
mod tests;
