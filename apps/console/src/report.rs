use status_client::{ProcessRecord, RecordState};

pub fn state_label(record: &ProcessRecord) -> &'static str {
    match record.state() {
        RecordState::Pending if !record.is_successful() => "failing",
        RecordState::Pending => "pending",
        RecordState::FinishedOk => "succeeded",
        RecordState::FinishedFailed => "failed",
    }
}

/// One-line summary of a record for terminal output.
pub fn summarize(record: &ProcessRecord) -> String {
    let mut line = format!("{} [{}]", record.task_id(), state_label(record));
    if let Some(progress) = record.latest_progress() {
        line.push_str(&format!(" {progress}%"));
    }
    if let Some(last) = record.last_message() {
        line.push_str(&format!(" {}", last.action));
        if !last.description.is_empty() {
            line.push_str(&format!(": {}", last.description));
        }
        if let Some(result) = &last.result {
            line.push_str(&format!(" ({result})"));
        }
    }
    line
}
