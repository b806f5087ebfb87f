use async_trait::async_trait;
use shared::protocol::StatusMessage;

pub mod collector;
pub mod invoker;
pub mod push_channel;

pub use collector::{
    CorrelationTable, ErrorPolicy, FinishedNotifier, ProcessRecord, RecordState, StatusCollector,
    StatusUpdate, Transition,
};
pub use invoker::{extract_task_id, Accepted, InvokeError, InvokerSettings, OperationInvoker};
pub use push_channel::{status_channel_url, PushChannelClient, PushChannelError};

/// Consumer of decoded push-channel messages.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn deliver(&self, message: StatusMessage);
}

#[async_trait]
impl StatusSink for StatusCollector {
    async fn deliver(&self, message: StatusMessage) {
        self.receive_status(message).await;
    }
}
