use std::{sync::Arc, time::Duration};

use reqwest::{Client, StatusCode};
use shared::{
    domain::PlanOperation,
    protocol::{OperationRequest, OperationResponse},
};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::collector::StatusCollector;

pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct InvokerSettings {
    /// Base url of the platform's operation endpoints.
    pub platform_url: String,
    pub timeout_ms: u64,
    /// Reused as `requestId` on every call when set; a fresh UUID per call otherwise.
    pub request_id: Option<String>,
}

impl InvokerSettings {
    pub fn new(platform_url: impl Into<String>) -> Self {
        Self {
            platform_url: platform_url.into(),
            timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            request_id: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("operation {operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("operation {operation} rejected with status {status}")]
    Rejected {
        operation: String,
        status: StatusCode,
    },
    #[error("operation {operation} returned an unreadable acknowledgement: {source}")]
    InvalidResponse {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("operation {operation} acknowledgement carried no task reference")]
    MissingReference { operation: String },
    #[error("operation {operation} acknowledgement carried an empty task id: {reference}")]
    EmptyTaskId { operation: String, reference: String },
}

/// An operation the platform accepted for asynchronous execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
    pub task_id: String,
    pub reference: String,
}

/// Extracts the task id from a `{namespace::identifier}` reference.
///
/// Returns the input unchanged when the delimiters are missing.
pub fn extract_task_id(reference: &str) -> &str {
    let Some(end) = reference.rfind('}') else {
        return reference;
    };
    let Some(colon) = reference[..end].rfind(':') else {
        return reference;
    };
    reference[colon + 1..end].trim()
}

pub struct OperationInvoker {
    http: Client,
    settings: InvokerSettings,
    collector: Arc<StatusCollector>,
}

impl OperationInvoker {
    pub fn new(settings: InvokerSettings, collector: Arc<StatusCollector>) -> Self {
        Self {
            http: Client::new(),
            settings,
            collector,
        }
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    pub fn operation_url(&self, operation: &str) -> String {
        format!(
            "{}/{operation}/invoke",
            self.settings.platform_url.trim_end_matches('/')
        )
    }

    /// Invokes `operation` and, once accepted, seeds a pending record for its task.
    pub async fn invoke_async(
        &self,
        operation: &str,
        params: &[String],
        timeout_ms: u64,
    ) -> Result<Accepted, InvokeError> {
        self.invoke_tracked(
            operation,
            params,
            timeout_ms,
            &format!("{operation} accepted"),
        )
        .await
    }

    pub async fn deploy_plan(&self, plan: &str) -> Result<Accepted, InvokeError> {
        self.invoke_plan_operation(PlanOperation::Deploy, vec![plan.to_string()], plan)
            .await
    }

    pub async fn undeploy_plan(&self, plan: &str) -> Result<Accepted, InvokeError> {
        self.invoke_plan_operation(PlanOperation::Undeploy, vec![plan.to_string()], plan)
            .await
    }

    pub async fn undeploy_plan_with_id(
        &self,
        plan: &str,
        instance_id: &str,
    ) -> Result<Accepted, InvokeError> {
        self.invoke_plan_operation(
            PlanOperation::UndeployWithId,
            vec![plan.to_string(), instance_id.to_string()],
            plan,
        )
        .await
    }

    async fn invoke_plan_operation(
        &self,
        operation: PlanOperation,
        params: Vec<String>,
        plan: &str,
    ) -> Result<Accepted, InvokeError> {
        let text = format!("{} of {plan} requested", operation.verb());
        self.invoke_tracked(
            operation.operation_name(),
            &params,
            self.settings.timeout_ms,
            &text,
        )
        .await
    }

    async fn invoke_tracked(
        &self,
        operation: &str,
        params: &[String],
        timeout_ms: u64,
        received_text: &str,
    ) -> Result<Accepted, InvokeError> {
        let reference = self.request_reference(operation, params, timeout_ms).await?;
        let task_id = extract_task_id(&reference).to_string();
        if task_id.is_empty() {
            error!("invoke: empty task id operation={operation} reference={reference}");
            return Err(InvokeError::EmptyTaskId {
                operation: operation.to_string(),
                reference,
            });
        }

        info!("invoke: operation accepted operation={operation} task_id={task_id}");
        self.collector
            .add_received_message(received_text, &task_id)
            .await;
        Ok(Accepted { task_id, reference })
    }

    async fn request_reference(
        &self,
        operation: &str,
        params: &[String],
        timeout_ms: u64,
    ) -> Result<String, InvokeError> {
        let body = OperationRequest::new(params, self.next_request_id(), timeout_ms);
        let response = self
            .http
            .post(self.operation_url(operation))
            .timeout(Duration::from_millis(timeout_ms))
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|source| {
                error!("invoke: operation request failed operation={operation}: {source}");
                match source.status() {
                    Some(status) => InvokeError::Rejected {
                        operation: operation.to_string(),
                        status,
                    },
                    None => InvokeError::Transport {
                        operation: operation.to_string(),
                        source,
                    },
                }
            })?;

        let body: OperationResponse =
            response
                .json()
                .await
                .map_err(|source| InvokeError::InvalidResponse {
                    operation: operation.to_string(),
                    source,
                })?;

        body.reference()
            .map(str::to_string)
            .ok_or_else(|| InvokeError::MissingReference {
                operation: operation.to_string(),
            })
    }

    fn next_request_id(&self) -> String {
        match &self.settings.request_id {
            Some(fixed) => fixed.clone(),
            None => Uuid::new_v4().to_string(),
        }
    }
}

#[cfg(test)]
#[path = "tests/invoker_tests.rs"]
mod tests;
