use serde::{Deserialize, Serialize};

use crate::{domain::StatusAction, error::StatusDecodeError};

fn no_progress() -> i32 {
    -1
}

/// One status event as delivered on the push channel.
///
/// Every field except `action` is optional on the wire so that frames the
/// platform sends without a task id still decode; the collector decides what
/// to do with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMessage {
    #[serde(default)]
    pub task_id: String,
    pub action: StatusAction,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub alias_ids: Vec<String>,
    #[serde(default)]
    pub component_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sub_description: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default = "no_progress")]
    pub progress: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl StatusMessage {
    pub fn new(task_id: impl Into<String>, action: StatusAction) -> Self {
        Self {
            task_id: task_id.into(),
            action,
            id: String::new(),
            alias_ids: Vec::new(),
            component_type: String::new(),
            description: String::new(),
            sub_description: String::new(),
            device_id: String::new(),
            progress: no_progress(),
            result: None,
        }
    }

    /// Placeholder recorded locally when the platform accepted an operation.
    pub fn received(task_id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut message = Self::new(task_id, StatusAction::Received);
        message.description = text.into();
        message
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_progress(mut self, progress: i32) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn has_task_id(&self) -> bool {
        !self.task_id.trim().is_empty()
    }

    /// Progress in percent, `None` when the platform reported no progress.
    pub fn progress_percent(&self) -> Option<u8> {
        u8::try_from(self.progress).ok().filter(|p| *p <= 100)
    }

    pub fn from_text(text: &str) -> Result<Self, StatusDecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StatusDecodeError> {
        let text = std::str::from_utf8(bytes).map_err(|_| StatusDecodeError::NotUtf8)?;
        Self::from_text(text)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelType {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyValue {
    #[serde(default)]
    pub model_type: ModelType,
    #[serde(default)]
    pub value_type: String,
    #[serde(default)]
    pub id_short: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationVariable {
    #[serde(default)]
    pub value: PropertyValue,
}

impl OperationVariable {
    pub fn string_argument(index: usize, value: impl Into<String>) -> Self {
        Self {
            value: PropertyValue {
                model_type: ModelType {
                    name: "Property".to_string(),
                },
                value_type: "string".to_string(),
                id_short: format!("arg{index}"),
                value: serde_json::Value::String(value.into()),
            },
        }
    }
}

/// Body of an operation invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    pub input_arguments: Vec<OperationVariable>,
    pub request_id: String,
    pub inoutput_arguments: Vec<OperationVariable>,
    pub timeout: u64,
}

impl OperationRequest {
    pub fn new(params: &[String], request_id: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            input_arguments: params
                .iter()
                .enumerate()
                .map(|(index, value)| OperationVariable::string_argument(index, value.as_str()))
                .collect(),
            request_id: request_id.into(),
            inoutput_arguments: Vec::new(),
            timeout: timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub output_arguments: Vec<OperationVariable>,
}

impl OperationResponse {
    /// The templated reference (`{namespace::identifier}`) of an accepted operation.
    pub fn reference(&self) -> Option<&str> {
        self.output_arguments.first()?.value.value.as_str()
    }
}
