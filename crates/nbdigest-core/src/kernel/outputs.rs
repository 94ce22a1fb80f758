//! Collects iopub messages for one execute request into notebook outputs.

use crate::error::Result;
use crate::kernel::protocol::Message;
use crate::notebook::{DisplayData, ErrorOutput, ExecuteResult, Output, StreamOutput};

/// Whether the kernel is still working on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectState {
    Busy,
    Idle,
}

/// Accumulates outputs in arrival order.
#[derive(Debug, Default)]
pub struct OutputCollector {
    outputs: Vec<Output>,
    execution_count: Option<u32>,
    /// `clear_output(wait=True)` seen; clear before the next output lands.
    clear_pending: bool,
}

impl OutputCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one iopub message that belongs to our request.
    pub fn handle(&mut self, msg: &Message) -> Result<CollectState> {
        let content = &msg.content;

        match msg.msg_type() {
            "status" => {
                if content.get("execution_state").and_then(|s| s.as_str()) == Some("idle") {
                    return Ok(CollectState::Idle);
                }
            }
            "execute_input" => {
                self.record_count(content);
            }
            "stream" => {
                let stream: StreamOutput = serde_json::from_value(content.clone())?;
                self.push_stream(stream);
            }
            "execute_result" => {
                self.record_count(content);
                let result: ExecuteResult = serde_json::from_value(content.clone())?;
                self.push(Output::ExecuteResult(result));
            }
            "display_data" => {
                let display: DisplayData = serde_json::from_value(content.clone())?;
                self.push(Output::DisplayData(display));
            }
            "error" => {
                let error: ErrorOutput = serde_json::from_value(content.clone())?;
                self.push(Output::Error(error));
            }
            "clear_output" => {
                if content.get("wait").and_then(|w| w.as_bool()) == Some(true) {
                    self.clear_pending = true;
                } else {
                    self.outputs.clear();
                    self.clear_pending = false;
                }
            }
            other => {
                tracing::trace!("Ignoring iopub message '{}'", other);
            }
        }

        Ok(CollectState::Busy)
    }

    fn record_count(&mut self, content: &serde_json::Value) {
        if let Some(count) = content.get("execution_count").and_then(|c| c.as_u64()) {
            self.execution_count = u32::try_from(count).ok();
        }
    }

    fn push(&mut self, output: Output) {
        if self.clear_pending {
            self.outputs.clear();
            self.clear_pending = false;
        }
        self.outputs.push(output);
    }

    /// Consecutive chunks of the same stream become one output.
    fn push_stream(&mut self, stream: StreamOutput) {
        if !self.clear_pending
            && let Some(Output::Stream(last)) = self.outputs.last_mut()
            && last.name == stream.name
        {
            last.text.push_str(&stream.text);
            return;
        }
        self.push(Output::Stream(stream));
    }

    pub fn execution_count(&self) -> Option<u32> {
        self.execution_count
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn into_outputs(self) -> Vec<Output> {
        self.outputs
    }
}
