//! Scripted assistant platform for unit tests.

use super::{Assistant, AssistantClient, AssistantReply, BackboardError, ModelChoice, Thread};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub thread_id: String,
    pub content: String,
    pub model: ModelChoice,
}

#[derive(Default)]
struct FakeState {
    assistants: Vec<Assistant>,
    threads: Vec<Thread>,
    messages: Vec<SentMessage>,
    replies: VecDeque<String>,
    assistant_failures: u32,
    message_failures: u32,
}

#[derive(Default)]
pub struct FakeAssistant {
    state: Mutex<FakeState>,
}

impl FakeAssistant {
    /// Queues the content of a future reply. Unscripted replies are
    /// `reply-{n}`.
    pub fn reply(&self, content: &str) {
        self.state.lock().unwrap().replies.push_back(content.to_string());
    }

    pub fn fail_next_assistants(&self, count: u32) {
        self.state.lock().unwrap().assistant_failures = count;
    }

    pub fn fail_next_messages(&self, count: u32) {
        self.state.lock().unwrap().message_failures = count;
    }

    pub fn assistants(&self) -> Vec<Assistant> {
        self.state.lock().unwrap().assistants.clone()
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.state.lock().unwrap().threads.clone()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl AssistantClient for FakeAssistant {
    async fn create_assistant(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Assistant, BackboardError> {
        let mut state = self.state.lock().unwrap();
        if state.assistant_failures > 0 {
            state.assistant_failures -= 1;
            return Err(BackboardError::Http("connection refused".into()));
        }
        let assistant = Assistant {
            id: format!("asst-{}", state.assistants.len() + 1),
            name: name.to_string(),
            description: description.to_string(),
        };
        state.assistants.push(assistant.clone());
        Ok(assistant)
    }

    async fn create_thread(&self, assistant_id: &str) -> Result<Thread, BackboardError> {
        let mut state = self.state.lock().unwrap();
        let thread = Thread {
            id: format!("thread-{}", state.threads.len() + 1),
            assistant_id: assistant_id.to_string(),
        };
        state.threads.push(thread.clone());
        Ok(thread)
    }

    async fn add_message(
        &self,
        thread_id: &str,
        content: &str,
        model: ModelChoice,
    ) -> Result<AssistantReply, BackboardError> {
        let mut state = self.state.lock().unwrap();
        state.messages.push(SentMessage {
            thread_id: thread_id.to_string(),
            content: content.to_string(),
            model,
        });
        if state.message_failures > 0 {
            state.message_failures -= 1;
            return Err(BackboardError::Status {
                status: 500,
                body: "model overloaded".into(),
            });
        }
        let n = state.messages.len();
        let content = state
            .replies
            .pop_front()
            .unwrap_or_else(|| format!("reply-{n}"));
        Ok(AssistantReply {
            content,
            thread_id: thread_id.to_string(),
        })
    }
}
