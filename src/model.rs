//! Model adapter contract.
//!
//! The distilled original probes at call time whether its model object has a
//! `complete` or `chat` method. Here the capability is decided once, at
//! construction, as an explicit sum type — callers hand the controller a
//! `ModelAdapter::Completion(...)` or `ModelAdapter::Chat(...)` and every
//! subsequent call goes through the matching variant.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A model reachable via a single-prompt completion call.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> CoreResult<String>;
}

/// A model reachable via a multi-turn chat call.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[Message]) -> CoreResult<String>;
}

/// The capability a concrete model was constructed with. Selected once, not
/// probed per call.
pub enum ModelAdapter {
    Completion(Box<dyn CompletionModel>),
    Chat(Box<dyn ChatModel>),
}

impl ModelAdapter {
    /// Generate a reply to a single prompt, regardless of which underlying
    /// capability backs this adapter.
    pub async fn generate(&self, system_prompt: &str, prompt: &str) -> CoreResult<String> {
        match self {
            ModelAdapter::Completion(model) => {
                let combined = format!("{}\n\n{}", system_prompt, prompt);
                model.complete(&combined).await
            }
            ModelAdapter::Chat(model) => {
                let messages = vec![Message::system(system_prompt), Message::user(prompt)];
                model.chat(&messages).await
            }
        }
    }
}

/// A scripted model double, kept public (not `#[cfg(test)]`-gated) so the
/// top-level `tests/` integration crate can drive multi-component scenarios
/// with it, not just this crate's own inline unit tests.
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// A model double that plays back a fixed, ordered sequence of
    /// responses — one per call, in call order.
    pub struct ScriptedModel {
        responses: Mutex<std::collections::VecDeque<CoreResult<String>>>,
    }

    impl ScriptedModel {
        pub fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(|s| Ok(s.to_string())).collect()),
            }
        }

        pub fn with_results(responses: Vec<CoreResult<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
            }
        }

        fn next(&self) -> CoreResult<String> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    #[async_trait]
    impl CompletionModel for ScriptedModel {
        async fn complete(&self, _prompt: &str) -> CoreResult<String> {
            self.next()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, _messages: &[Message]) -> CoreResult<String> {
            self.next()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::ScriptedModel;
    use super::*;

    #[tokio::test]
    async fn completion_adapter_concatenates_prompts() {
        let adapter = ModelAdapter::Completion(Box::new(ScriptedModel::new(vec!["ok"])));
        let reply = adapter.generate("system", "user").await.unwrap();
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn chat_adapter_plays_back_in_order() {
        let adapter = ModelAdapter::Chat(Box::new(ScriptedModel::new(vec!["first", "second"])));
        assert_eq!(adapter.generate("s", "u1").await.unwrap(), "first");
        assert_eq!(adapter.generate("s", "u2").await.unwrap(), "second");
    }
}
