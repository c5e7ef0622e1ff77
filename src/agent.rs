//! Question-answering agent.
//!
//! The agent runs a bounded tool-calling loop as an explicit state machine:
//!
//! ```text
//!            ┌──────────────────┐  tool calls   ┌────────────────┐
//!  start ──▶ │  AwaitingModel   │ ────────────▶ │ InvokingTools  │
//!            └──────────────────┘ ◀──────────── └────────────────┘
//!                     │ text          observations
//!                     ▼
//!                   Done
//! ```
//!
//! Every model call counts toward `max_iterations`; running out of
//! iterations without a final answer is an error. Tool problems (unknown
//! tool, malformed arguments, a failing search) are reported back to the
//! model as `Error: …` observations so it can retry.

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::Arc;

use crate::llm::{ChatModel, ChatResponse, Message, ToolCall};
use crate::tools::ToolRegistry;

/// Render the system prompt for an assistant.
pub fn system_prompt(name: &str, description: &str) -> String {
    format!(
        "Your are {name}, an AI assistant to help to answer questions based on local knowledge base.
{description}

Always use tools to answer technical questions.
Do not make up information.
If you can't find relevant information, say so.

To answer a question:
1. Understand what the user is asking
2. Use the search tool to find relevant information, try to call it multiple times with different queries if needed
3. Generate a comprehensive answer

Provide answer based solely on the search results, in 3 parts
- Summary
- Detail, be comprehensive, verbose, detailed and accurate, include examples if needed
- Sources (extract the \"Source\" part of the search results, it's a file path, not a link)
"
    )
}

/// One prior exchange supplied by the client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntry {
    pub question: Option<String>,
    pub answer: Option<String>,
}

impl HistoryEntry {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: Some(question.into()),
            answer: Some(answer.into()),
        }
    }

    /// Read one entry of a client's history list. Only objects with string
    /// `question` and `answer` fields count as a prior exchange.
    pub fn from_json(value: &Value) -> Option<Self> {
        let question = value.get("question")?.as_str()?;
        let answer = value.get("answer")?.as_str()?;
        Some(Self::new(question, answer))
    }
}

enum LoopState {
    AwaitingModel,
    InvokingTools(Vec<ToolCall>),
    Done(String),
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    system_prompt: String,
    max_iterations: usize,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        system_prompt: String,
        max_iterations: usize,
    ) -> Self {
        Self {
            model,
            tools,
            system_prompt,
            max_iterations,
        }
    }

    /// Conversation sent on the first model call: system prompt, complete
    /// history pairs in order, then the new question.
    pub fn initial_messages(&self, query: &str, history: &[HistoryEntry]) -> Vec<Message> {
        let mut messages = vec![Message::system(&self.system_prompt)];
        for entry in history {
            if let (Some(question), Some(answer)) = (&entry.question, &entry.answer) {
                messages.push(Message::user(question));
                messages.push(Message::assistant(answer));
            }
        }
        messages.push(Message::user(query));
        messages
    }

    /// Answer `query`, letting the model search as often as it needs.
    pub async fn answer(&self, query: &str, history: &[HistoryEntry]) -> Result<String> {
        let mut messages = self.initial_messages(query, history);
        let definitions = self.tools.definitions();
        let mut iterations = 0;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if iterations >= self.max_iterations {
                        bail!(
                            "agent stopped after {} iterations without a final answer",
                            self.max_iterations
                        );
                    }
                    iterations += 1;

                    match self.model.chat(&messages, &definitions).await? {
                        ChatResponse::Text(text) => LoopState::Done(text),
                        ChatResponse::ToolCalls { text, calls } => {
                            tracing::debug!(iteration = iterations, calls = calls.len(), "model requested tools");
                            messages.push(Message::assistant_tool_calls(
                                text.unwrap_or_default(),
                                calls.clone(),
                            ));
                            LoopState::InvokingTools(calls)
                        }
                    }
                }
                LoopState::InvokingTools(calls) => {
                    for call in calls {
                        let observation = self.invoke(&call).await;
                        messages.push(Message::tool_result(call.id, observation));
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(answer) => {
                    tracing::info!(iterations, "agent answered");
                    return Ok(answer);
                }
            };
        }
    }

    /// Run one tool call, turning every failure into an observation.
    async fn invoke(&self, call: &ToolCall) -> String {
        let Some(tool) = self.tools.find(&call.name) else {
            tracing::warn!(tool = %call.name, "model called unknown tool");
            return format!("Error: unknown tool '{}'", call.name);
        };

        let raw = if call.arguments.trim().is_empty() {
            "{}"
        } else {
            call.arguments.as_str()
        };
        let params: Value = match serde_json::from_str(raw) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => return format!("Error: arguments for '{}' must be a JSON object", call.name),
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "malformed tool arguments");
                return format!("Error: invalid JSON arguments for '{}': {}", call.name, e);
            }
        };

        tracing::info!(tool = %call.name, args = %params, "calling tool");
        match tool.execute(params).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = %call.name, error = format!("{:#}", e), "tool failed");
                format!("Error: {:#}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Role, ToolDefinition};
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every conversation it receives.
    struct ScriptedModel {
        responses: Mutex<VecDeque<ChatResponse>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(responses: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<Vec<Message>> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            let next = self.responses.lock().unwrap().pop_front();
            next.ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    struct FakeSearch;

    #[async_trait]
    impl Tool for FakeSearch {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object", "properties": { "question": { "type": "string" } } })
        }
        async fn execute(&self, params: Value) -> Result<String> {
            match params["question"].as_str() {
                Some(q) if !q.is_empty() => Ok(format!("Source: {}.md\n\nAbout {}", q, q)),
                _ => bail!("missing required argument 'question'"),
            }
        }
    }

    fn call(id: &str, name: &str, args: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: args.to_string(),
        }
    }

    fn agent(model: Arc<ScriptedModel>, max_iterations: usize) -> Agent {
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(FakeSearch));
        Agent::new(model, tools, system_prompt("Wiki", "Test wiki"), max_iterations)
    }

    fn last_tool_output(conversation: &[Message]) -> String {
        conversation
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool)
            .map(|m| m.content.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_system_prompt_mentions_name_and_sections() {
        let prompt = system_prompt("AKS Assistant", "Internal docs.");
        assert!(prompt.starts_with("Your are AKS Assistant,"));
        assert!(prompt.contains("Internal docs."));
        assert!(prompt.contains("- Summary"));
        assert!(prompt.contains("- Sources"));
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let model = ScriptedModel::new(vec![
            ChatResponse::ToolCalls {
                text: None,
                calls: vec![call("c1", "search", r#"{"question":"aks"}"#)],
            },
            ChatResponse::Text("Summary: AKS.".to_string()),
        ]);
        let answer = agent(model.clone(), 5).answer("What is AKS?", &[]).await.unwrap();
        assert_eq!(answer, "Summary: AKS.");

        let seen = model.seen();
        assert_eq!(seen.len(), 2);
        let second = &seen[1];
        assert_eq!(second[second.len() - 2].tool_calls.len(), 1);
        assert_eq!(second.last().unwrap().tool_call_id.as_deref(), Some("c1"));
        assert!(last_tool_output(second).starts_with("Source: aks.md"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_become_error_observation() {
        let model = ScriptedModel::new(vec![
            ChatResponse::ToolCalls {
                text: None,
                calls: vec![call("c1", "search", "{not json")],
            },
            ChatResponse::ToolCalls {
                text: None,
                calls: vec![call("c2", "search", "{}")],
            },
            ChatResponse::Text("recovered".to_string()),
        ]);
        let answer = agent(model.clone(), 5).answer("q", &[]).await.unwrap();
        assert_eq!(answer, "recovered");

        let seen = model.seen();
        assert!(last_tool_output(&seen[1]).starts_with("Error: invalid JSON arguments"));
        assert!(last_tool_output(&seen[2]).contains("question"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported() {
        let model = ScriptedModel::new(vec![
            ChatResponse::ToolCalls {
                text: Some("let me look".to_string()),
                calls: vec![call("c1", "browse", "{}")],
            },
            ChatResponse::Text("done".to_string()),
        ]);
        agent(model.clone(), 5).answer("q", &[]).await.unwrap();
        assert_eq!(
            last_tool_output(&model.seen()[1]),
            "Error: unknown tool 'browse'"
        );
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let looping: Vec<ChatResponse> = (0..5)
            .map(|i| ChatResponse::ToolCalls {
                text: None,
                calls: vec![call(&format!("c{}", i), "search", r#"{"question":"x"}"#)],
            })
            .collect();
        let model = ScriptedModel::new(looping);
        let err = agent(model.clone(), 3).answer("q", &[]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "agent stopped after 3 iterations without a final answer"
        );
        assert_eq!(model.seen().len(), 3);
    }

    #[tokio::test]
    async fn test_history_precedes_question() {
        let model = ScriptedModel::new(vec![ChatResponse::Text("a2".to_string())]);
        let history = vec![
            HistoryEntry::new("q1", "a1"),
            HistoryEntry {
                question: Some("dangling".to_string()),
                answer: None,
            },
        ];
        agent(model.clone(), 2).answer("q2", &history).await.unwrap();

        let first = &model.seen()[0];
        let roles: Vec<Role> = first.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(first[1].content, "q1");
        assert_eq!(first[2].content, "a1");
        assert_eq!(first[3].content, "q2");
    }

    #[test]
    fn test_history_entry_from_client_json() {
        assert_eq!(
            HistoryEntry::from_json(&json!({ "question": "q1", "answer": "a1", "id": 7 })),
            Some(HistoryEntry::new("q1", "a1"))
        );
        assert_eq!(HistoryEntry::from_json(&json!({ "question": "q1" })), None);
        assert_eq!(HistoryEntry::from_json(&json!({ "question": "q1", "answer": null })), None);
        assert_eq!(HistoryEntry::from_json(&json!("legacy")), None);
    }
}
