//! Tools the agent can call.
//!
//! A [`Tool`] advertises a name, a description, and a JSON Schema for its
//! arguments; the agent turns the registry into function-calling
//! definitions and dispatches the model's calls back through it.
//!
//! ```text
//! ┌──────────────────────────────┐
//! │         ToolRegistry         │
//! │  ┌────────────┐ ┌──────────┐ │
//! │  │ SearchTool │ │  Custom  │ │
//! │  │ (built-in) │ │  (Rust)  │ │
//! │  └────────────┘ └──────────┘ │
//! └──────────────┬───────────────┘
//!                ▼
//!         Agent::answer() loop
//! ```

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::llm::ToolDefinition;
use crate::search::Retriever;

/// A function the model may invoke.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use anyhow::Result;
/// use serde_json::{json, Value};
/// use wikiqa::tools::Tool;
///
/// pub struct ClockTool;
///
/// #[async_trait]
/// impl Tool for ClockTool {
///     fn name(&self) -> &str { "clock" }
///     fn description(&self) -> &str { "Current UTC time" }
///
///     fn parameters_schema(&self) -> Value {
///         json!({ "type": "object", "properties": {}, "required": [] })
///     }
///
///     async fn execute(&self, _params: Value) -> Result<String> {
///         Ok("12:00".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier the model calls the tool by.
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call it.
    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. The returned text becomes the observation the model sees.
    async fn execute(&self, params: Value) -> Result<String>;
}

/// Built-in knowledge-base search, backed by a shared [`Retriever`].
pub struct SearchTool {
    retriever: Arc<Retriever>,
    k: usize,
}

impl SearchTool {
    pub fn new(retriever: Arc<Retriever>, k: usize) -> Self {
        Self { retriever, k }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "This tool is used to answer questions by searching through available documentation from local knowledge base."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question or search query"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let question = params["question"].as_str().unwrap_or("");
        if question.trim().is_empty() {
            bail!("missing required argument 'question'");
        }
        let text = self.retriever.search(question, self.k).await?;
        if text.is_empty() {
            return Ok("No relevant documents found.".to_string());
        }
        Ok(text)
    }
}

/// Ordered set of tools, looked up by name.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Registry holding only the built-in search tool.
    pub fn with_search(retriever: Arc<Retriever>, k: usize) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SearchTool::new(retriever, k)));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Function-calling definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
