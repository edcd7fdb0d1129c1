//! A bounded tool-using chat loop plus the cancellation service, grounded
//! in `original_source/services/agent_cancellation_service.py`.

pub mod cancellation;
pub mod tools;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ObbyResult;
use crate::summarizer::llm::LlmProvider;
use tools::{ToolContext, ToolRegistry};

const MAX_ITERATIONS: usize = 5;
const MAX_ITERATIONS_MESSAGE: &str =
    "The agent reached its iteration limit before producing a final answer. Try a narrower question.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Message {
            role: "user".to_string(),
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message {
            role: "assistant".to_string(),
            content: content.into(),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            role: "tool".to_string(),
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ParsedToolCall {
    id: Option<String>,
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ParsedToolCalls {
    tool_calls: Vec<ParsedToolCall>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    AssistantThinking { iteration: usize },
    ToolCall { name: String, arguments: Value },
    ToolResult { name: String, success: bool },
    AssistantResponse { text: String },
}

pub struct AgentOrchestrator {
    provider: Arc<dyn LlmProvider>,
    registry: ToolRegistry,
}

pub struct ChatOutcome {
    pub final_text: String,
    pub conversation: Vec<Message>,
}

impl AgentOrchestrator {
    pub fn new(provider: Arc<dyn LlmProvider>, registry: ToolRegistry) -> Self {
        AgentOrchestrator { provider, registry }
    }

    /// Tool schemas for `/api/chat/tools`, surfaced read-only since the
    /// registry itself is assembled once at startup.
    pub fn tool_definitions(&self) -> Vec<(String, String, Value)> {
        self.registry.definitions()
    }

    /// Runs the bounded tool-using chat loop. `on_event` receives progress
    /// notifications (for SSE relay) as they occur.
    pub async fn run_chat(
        &self,
        mut conversation: Vec<Message>,
        ctx: &ToolContext,
        mut on_event: impl FnMut(AgentEvent),
    ) -> ObbyResult<ChatOutcome> {
        for iteration in 0..MAX_ITERATIONS {
            on_event(AgentEvent::AssistantThinking { iteration });

            let prompt = self.render_prompt(&conversation);
            let completion = self.provider.complete(&prompt).await?;

            match parse_tool_calls(&completion) {
                Some(calls) if !calls.tool_calls.is_empty() => {
                    conversation.push(Message::assistant(completion.clone()));
                    for call in calls.tool_calls {
                        let call_id = call.id.clone().unwrap_or_else(|| call.name.clone());
                        on_event(AgentEvent::ToolCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        });

                        let result = match self.registry.get(&call.name) {
                            Some(tool) => tool.invoke(call.arguments, ctx).await,
                            None => tools::ToolResult::failed(format!("unknown tool '{}'", call.name)),
                        };

                        on_event(AgentEvent::ToolResult {
                            name: call.name.clone(),
                            success: result.success,
                        });

                        let content = if result.success {
                            result.content
                        } else {
                            format!("error: {}", result.error.unwrap_or_default())
                        };
                        conversation.push(Message::tool(call_id, content));
                    }
                }
                _ => {
                    conversation.push(Message::assistant(completion.clone()));
                    on_event(AgentEvent::AssistantResponse { text: completion.clone() });
                    return Ok(ChatOutcome {
                        final_text: completion,
                        conversation,
                    });
                }
            }
        }

        conversation.push(Message::assistant(MAX_ITERATIONS_MESSAGE));
        Ok(ChatOutcome {
            final_text: MAX_ITERATIONS_MESSAGE.to_string(),
            conversation,
        })
    }

    fn render_prompt(&self, conversation: &[Message]) -> String {
        let mut prompt = String::from(
            "You are a tool-using assistant over a watched note/code tree. \
             Available tools:\n",
        );
        for (name, description, schema) in self.registry.definitions() {
            prompt.push_str(&format!("- {name}: {description} (args schema: {schema})\n"));
        }
        prompt.push_str(
            "\nIf you need a tool, respond with ONLY a JSON object of the form \
             {\"tool_calls\":[{\"name\":\"...\",\"arguments\":{...}}]}. \
             Otherwise respond with your final answer in plain text.\n\nConversation:\n",
        );
        for message in conversation {
            prompt.push_str(&format!("{}: {}\n", message.role, message.content));
        }
        prompt
    }
}

fn parse_tool_calls(completion: &str) -> Option<ParsedToolCalls> {
    let trimmed = completion.trim();
    let json_start = trimmed.find('{')?;
    let candidate = &trimmed[json_start..];
    serde_json::from_str(candidate).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tool_calls_reads_a_leading_json_object() {
        let completion = r#"{"tool_calls":[{"name":"notes_search","arguments":{"query":"todo"}}]}"#;
        let parsed = parse_tool_calls(completion).unwrap();
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].name, "notes_search");
    }

    #[test]
    fn parse_tool_calls_returns_none_for_plain_text() {
        assert!(parse_tool_calls("just a normal answer").is_none());
    }
}
