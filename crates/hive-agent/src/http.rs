use crate::backend::{LlmBackend, LlmResponse};
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use hive_core::{HiveError, HiveResult, Message, Role, ToolCall, ToolDescriptor};
use serde::Serialize;

/// HTTP transport speaking the Anthropic messages format and the OpenAI
/// chat-completions format, selected by provider config.
pub struct HttpBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl HttpBackend {
    /// Creates a backend for the given model config.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    async fn chat_claude(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> HiveResult<LlmResponse> {
        let url = format!("{}/v1/messages", self.config.base_url());

        let api_messages: Vec<ClaudeMessage> = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ClaudeMessage {
                role: match m.role {
                    Role::User | Role::Tool => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                    Role::System => unreachable!(),
                },
                content: m.content.clone(),
            })
            .collect();

        let claude_tools: Vec<ClaudeTool> = tools
            .iter()
            .map(|t| ClaudeTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters_schema.clone(),
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": api_messages,
        });
        if let Some(sys) = system_prompt {
            body["system"] = serde_json::json!(sys);
        }
        if !claude_tools.is_empty() {
            body["tools"] = serde_json::to_value(&claude_tools)?;
        }

        let resp = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| HiveError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| HiveError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(HiveError::Http(format!(
                "Claude API error {status}: {resp_body}"
            )));
        }

        parse_claude_response(&resp_body)
    }

    async fn chat_openai(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> HiveResult<LlmResponse> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let mut api_messages: Vec<serde_json::Value> = Vec::new();
        if let Some(sys) = system_prompt {
            api_messages.push(serde_json::json!({"role": "system", "content": sys}));
        }
        for m in messages {
            if m.role == Role::System {
                continue;
            }
            api_messages.push(serde_json::json!({
                "role": match m.role {
                    Role::User | Role::Tool => "user",
                    Role::Assistant => "assistant",
                    Role::System => unreachable!(),
                },
                "content": m.content,
            }));
        }

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": api_messages,
        });
        if !tools.is_empty() {
            let openai_tools: Vec<serde_json::Value> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = serde_json::json!(openai_tools);
        }

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| HiveError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| HiveError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(HiveError::Http(format!(
                "OpenAI API error {status}: {resp_body}"
            )));
        }

        parse_openai_response(&resp_body)
    }
}

#[async_trait]
impl LlmBackend for HttpBackend {
    async fn chat(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> HiveResult<LlmResponse> {
        match self.config.provider {
            LlmProvider::Claude => self.chat_claude(system_prompt, messages, tools).await,
            LlmProvider::OpenAi => self.chat_openai(system_prompt, messages, tools).await,
        }
    }
}

#[derive(Serialize)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ClaudeTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

fn parse_claude_response(body: &serde_json::Value) -> HiveResult<LlmResponse> {
    let content = body["content"]
        .as_array()
        .ok_or_else(|| HiveError::Agent("missing content in Claude response".into()))?;

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in content {
        match block["type"].as_str() {
            Some("text") => {
                if let Some(t) = block["text"].as_str() {
                    text_parts.push(t.to_string());
                }
            }
            Some("tool_use") => {
                let id = block["id"].as_str().unwrap_or_default().to_string();
                let name = block["name"].as_str().unwrap_or_default().to_string();
                let arguments = block["input"].clone();
                tool_calls.push(ToolCall { id, name, arguments });
            }
            _ => {}
        }
    }

    if !tool_calls.is_empty() {
        Ok(LlmResponse::ToolUse {
            content: if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            },
            tool_calls,
        })
    } else {
        let stop_reason = body["stop_reason"].as_str().unwrap_or("end_turn");
        let text = text_parts.join("\n");
        if stop_reason == "end_turn" {
            Ok(LlmResponse::Done(text))
        } else {
            Ok(LlmResponse::Text(text))
        }
    }
}

fn parse_openai_response(body: &serde_json::Value) -> HiveResult<LlmResponse> {
    let choice = &body["choices"][0];
    let message = &choice["message"];
    let content = message["content"].as_str().unwrap_or_default().to_string();

    if let Some(tool_calls_json) = message["tool_calls"].as_array() {
        let tool_calls: Vec<ToolCall> = tool_calls_json
            .iter()
            .filter_map(|tc| {
                let id = tc["id"].as_str()?.to_string();
                let name = tc["function"]["name"].as_str()?.to_string();
                let arguments: serde_json::Value =
                    serde_json::from_str(tc["function"]["arguments"].as_str()?).unwrap_or_default();
                Some(ToolCall { id, name, arguments })
            })
            .collect();

        Ok(LlmResponse::ToolUse {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
        })
    } else {
        let finish_reason = choice["finish_reason"].as_str().unwrap_or("stop");
        if finish_reason == "stop" {
            Ok(LlmResponse::Done(content))
        } else {
            Ok(LlmResponse::Text(content))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_claude_tool_use() {
        let body = serde_json::json!({
            "content": [
                {"type": "text", "text": "Writing the file now."},
                {"type": "tool_use", "id": "tu_1", "name": "write_file",
                 "input": {"path": "API.md", "content": "# API"}}
            ],
            "stop_reason": "tool_use"
        });
        match parse_claude_response(&body).unwrap() {
            LlmResponse::ToolUse { content, tool_calls } => {
                assert_eq!(content.as_deref(), Some("Writing the file now."));
                assert_eq!(tool_calls.len(), 1);
                assert_eq!(tool_calls[0].name, "write_file");
                assert_eq!(tool_calls[0].arguments["path"], "API.md");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_claude_done() {
        let body = serde_json::json!({
            "content": [{"type": "text", "text": "All done."}],
            "stop_reason": "end_turn"
        });
        match parse_claude_response(&body).unwrap() {
            LlmResponse::Done(text) => assert_eq!(text, "All done."),
            other => panic!("expected Done, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_openai_tool_call() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "read_file", "arguments": "{\"path\": \"a.txt\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        match parse_openai_response(&body).unwrap() {
            LlmResponse::ToolUse { tool_calls, .. } => {
                assert_eq!(tool_calls[0].name, "read_file");
                assert_eq!(tool_calls[0].arguments["path"], "a.txt");
            }
            other => panic!("expected ToolUse, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_openai_done() {
        let body = serde_json::json!({
            "choices": [{"message": {"content": "finished"}, "finish_reason": "stop"}]
        });
        match parse_openai_response(&body).unwrap() {
            LlmResponse::Done(text) => assert_eq!(text, "finished"),
            other => panic!("expected Done, got {other:?}"),
        }
    }
}
