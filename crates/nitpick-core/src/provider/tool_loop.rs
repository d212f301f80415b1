//! Local tool-execution loop for raw chat-completion backends
//!
//! The provider only returns text or tool-call requests. We execute the
//! calls against the project directory, append the results and ask again,
//! until a turn comes back with no tool calls.
//!
//! Tool requests and their outputs live only inside one loop. The next query
//! is rebuilt from the conversation text, so the session keeps a short trace
//! of earlier calls (name and arguments, no outputs) and sends it as a system
//! note ahead of the newest prompt.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::tools::{file_tool_definitions, FileTools, ToolDefinition};

use super::logging::{log_llm_interaction, LogEntry};
use super::{
    BackendRequest, BackendSession, LlmMessage, Reply, SessionOptions, ToolInvocation,
};

/// Earlier tool calls remembered across queries
pub const MAX_TRACE_ENTRIES: usize = 20;
/// Longest argument text kept per trace entry
const MAX_TRACE_ARGS: usize = 200;

pub const TOOL_TRACE_HEADER: &str = "Tool calls from earlier turns (outputs not kept):";

/// One stateless chat-completion call
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Backend label for logs
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
    ) -> Result<Reply>;
}

/// Backend session that owns the message array and runs tools locally
pub struct RawChatSession<A: ChatApi> {
    api: A,
    system_prompt: String,
    tools: FileTools,
    definitions: Vec<ToolDefinition>,
    max_iterations: usize,
    pending: Option<Vec<LlmMessage>>,
    tool_executions: usize,
    trace: VecDeque<String>,
}

impl<A: ChatApi> RawChatSession<A> {
    pub fn new(api: A, options: &SessionOptions) -> Self {
        Self {
            api,
            system_prompt: options.system_prompt.clone(),
            tools: FileTools::new(options.project_dir.clone()),
            definitions: file_tool_definitions(),
            max_iterations: options.max_tool_iterations.max(1),
            pending: None,
            tool_executions: 0,
            trace: VecDeque::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Total tool calls executed over the session's lifetime
    pub fn tool_executions(&self) -> usize {
        self.tool_executions
    }

    /// System note listing earlier tool calls, if any were made
    pub fn trace_note(&self) -> Option<String> {
        if self.trace.is_empty() {
            return None;
        }
        let lines: Vec<_> = self.trace.iter().map(|t| format!("- {}", t)).collect();
        Some(format!("{}\n{}", TOOL_TRACE_HEADER, lines.join("\n")))
    }

    fn remember(&mut self, call: &ToolInvocation) {
        let mut args = call.arguments.to_string();
        if args.len() > MAX_TRACE_ARGS {
            let mut end = MAX_TRACE_ARGS;
            while !args.is_char_boundary(end) {
                end -= 1;
            }
            args.truncate(end);
            args.push_str("...");
        }
        if self.trace.len() == MAX_TRACE_ENTRIES {
            self.trace.pop_front();
        }
        self.trace.push_back(format!("{} {}", call.name, args));
    }

    async fn call(&self, messages: &[LlmMessage], tools: &[ToolDefinition]) -> Result<Reply> {
        let result = self.api.complete(&self.system_prompt, messages, tools).await;
        let error = result.as_ref().err().map(|e| e.to_string());
        log_llm_interaction(LogEntry {
            backend: self.api.name(),
            model: self.api.model(),
            messages,
            reply: result.as_ref().ok(),
            error: error.as_deref(),
        });
        result
    }

    /// Ask, execute requested tools, repeat until a text-only reply
    pub async fn run_tool_loop(&mut self, mut messages: Vec<LlmMessage>) -> Result<Reply> {
        for iteration in 0..self.max_iterations {
            let reply = self.call(&messages, &self.definitions).await?;

            if !reply.has_tool_calls() {
                debug!("Tool loop finished after {} iteration(s)", iteration + 1);
                return Ok(reply);
            }

            info!(
                "{} requested {} tool call(s)",
                self.api.name(),
                reply.tool_calls.len()
            );

            let mut results = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                let output = self.tools.execute(call).await;
                self.tool_executions += 1;
                self.remember(call);
                results.push(LlmMessage::tool_result(call.call_id.clone(), output));
            }

            messages.push(LlmMessage::AssistantToolCalls {
                content: reply.text,
                tool_calls: reply.tool_calls,
            });
            messages.extend(results);
        }

        warn!(
            "{} kept requesting tools after {} iterations",
            self.api.name(),
            self.max_iterations
        );
        Err(Error::ToolLoopExceeded(self.max_iterations))
    }
}

#[async_trait]
impl<A: ChatApi + 'static> BackendSession for RawChatSession<A> {
    async fn open(&mut self) -> Result<()> {
        debug!("Opened {} session with model {}", self.api.name(), self.api.model());
        Ok(())
    }

    async fn query(&mut self, request: BackendRequest) -> Result<()> {
        let mut messages: Vec<LlmMessage> =
            request.history.into_iter().map(LlmMessage::from).collect();
        if let Some(note) = self.trace_note() {
            let at = messages.len().saturating_sub(1);
            messages.insert(at, LlmMessage::system(note));
        }
        self.pending = Some(messages);
        Ok(())
    }

    fn receive_response(&mut self) -> BoxStream<'_, Result<Reply>> {
        let pending = self.pending.take();
        stream::once(async move {
            match pending {
                Some(messages) => self.run_tool_loop(messages).await,
                None => Err(Error::Provider("No query pending".to_string())),
            }
        })
        .boxed()
    }

    async fn single_shot(&mut self, system_prompt: &str, prompt: &str) -> Result<String> {
        let messages = [LlmMessage::user(prompt)];
        let result = self.api.complete(system_prompt, &messages, &[]).await;
        result.map(|reply| reply.text)
    }

    async fn close(&mut self) -> Result<()> {
        self.pending = None;
        Ok(())
    }
}
