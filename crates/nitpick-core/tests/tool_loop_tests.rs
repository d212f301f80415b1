//! Tool loop tests for raw chat-completion backends

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use nitpick_core::provider::{
    query_text, BackendKind, BackendRequest, BackendSession, ChatApi, LlmMessage,
    RawChatSession, Reply, SessionOptions, ToolInvocation, TOOL_TRACE_HEADER,
};
use nitpick_core::tools::ToolDefinition;
use nitpick_core::{Error, Result};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

/// Replays scripted replies and records every message array it was sent
#[derive(Clone, Default)]
struct ScriptedApi {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    calls: Arc<Mutex<Vec<Vec<LlmMessage>>>>,
    tool_counts: Arc<Mutex<Vec<usize>>>,
}

impl ScriptedApi {
    fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Default::default()
        }
    }

    /// Always asks for the same tool
    fn looping() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatApi for ScriptedApi {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn complete(
        &self,
        _system_prompt: &str,
        messages: &[LlmMessage],
        tools: &[ToolDefinition],
    ) -> Result<Reply> {
        self.calls.lock().push(messages.to_vec());
        self.tool_counts.lock().push(tools.len());
        let next = self.replies.lock().pop_front();
        Ok(next.unwrap_or_else(|| Reply::text("").with_tool_call(read_call("call_x", "a.txt"))))
    }
}

fn read_call(id: &str, path: &str) -> ToolInvocation {
    ToolInvocation {
        call_id: id.into(),
        name: "read_file".into(),
        arguments: json!({ "file_path": path }),
    }
}

fn options(project: &Path, max_tool_iterations: usize) -> SessionOptions {
    SessionOptions {
        kind: BackendKind::OpenAICompatible,
        model: "scripted-1".into(),
        system_prompt: "review".into(),
        project_dir: project.to_path_buf(),
        temperature: 0.7,
        max_tokens: 1024,
        max_tool_iterations,
    }
}

mod tool_loop_tests {
    use super::*;

    #[tokio::test]
    async fn test_tool_then_text_yields_text_with_one_execution() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn main() {}").unwrap();

        let api = ScriptedApi::new(vec![
            Reply::text("").with_tool_call(read_call("call_1", "lib.rs")),
            Reply::text("✅ APPROVED"),
        ]);
        let mut session = RawChatSession::new(api.clone(), &options(dir.path(), 25));

        let text = query_text(&mut session, BackendRequest::prompt_only("review lib.rs"))
            .await
            .unwrap();

        assert_eq!(text, "✅ APPROVED");
        assert_eq!(session.tool_executions(), 1);

        let calls = api.calls.lock();
        assert_eq!(calls.len(), 2);
        // Second call carries the tool request and its result
        let second = &calls[1];
        assert!(matches!(second[1], LlmMessage::AssistantToolCalls { .. }));
        match &second[2] {
            LlmMessage::ToolResult { call_id, content } => {
                assert_eq!(call_id, "call_1");
                assert_eq!(content, "fn main() {}");
            }
            other => panic!("expected tool result, got {:?}", other),
        }
        assert!(api.tool_counts.lock().iter().all(|n| *n == 2));
    }

    #[tokio::test]
    async fn test_next_query_carries_earlier_tool_calls() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("lib.rs"), "fn main() {}").unwrap();

        let api = ScriptedApi::new(vec![
            Reply::text("").with_tool_call(read_call("call_1", "lib.rs")),
            Reply::text("first look done"),
            Reply::text("still fine"),
        ]);
        let mut session = RawChatSession::new(api.clone(), &options(dir.path(), 25));
        assert!(session.trace_note().is_none());

        query_text(&mut session, BackendRequest::prompt_only("review lib.rs"))
            .await
            .unwrap();
        query_text(&mut session, BackendRequest::prompt_only("and now?"))
            .await
            .unwrap();

        let calls = api.calls.lock();
        assert_eq!(calls.len(), 3);
        let third = &calls[2];
        assert_eq!(third.len(), 2);
        match &third[0] {
            LlmMessage::Chat(turn) => {
                assert!(turn.content.starts_with(TOOL_TRACE_HEADER));
                assert!(turn.content.contains("read_file"));
                assert!(turn.content.contains("lib.rs"));
            }
            other => panic!("expected trace note, got {:?}", other),
        }
        match &third[1] {
            LlmMessage::Chat(turn) => assert_eq!(turn.content, "and now?"),
            other => panic!("expected prompt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_errors_are_fed_back_as_text() {
        let dir = TempDir::new().unwrap();
        let api = ScriptedApi::new(vec![
            Reply::text("").with_tool_call(read_call("call_1", "missing.rs")),
            Reply::text("file is missing"),
        ]);
        let mut session = RawChatSession::new(api.clone(), &options(dir.path(), 25));

        let reply = session
            .run_tool_loop(vec![LlmMessage::user("check missing.rs")])
            .await
            .unwrap();
        assert_eq!(reply.text, "file is missing");

        let calls = api.calls.lock();
        match calls[1].last() {
            Some(LlmMessage::ToolResult { content, .. }) => {
                assert!(content.starts_with("Error reading file:"))
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_tool_stays_inside_project() {
        let dir = TempDir::new().unwrap();
        let write = ToolInvocation {
            call_id: "call_w".into(),
            name: "write_file".into(),
            arguments: json!({ "file_path": ".nitpick/s1.txt", "content": "stop mocking" }),
        };
        let api = ScriptedApi::new(vec![Reply::text("").with_tool_call(write), Reply::text("done")]);
        let mut session = RawChatSession::new(api, &options(dir.path(), 25));

        session.run_tool_loop(vec![LlmMessage::user("go")]).await.unwrap();
        let written = std::fs::read_to_string(dir.path().join(".nitpick/s1.txt")).unwrap();
        assert_eq!(written, "stop mocking");
    }

    #[tokio::test]
    async fn test_endless_tool_requests_hit_the_guard() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let api = ScriptedApi::looping();
        let mut session = RawChatSession::new(api.clone(), &options(dir.path(), 3));

        let err = session
            .run_tool_loop(vec![LlmMessage::user("loop")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ToolLoopExceeded(3)));
        assert_eq!(api.calls.lock().len(), 3);
        assert_eq!(session.tool_executions(), 3);
    }

    #[tokio::test]
    async fn test_single_shot_sends_no_tools() {
        let dir = TempDir::new().unwrap();
        let api = ScriptedApi::new(vec![Reply::text("summary")]);
        let mut session = RawChatSession::new(api.clone(), &options(dir.path(), 25));

        let text = session.single_shot("summarize", "old turns").await.unwrap();
        assert_eq!(text, "summary");
        assert_eq!(*api.tool_counts.lock(), vec![0]);
    }
}
