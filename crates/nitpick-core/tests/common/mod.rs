//! Scripted backends shared by the session and registry tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use nitpick_core::provider::{
    BackendFactory, BackendRequest, BackendSession, Reply, SessionOptions,
};
use nitpick_core::session::{AgentConfig, ReviewResponder};
use nitpick_core::{Error, Result, ReviewerConfig};
use parking_lot::Mutex;

/// Prompts containing this never get a reply
pub const HANG: &str = "HANG";
/// Prompts containing this fail with a provider error
pub const FAIL: &str = "FAIL";
/// Prompts containing this take a while
pub const SLOW: &str = "SLOW";

/// Shared, ordered record of everything the fake backends saw
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.0.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

#[derive(Clone, Default)]
pub struct FakeBehavior {
    pub keeps_own_history: bool,
    pub fail_open: bool,
    pub fail_summary: bool,
}

pub struct FakeSession {
    log: EventLog,
    behavior: FakeBehavior,
    pending: Option<BackendRequest>,
    requests: Arc<Mutex<Vec<BackendRequest>>>,
    replies: usize,
}

#[async_trait]
impl BackendSession for FakeSession {
    async fn open(&mut self) -> Result<()> {
        self.log.push("open");
        if self.behavior.fail_open {
            return Err(Error::Provider("backend unavailable".into()));
        }
        Ok(())
    }

    async fn query(&mut self, request: BackendRequest) -> Result<()> {
        self.requests.lock().push(request.clone());
        self.pending = Some(request);
        Ok(())
    }

    fn receive_response(&mut self) -> BoxStream<'_, Result<Reply>> {
        let Some(request) = self.pending.take() else {
            return stream::once(async { Err(Error::Provider("no query".into())) }).boxed();
        };
        self.replies += 1;
        let n = self.replies;
        let log = self.log.clone();
        let prompt = request.prompt;

        stream::once(async move {
            log.push(format!("start:{}", prompt));
            if prompt.contains(HANG) {
                std::future::pending::<()>().await;
            }
            if prompt.contains(SLOW) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            if prompt.contains(FAIL) {
                log.push(format!("fail:{}", prompt));
                return Err(Error::Provider("scripted failure".into()));
            }
            log.push(format!("end:{}", prompt));
            Ok(Reply::text(format!("feedback #{}", n)))
        })
        .boxed()
    }

    async fn single_shot(&mut self, _system_prompt: &str, prompt: &str) -> Result<String> {
        self.log.push("single_shot");
        if self.behavior.fail_summary {
            return Err(Error::Provider("summary failed".into()));
        }
        Ok(format!("summary of {} chars", prompt.len()))
    }

    async fn close(&mut self) -> Result<()> {
        self.log.push("close");
        Ok(())
    }

    fn keeps_own_history(&self) -> bool {
        self.behavior.keeps_own_history
    }
}

/// Counts constructions; every session shares the factory's log
#[derive(Clone, Default)]
pub struct FakeFactory {
    pub created: Arc<AtomicUsize>,
    pub log: EventLog,
    pub requests: Arc<Mutex<Vec<BackendRequest>>>,
    pub behavior: FakeBehavior,
    pub missing_credentials: bool,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_behavior(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Prompts of every query, in order
    pub fn prompts(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.prompt.clone()).collect()
    }
}

impl BackendFactory for FakeFactory {
    fn create(&self, _options: &SessionOptions) -> Result<Box<dyn BackendSession>> {
        if self.missing_credentials {
            return Err(Error::Credentials("set FAKE_API_KEY".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            log: self.log.clone(),
            behavior: self.behavior.clone(),
            pending: None,
            requests: self.requests.clone(),
            replies: 0,
        }))
    }
}

/// Review-mode config that never touches prompt files on disk
pub fn review_config(project: &str) -> AgentConfig {
    AgentConfig::new(
        std::path::Path::new(project),
        &ReviewerConfig::default(),
        Arc::new(ReviewResponder),
        "You review code.".into(),
    )
}
