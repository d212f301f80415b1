//! Session agent: one long-lived reviewer conversation per key
//!
//! Work is queued on an unbounded channel and consumed by a single task, so
//! items for one key reach the backend strictly in submission order. The
//! consumer owns the backend session and the context manager; nothing else
//! touches them.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReviewerConfig;
use crate::context::{CompactionPolicy, ContextManager, Summarizer};
use crate::delivery::feedback_file;
use crate::error::{Error, Result};
use crate::prompts::PromptLoader;
use crate::provider::{
    BackendFactory, BackendRequest, BackendSession, Role, SessionOptions, query_text,
};

use super::strategy::{AgentStrategy, HookWatcher, ReviewResponder};
use super::types::{Payload, SessionKey, SessionStats, WorkItem};

/// Everything needed to build one agent
#[derive(Clone)]
pub struct AgentConfig {
    pub options: SessionOptions,
    pub strategy: Arc<dyn AgentStrategy>,
    pub auto_summary: bool,
    pub compaction: CompactionPolicy,
}

impl AgentConfig {
    pub fn new(
        project: &Path,
        config: &ReviewerConfig,
        strategy: Arc<dyn AgentStrategy>,
        system_prompt: String,
    ) -> Self {
        Self {
            options: SessionOptions {
                kind: config.backend,
                model: config.model.clone(),
                system_prompt,
                project_dir: project.to_path_buf(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                max_tool_iterations: config.max_tool_iterations,
            },
            strategy,
            auto_summary: config.auto_summary,
            compaction: CompactionPolicy::default(),
        }
    }

    /// Hook watcher for one host session, prompts loaded from disk
    pub fn hook(project: &Path, session_id: &str, config: &ReviewerConfig) -> Self {
        let watcher = HookWatcher::new(feedback_file(project, session_id), config.smart_triggers);
        let template = PromptLoader::for_project(project).load(watcher.mode());
        let system_prompt = watcher.prepare_system_prompt(&template);
        Self::new(project, config, Arc::new(watcher), system_prompt)
    }

    /// Review responder for a project, prompts loaded from disk
    pub fn review(project: &Path, config: &ReviewerConfig) -> Self {
        let responder = ReviewResponder;
        let template = PromptLoader::for_project(project).load(responder.mode());
        let system_prompt = responder.prepare_system_prompt(&template);
        Self::new(project, config, Arc::new(responder), system_prompt)
    }

    pub fn with_compaction(mut self, compaction: CompactionPolicy) -> Self {
        self.compaction = compaction;
        self
    }
}

/// Awaitable reply of [`SessionAgent::submit_request`]
#[derive(Debug)]
pub struct PendingReply {
    rx: oneshot::Receiver<Result<String>>,
}

impl Future for PendingReply {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the consumer died with the item unresolved
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(Error::Cancelled)))
    }
}

#[derive(Default)]
struct ControlState {
    tx: Option<mpsc::UnboundedSender<WorkItem>>,
    task: Option<JoinHandle<()>>,
    stopped: bool,
}

/// State shared between the agent handle and its consumer
struct Shared {
    pending: AtomicUsize,
    last_activity: Mutex<Instant>,
}

impl Shared {
    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }
}

pub struct SessionAgent {
    key: SessionKey,
    config: AgentConfig,
    factory: Arc<dyn BackendFactory>,
    control: Mutex<ControlState>,
    shared: Arc<Shared>,
    stats_rx: watch::Receiver<SessionStats>,
    stats_tx: Arc<watch::Sender<SessionStats>>,
    cancel: CancellationToken,
}

impl SessionAgent {
    pub fn new(key: SessionKey, config: AgentConfig, factory: Arc<dyn BackendFactory>) -> Self {
        let (stats_tx, stats_rx) = watch::channel(SessionStats::default());
        Self {
            key,
            config,
            factory,
            control: Mutex::new(ControlState::default()),
            shared: Arc::new(Shared {
                pending: AtomicUsize::new(0),
                last_activity: Mutex::new(Instant::now()),
            }),
            stats_rx,
            stats_tx: Arc::new(stats_tx),
            cancel: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn system_prompt(&self) -> &str {
        &self.config.options.system_prompt
    }

    /// Create the backend and spawn the consumer. No-op when already running.
    ///
    /// Backend construction errors (missing credentials) are returned here,
    /// before the agent ever runs.
    pub fn start(&self) -> Result<()> {
        let mut control = self.control.lock();
        if control.stopped {
            return Err(Error::SessionStopped);
        }
        if control.task.is_some() {
            return Ok(());
        }

        let backend = self.factory.create(&self.config.options)?;
        let (tx, rx) = mpsc::unbounded_channel();

        let consumer = Consumer {
            key: self.key.clone(),
            rx,
            backend,
            context: ContextManager::with_policy(self.config.compaction),
            strategy: self.config.strategy.clone(),
            auto_summary: self.config.auto_summary,
            cancel: self.cancel.clone(),
            shared: self.shared.clone(),
            stats: self.stats_tx.clone(),
        };

        info!(session = %self.key, model = %self.config.options.model, "Starting session agent");
        control.tx = Some(tx);
        control.task = Some(tokio::spawn(consumer.run()));
        Ok(())
    }

    /// Cancel the consumer and wait for it. Queued and in-flight requests
    /// resolve with [`Error::Cancelled`]. Idempotent.
    pub async fn stop(&self) {
        let task = {
            let mut control = self.control.lock();
            control.stopped = true;
            control.tx = None;
            control.task.take()
        };
        self.cancel.cancel();

        if let Some(task) = task {
            match task.await {
                Ok(()) => info!(session = %self.key, "Session agent stopped"),
                Err(e) if e.is_cancelled() => {}
                Err(e) => error!(session = %self.key, "Session consumer panicked: {}", e),
            }
        }
    }

    /// True while the consumer task is alive
    pub fn is_running(&self) -> bool {
        let control = self.control.lock();
        !control.stopped && control.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Queue an item without waiting for it
    pub fn submit_fire_and_forget(&self, payload: Payload) -> Result<()> {
        self.enqueue(WorkItem::FireAndForget(payload))
    }

    /// Queue an item and return a handle resolving to the reply text
    pub fn submit_request(&self, payload: Payload) -> Result<PendingReply> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(WorkItem::RequestReply(payload, tx))?;
        Ok(PendingReply { rx })
    }

    fn enqueue(&self, item: WorkItem) -> Result<()> {
        let control = self.control.lock();
        let tx = control.tx.as_ref().ok_or(Error::SessionStopped)?;

        debug!(session = %self.key, "Queueing {}", item.payload().label());
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        self.shared.touch();
        if tx.send(item).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::Agent(format!("Session consumer for {} has exited", self.key)));
        }
        Ok(())
    }

    /// Items queued or in flight
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn last_activity(&self) -> Instant {
        *self.shared.last_activity.lock()
    }

    /// Nothing pending and untouched for at least `max`
    pub fn is_idle(&self, max: Duration) -> bool {
        self.pending() == 0 && self.last_activity().elapsed() >= max
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats_rx.borrow().clone();
        stats.running = self.is_running();
        stats.pending = self.pending();
        stats.last_activity = self.last_activity();
        stats
    }

    /// Watch the stats published after every processed item
    pub fn subscribe(&self) -> watch::Receiver<SessionStats> {
        self.stats_rx.clone()
    }
}

impl std::fmt::Debug for SessionAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionAgent")
            .field("key", &self.key)
            .field("model", &self.config.options.model)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Summaries through the agent's own backend
struct BackendSummarizer<'a> {
    backend: &'a mut dyn BackendSession,
}

#[async_trait]
impl<'a> Summarizer for BackendSummarizer<'a> {
    async fn summarize(&mut self, system_prompt: &str, prompt: &str) -> Result<String> {
        self.backend.single_shot(system_prompt, prompt).await
    }
}

struct Consumer {
    key: SessionKey,
    rx: mpsc::UnboundedReceiver<WorkItem>,
    backend: Box<dyn BackendSession>,
    context: ContextManager,
    strategy: Arc<dyn AgentStrategy>,
    auto_summary: bool,
    cancel: CancellationToken,
    shared: Arc<Shared>,
    stats: Arc<watch::Sender<SessionStats>>,
}

impl Consumer {
    async fn run(mut self) {
        let cancel = self.cancel.clone();

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = self.open() => Some(res),
        };
        match opened {
            Some(Ok(())) => self.publish(true),
            Some(Err(e)) => {
                error!(session = %self.key, "Backend failed to open: {}", e);
                let message = e.to_string();
                self.shutdown(|| Error::Agent(format!("Backend failed to open: {}", message)))
                    .await;
                return;
            }
            None => {
                self.shutdown(|| Error::Cancelled).await;
                return;
            }
        }

        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = self.rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            let (payload, reply) = item.into_parts();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                res = self.process(&payload) => Some(res),
            };
            let Some(result) = result else {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(Error::Cancelled));
                }
                self.shared.pending.fetch_sub(1, Ordering::SeqCst);
                break;
            };

            // Stats first, so a requester woken by the reply sees them
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            self.shared.touch();
            self.publish(true);

            match reply {
                Some(reply) => {
                    if let Err(e) = &result {
                        warn!(session = %self.key, "Request {} failed: {}", payload.label(), e);
                    }
                    if reply.send(result.map(Option::unwrap_or_default)).is_err() {
                        debug!(session = %self.key, "Requester went away before the reply");
                    }
                }
                None => match result {
                    Ok(Some(text)) => self.strategy.on_result(payload.label(), &text),
                    Ok(None) => {}
                    Err(e) => warn!(session = %self.key, "Event {} failed: {}", payload.label(), e),
                },
            }
        }

        self.shutdown(|| Error::Cancelled).await;
    }

    /// Open the backend and establish the reviewer's identity
    async fn open(&mut self) -> Result<()> {
        self.backend.open().await?;

        let startup = self.strategy.startup_message().to_string();
        self.context.add(Role::User, &startup);
        let request = self.request_for(&startup);
        match query_text(self.backend.as_mut(), request).await {
            Ok(reply) => {
                debug!(session = %self.key, "Startup reply: {} chars", reply.len());
                self.context.add(Role::Assistant, reply);
            }
            Err(e) => warn!(session = %self.key, "Startup message failed: {}", e),
        }
        Ok(())
    }

    /// One item. `Ok(None)` means the strategy skipped it.
    async fn process(&mut self, payload: &Payload) -> Result<Option<String>> {
        let Some(prompt) = self.strategy.format_item(payload) else {
            return Ok(None);
        };

        info!(session = %self.key, "Processing {}", payload.label());
        self.context.add(Role::User, &prompt);
        if payload.is_review() {
            self.context.record_review();
        }

        if self.auto_summary && !self.backend.keeps_own_history() && self.context.should_compact()
        {
            let mut summarizer = BackendSummarizer {
                backend: self.backend.as_mut(),
            };
            if let Err(e) = self.context.compact(&mut summarizer).await {
                warn!(session = %self.key, "Compaction failed, keeping full history: {}", e);
            }
        }

        let request = self.request_for(&prompt);
        let reply = query_text(self.backend.as_mut(), request).await?;
        self.context.add(Role::Assistant, &reply);
        Ok(Some(reply))
    }

    fn request_for(&self, prompt: &str) -> BackendRequest {
        if self.backend.keeps_own_history() {
            BackendRequest::prompt_only(prompt)
        } else {
            BackendRequest {
                history: self.context.render(),
                prompt: prompt.to_string(),
            }
        }
    }

    fn publish(&self, running: bool) {
        let context = self.context.stats();
        self.stats.send_replace(SessionStats {
            running,
            reviews: context.total_reviews,
            turns: context.turns,
            has_summary: context.has_summary,
            pending: self.shared.pending.load(Ordering::SeqCst),
            last_activity: Instant::now(),
        });
    }

    /// Refuse new work, fail whatever is still queued, release the backend
    async fn shutdown(&mut self, reason: impl Fn() -> Error) {
        self.rx.close();
        while let Ok(item) = self.rx.try_recv() {
            if let (_, Some(reply)) = item.into_parts() {
                let _ = reply.send(Err(reason()));
            }
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
        }

        if let Err(e) = self.backend.close().await {
            warn!(session = %self.key, "Failed to close backend: {}", e);
        }
        self.publish(false);
        debug!(session = %self.key, "Session consumer exited");
    }
}
