//! Session registry: at most one running agent per key

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::provider::BackendFactory;

use super::agent::{AgentConfig, SessionAgent};
use super::types::{SessionKey, SessionStats};

/// Owned by the process entry point and passed to every handler
pub struct SessionRegistry {
    agents: Mutex<HashMap<SessionKey, Arc<SessionAgent>>>,
    factory: Arc<dyn BackendFactory>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
        Self {
            agents: Mutex::new(HashMap::new()),
            factory,
        }
    }

    /// Return the running agent for `key`, building and starting one if needed.
    ///
    /// The lookup, construction and insertion happen under one lock, so
    /// concurrent callers for the same key share a single agent. `build` is
    /// only called when a new agent is created. An agent whose consumer has
    /// exited is stopped and replaced.
    pub async fn resolve<F>(&self, key: SessionKey, build: F) -> Result<Arc<SessionAgent>>
    where
        F: FnOnce() -> AgentConfig,
    {
        let mut agents = self.agents.lock().await;

        if let Some(agent) = agents.get(&key) {
            if agent.is_running() {
                return Ok(agent.clone());
            }
            warn!(session = %key, "Replacing dead session agent");
            if let Some(dead) = agents.remove(&key) {
                dead.stop().await;
            }
        }

        let agent = Arc::new(SessionAgent::new(key.clone(), build(), self.factory.clone()));
        agent.start()?;
        agents.insert(key, agent.clone());
        info!("Active sessions: {}", agents.len());
        Ok(agent)
    }

    /// [`resolve`](Self::resolve) for configs that read files. A live agent is
    /// returned without calling `load`; otherwise `load` runs on the blocking
    /// pool before the registry lock is taken.
    pub async fn resolve_or_load<F>(&self, key: SessionKey, load: F) -> Result<Arc<SessionAgent>>
    where
        F: FnOnce() -> AgentConfig + Send + 'static,
    {
        if let Some(agent) = self.get(&key).await
            && agent.is_running()
        {
            return Ok(agent);
        }
        let config = tokio::task::spawn_blocking(load)
            .await
            .map_err(|e| Error::Agent(format!("Config loader failed: {}", e)))?;
        self.resolve(key, move || config).await
    }

    pub async fn get(&self, key: &SessionKey) -> Option<Arc<SessionAgent>> {
        self.agents.lock().await.get(key).cloned()
    }

    /// Stop and forget one agent
    pub async fn remove(&self, key: &SessionKey) -> bool {
        let agent = self.agents.lock().await.remove(key);
        match agent {
            Some(agent) => {
                agent.stop().await;
                true
            }
            None => false,
        }
    }

    /// Stop every agent and empty the map
    pub async fn shutdown_all(&self) {
        let agents: Vec<_> = self.agents.lock().await.drain().map(|(_, a)| a).collect();
        if agents.is_empty() {
            return;
        }
        info!("Stopping {} session agents", agents.len());
        join_all(agents.iter().map(|agent| agent.stop())).await;
    }

    /// Evict agents with no pending work and no activity for `max`, plus any
    /// whose consumer has died. Returns the evicted keys.
    pub async fn sweep_idle(&self, max: Duration) -> Vec<SessionKey> {
        let evicted: Vec<_> = {
            let mut agents = self.agents.lock().await;
            let keys: Vec<_> = agents
                .iter()
                .filter(|(_, agent)| !agent.is_running() || agent.is_idle(max))
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| agents.remove(&key).map(|agent| (key, agent)))
                .collect()
        };

        for (key, agent) in &evicted {
            info!(session = %key, "Evicting idle session agent");
            agent.stop().await;
        }
        evicted.into_iter().map(|(key, _)| key).collect()
    }

    pub async fn len(&self) -> usize {
        self.agents.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.lock().await.is_empty()
    }

    /// Stats of every registered agent, ordered by key
    pub async fn snapshot(&self) -> Vec<(SessionKey, SessionStats)> {
        let agents = self.agents.lock().await;
        let mut stats: Vec<_> = agents
            .iter()
            .map(|(key, agent)| (key.clone(), agent.stats()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }
}
