//! Bounded-wait background tasks
//!
//! A caller hands over a computation and waits a short while. If it
//! finishes in time the caller gets the data; otherwise it gets a `PENDING`
//! envelope with a task id to poll. The computation runs to completion
//! either way, so the cache it feeds is warm by the time the caller polls.

use crate::cache::{CachedResponse, ProcessType, ResponseStatus};
use crate::config::TasksConfig;
use crate::error::{LyraError, LyraResult};
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum TaskState {
    Pending,
    Succeeded(Value),
    Failed(Vec<String>),
}

/// Spawns computations and tracks their outcome by id
#[derive(Debug, Clone)]
pub struct TaskRunner {
    tasks: Arc<RwLock<HashMap<Uuid, TaskState>>>,
    wait: Duration,
    poll_interval: Duration,
}

impl TaskRunner {
    pub fn new(config: &TasksConfig) -> Self {
        Self::with_timing(
            Duration::from_millis(config.wait_ms),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    pub fn with_timing(wait: Duration, poll_interval: Duration) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            wait,
            poll_interval,
        }
    }

    /// Configured wait before a caller receives a pending handle
    pub fn default_wait(&self) -> Duration {
        self.wait
    }

    /// Route a caller polls for the result of `task_id`
    pub fn result_route(task_id: &Uuid) -> String {
        format!("/tasks/{}", task_id)
    }

    /// Spawn `future` and wait up to `wait` for it to finish
    pub async fn run<F>(&self, future: F, wait: Duration) -> CachedResponse
    where
        F: Future<Output = LyraResult<Vec<u8>>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        self.tasks.write().await.insert(id, TaskState::Pending);

        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            let state = match future.await {
                Ok(bytes) => match serde_json::from_slice(&bytes) {
                    Ok(value) => TaskState::Succeeded(value),
                    Err(e) => TaskState::Failed(vec![LyraError::from(e).to_string()]),
                },
                Err(e) => {
                    warn!("Background task {} failed: {}", id, e);
                    let mut errors = vec![e.to_string()];
                    if let Some(data) = e.data() {
                        errors.push(data.to_string());
                    }
                    TaskState::Failed(errors)
                }
            };
            tasks.write().await.insert(id, state);
        });

        let deadline = Instant::now() + wait;
        loop {
            let state = self.state(&id).await;
            if !matches!(state, Some(TaskState::Pending)) || Instant::now() >= deadline {
                debug!("Task {} answered after bounded wait", id);
                return envelope(id, state.unwrap_or(TaskState::Pending));
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn state(&self, id: &Uuid) -> Option<TaskState> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Current envelope for a task id
    pub async fn poll(&self, task_id: &str) -> LyraResult<CachedResponse> {
        let id = Uuid::parse_str(task_id).map_err(|_| LyraError::TaskNotFound(task_id.to_string()))?;
        let state = self
            .state(&id)
            .await
            .ok_or_else(|| LyraError::TaskNotFound(task_id.to_string()))?;
        Ok(envelope(id, state))
    }

    /// Poll a pending envelope until its task settles
    pub async fn wait_for(&self, response: CachedResponse) -> LyraResult<CachedResponse> {
        let mut response = response;
        while response.status == ResponseStatus::Pending {
            let Some(task_id) = response.task_id.clone() else {
                break;
            };
            sleep(self.poll_interval).await;
            response = self.poll(&task_id).await?;
        }
        Ok(response)
    }
}

fn envelope(id: Uuid, state: TaskState) -> CachedResponse {
    let (status, data, errors) = match state {
        TaskState::Pending => (ResponseStatus::Pending, None, None),
        TaskState::Succeeded(value) => (ResponseStatus::Success, Some(value), None),
        TaskState::Failed(errors) => (ResponseStatus::Failure, None, Some(errors)),
    };
    CachedResponse {
        status,
        process_type: ProcessType::AsyncBackground,
        data,
        errors,
        task_id: Some(id.to_string()),
        result_route: Some(TaskRunner::result_route(&id)),
        expires_after: None,
        ts: Utc::now().to_rfc3339(),
    }
}
