//! Dispatcher to worker transport.
//!
//! Every worker runs on its own task and owns its state. The dispatcher
//! talks to it through a bounded mailbox; each request carries a oneshot
//! reply slot and the caller waits on it under a timeout. A reply that
//! arrives after the caller gave up is dropped and logged, but the worker
//! still finished whatever side effect it started.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::errors::ErrorKind;
use switchboard_core::quota::describe_duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_MAILBOX_CAPACITY: usize = 32;

#[async_trait]
pub trait Worker: Send {
    fn capability(&self) -> CapabilityTag;

    /// Must always answer; failures are expressed as a failed response.
    async fn handle(&mut self, request: CapabilityRequest) -> CapabilityResponse;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub capability: CapabilityTag,
    pub handled: u64,
}

pub struct WorkerEnvelope {
    pub request: CapabilityRequest,
    pub reply: oneshot::Sender<CapabilityResponse>,
}

pub enum WorkerMessage {
    Request(WorkerEnvelope),
    Ping(oneshot::Sender<WorkerHealth>),
}

#[derive(Clone, Debug)]
pub struct WorkerHandle {
    capability: CapabilityTag,
    sender: mpsc::Sender<WorkerMessage>,
}

impl WorkerHandle {
    pub fn new(capability: CapabilityTag, sender: mpsc::Sender<WorkerMessage>) -> Self {
        Self { capability, sender }
    }

    pub fn capability(&self) -> CapabilityTag {
        self.capability
    }

    /// Sends one request and waits at most `timeout` for the reply. Never
    /// returns an error: a late reply becomes TIMEOUT and a dead worker
    /// becomes WORKER_UNAVAILABLE.
    pub async fn call(&self, request: CapabilityRequest, timeout: Duration) -> CapabilityResponse {
        let (reply, response) = oneshot::channel();
        let envelope = WorkerMessage::Request(WorkerEnvelope { request, reply });

        let exchange = async {
            self.sender.send(envelope).await.map_err(|_| ())?;
            response.await.map_err(|_| ())
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(response)) => response,
            Ok(Err(())) => {
                warn!(
                    event_name = "dispatch.worker.unavailable",
                    capability = %self.capability,
                    "worker mailbox closed"
                );
                CapabilityResponse::failed(
                    ErrorKind::WorkerUnavailable,
                    format!("The {} service is not running. Please retry shortly.", self.capability),
                )
            }
            Err(_) => {
                warn!(
                    event_name = "dispatch.worker.timeout",
                    capability = %self.capability,
                    timeout_ms = timeout.as_millis() as u64,
                    "worker did not reply in time"
                );
                CapabilityResponse::failed(
                    ErrorKind::Timeout,
                    format!(
                        "The {} service did not respond within {}. It may still finish; check before retrying.",
                        self.capability,
                        describe_duration(timeout)
                    ),
                )
            }
        }
    }

    pub async fn ping(&self, timeout: Duration) -> Option<WorkerHealth> {
        let (reply, health) = oneshot::channel();
        let exchange = async {
            self.sender.send(WorkerMessage::Ping(reply)).await.ok()?;
            health.await.ok()
        };
        tokio::time::timeout(timeout, exchange).await.ok().flatten()
    }
}

/// Starts the worker loop. The task ends once every handle is dropped.
pub fn spawn_worker<W>(worker: W, capacity: usize) -> (WorkerHandle, JoinHandle<()>)
where
    W: Worker + 'static,
{
    let capability = worker.capability();
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(run_worker(worker, receiver));
    (WorkerHandle::new(capability, sender), task)
}

async fn run_worker<W: Worker>(mut worker: W, mut receiver: mpsc::Receiver<WorkerMessage>) {
    let capability = worker.capability();
    let mut handled = 0_u64;
    info!(event_name = "worker.started", capability = %capability, "worker ready");

    while let Some(message) = receiver.recv().await {
        match message {
            WorkerMessage::Request(WorkerEnvelope { request, reply }) => {
                debug!(
                    event_name = "worker.request.received",
                    capability = %capability,
                    sender_id = %request.sender_id,
                    history_len = request.conversation_history.len(),
                    "handling request"
                );
                let response = worker.handle(request).await;
                handled += 1;
                if reply.send(response).is_err() {
                    warn!(
                        event_name = "worker.reply.dropped",
                        capability = %capability,
                        "caller stopped waiting before the reply was ready"
                    );
                }
            }
            WorkerMessage::Ping(reply) => {
                let _ = reply.send(WorkerHealth { capability, handled });
            }
        }
    }

    info!(event_name = "worker.stopped", capability = %capability, handled, "worker mailbox closed");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use switchboard_core::domain::capability::{
        CapabilityRequest, CapabilityResponse, CapabilityTag,
    };
    use switchboard_core::errors::ErrorKind;

    use super::{spawn_worker, Worker};

    struct SlowWorker {
        delay: Duration,
        side_effects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Worker for SlowWorker {
        fn capability(&self) -> CapabilityTag {
            CapabilityTag::Mail
        }

        async fn handle(&mut self, request: CapabilityRequest) -> CapabilityResponse {
            tokio::time::sleep(self.delay).await;
            self.side_effects.fetch_add(1, Ordering::SeqCst);
            CapabilityResponse::completed(format!("done: {}", request.original_text))
        }
    }

    #[tokio::test]
    async fn reply_within_timeout_is_returned() {
        let side_effects = Arc::new(AtomicUsize::new(0));
        let (handle, _task) = spawn_worker(
            SlowWorker { delay: Duration::ZERO, side_effects: side_effects.clone() },
            4,
        );

        let response =
            handle.call(CapabilityRequest::new("hi", "U1"), Duration::from_secs(1)).await;
        assert_eq!(response.summary(), Some("done: hi"));

        let health = handle.ping(Duration::from_secs(1)).await.expect("health");
        assert_eq!(health.handled, 1);
    }

    #[tokio::test]
    async fn slow_worker_times_out_but_still_completes_its_side_effect() {
        let side_effects = Arc::new(AtomicUsize::new(0));
        let (handle, _task) = spawn_worker(
            SlowWorker { delay: Duration::from_millis(150), side_effects: side_effects.clone() },
            4,
        );

        let response =
            handle.call(CapabilityRequest::new("send", "U1"), Duration::from_millis(20)).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::Timeout));
        assert!(response.error_message().is_some_and(|message| message.contains("may still finish")));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(side_effects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stopped_worker_reports_unavailable() {
        let side_effects = Arc::new(AtomicUsize::new(0));
        let (handle, task) =
            spawn_worker(SlowWorker { delay: Duration::ZERO, side_effects }, 4);
        task.abort();
        let _ = task.await;

        let response =
            handle.call(CapabilityRequest::new("hi", "U1"), Duration::from_secs(1)).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::WorkerUnavailable));
        assert!(handle.ping(Duration::from_millis(50)).await.is_none());
    }
}
