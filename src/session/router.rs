//! Per-identity event queues.
//!
//! Each active user gets one sequential worker fed by an unbounded queue, so
//! a user's events are handled in arrival order while different users run
//! concurrently. Workers retire after an idle period.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tracing::debug;

use crate::channels::InboundEvent;
use crate::profile::UserId;

/// Something that consumes one event at a time.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent);
}

type WorkerTable = Arc<Mutex<HashMap<UserId, UnboundedSender<InboundEvent>>>>;

pub struct SessionRouter {
    handler: Arc<dyn EventHandler>,
    idle: Duration,
    workers: WorkerTable,
}

impl SessionRouter {
    pub fn new(handler: Arc<dyn EventHandler>, idle: Duration) -> Self {
        Self {
            handler,
            idle,
            workers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Queue an event behind any earlier events from the same sender.
    pub fn dispatch(&self, event: InboundEvent) {
        let sender = event.sender;
        let mut workers = self.workers.lock().unwrap_or_else(|e| e.into_inner());

        let event = match workers.get(&sender) {
            Some(tx) => match tx.send(event) {
                Ok(()) => return,
                // Worker already gone; start a fresh one below.
                Err(mpsc::error::SendError(event)) => event,
            },
            None => event,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // A fresh channel always accepts while its receiver is alive.
        let _ = tx.send(event);
        workers.insert(sender, tx);
        debug!(user_id = sender, "Session worker started");

        tokio::spawn(run_worker(
            sender,
            rx,
            Arc::clone(&self.handler),
            Arc::clone(&self.workers),
            self.idle,
        ));
    }

    /// Users with a live worker.
    pub fn active_sessions(&self) -> usize {
        self.workers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

async fn run_worker(
    user: UserId,
    mut rx: UnboundedReceiver<InboundEvent>,
    handler: Arc<dyn EventHandler>,
    workers: WorkerTable,
    idle: Duration,
) {
    loop {
        let event = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                // Retire only if nothing arrived while we were deciding; the
                // table lock keeps dispatch from racing the removal.
                let mut table = workers.lock().unwrap_or_else(|e| e.into_inner());
                match rx.try_recv() {
                    Ok(event) => {
                        drop(table);
                        event
                    }
                    Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                        table.remove(&user);
                        debug!(user_id = user, "Session worker retired");
                        return;
                    }
                }
            }
        };
        handler.handle(event).await;
    }

    workers
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .remove(&user);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Inbound;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(UserId, String)>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: InboundEvent) {
            if let Inbound::Text(text) = &event.payload {
                // Vary the work so unordered handling would show up.
                let delay = text.len() as u64 % 3;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                self.seen.lock().unwrap().push((event.sender, text.clone()));
            }
        }
    }

    fn text(user: UserId, text: &str) -> InboundEvent {
        InboundEvent::new(user, Inbound::Text(text.into()))
    }

    async fn wait_for(recorder: &Recorder, count: usize) {
        for _ in 0..200 {
            if recorder.seen.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} events");
    }

    #[tokio::test]
    async fn per_user_order_is_preserved() {
        let recorder = Arc::new(Recorder::default());
        let router = SessionRouter::new(recorder.clone(), Duration::from_secs(5));

        let messages: Vec<String> = (0..20).map(|i| "x".repeat(i + 1)).collect();
        for m in &messages {
            router.dispatch(text(1, m));
            router.dispatch(text(2, m));
        }
        wait_for(&recorder, 40).await;

        let seen = recorder.seen.lock().unwrap();
        for user in [1, 2] {
            let got: Vec<&String> = seen
                .iter()
                .filter(|(u, _)| *u == user)
                .map(|(_, t)| t)
                .collect();
            assert_eq!(got, messages.iter().collect::<Vec<_>>());
        }
        assert_eq!(router.active_sessions(), 2);
    }

    #[tokio::test]
    async fn idle_workers_retire_and_restart() {
        let recorder = Arc::new(Recorder::default());
        let router = SessionRouter::new(recorder.clone(), Duration::from_millis(20));

        router.dispatch(text(1, "a"));
        wait_for(&recorder, 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(router.active_sessions(), 0);

        router.dispatch(text(1, "b"));
        wait_for(&recorder, 2).await;
        assert_eq!(router.active_sessions(), 1);
    }
}
