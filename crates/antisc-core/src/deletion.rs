//! Deferred, idempotent deletion of the bot's own notification messages.
//!
//! A single scan task wakes up every `scan_interval`, drops entries that are
//! done and spawns one deletion attempt per entry that has waited out the
//! grace period. Failed attempts stay pending and are retried on later ticks.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{domain::MessageRef, logging::Logger, messaging::port::PlatformPort};

#[derive(Clone, Copy, Debug)]
pub struct DeletionConfig {
    pub scan_interval: Duration,
    /// Minimum age before the first deletion attempt.
    pub grace_period: Duration,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(2),
            grace_period: Duration::from_secs(8),
        }
    }
}

#[derive(Debug)]
pub struct PendingDeletion {
    pub target: MessageRef,
    pub requested_at: Instant,
    /// Set only after the platform confirmed the message is gone.
    deleted: Mutex<bool>,
}

impl PendingDeletion {
    fn new(target: MessageRef, requested_at: Instant) -> Self {
        Self {
            target,
            requested_at,
            deleted: Mutex::new(false),
        }
    }
}

struct Runner {
    cancel: CancellationToken,
    scan: JoinHandle<()>,
    attempts: TaskTracker,
}

#[derive(Clone)]
pub struct DeletionQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    platform: Arc<dyn PlatformPort>,
    logger: Arc<dyn Logger>,
    cfg: DeletionConfig,
    pending: StdMutex<HashMap<MessageRef, Arc<PendingDeletion>>>,
    runner: Mutex<Option<Runner>>,
}

impl DeletionQueue {
    pub fn new(
        platform: Arc<dyn PlatformPort>,
        logger: Arc<dyn Logger>,
        cfg: DeletionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                platform,
                logger,
                cfg,
                pending: StdMutex::new(HashMap::new()),
                runner: Mutex::new(None),
            }),
        }
    }

    /// Register `target` for deletion. Re-registering a pending message is a no-op.
    pub fn push(&self, target: MessageRef) {
        let mut pending = self.inner.lock_pending();
        pending
            .entry(target)
            .or_insert_with(|| Arc::new(PendingDeletion::new(target, Instant::now())));
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock_pending().len()
    }

    pub fn is_pending(&self, target: MessageRef) -> bool {
        self.inner.lock_pending().contains_key(&target)
    }

    /// Start the scan loop. Calling it again while running does nothing.
    pub async fn start(&self) {
        let mut runner = self.inner.runner.lock().await;
        if runner.is_some() {
            self.inner.logger.warn("deleter", "start called twice; ignoring");
            return;
        }

        let cancel = CancellationToken::new();
        let attempts = TaskTracker::new();
        let scan = tokio::spawn(scan_loop(
            self.inner.clone(),
            cancel.clone(),
            attempts.clone(),
        ));
        *runner = Some(Runner {
            cancel,
            scan,
            attempts,
        });
        self.inner.logger.info("deleter", "deletion queue started");
    }

    /// Cancel the scan loop and wait for it and every attempt it spawned.
    pub async fn stop(&self) {
        let Some(runner) = self.inner.runner.lock().await.take() else {
            return;
        };

        runner.cancel.cancel();
        if let Err(e) = runner.scan.await {
            self.inner
                .logger
                .error("deleter", &format!("scan loop ended abnormally: {e}"));
        }
        runner.attempts.close();
        runner.attempts.wait().await;

        self.inner.logger.info(
            "deleter",
            &format!("deletion queue stopped ({} pending)", self.pending_len()),
        );
    }

    #[cfg(test)]
    fn scan_once(&self, cancel: &CancellationToken, attempts: &TaskTracker) {
        scan(&self.inner, cancel, attempts);
    }
}

impl QueueInner {
    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<MessageRef, Arc<PendingDeletion>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn scan_loop(inner: Arc<QueueInner>, cancel: CancellationToken, attempts: TaskTracker) {
    let mut tick = tokio::time::interval(inner.cfg.scan_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of `interval` fires immediately.
    tick.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => scan(&inner, &cancel, &attempts),
        }
    }
}

fn scan(inner: &Arc<QueueInner>, cancel: &CancellationToken, attempts: &TaskTracker) {
    let now = Instant::now();
    let mut pending = inner.lock_pending();

    pending.retain(|_, entry| {
        match entry.deleted.try_lock() {
            Ok(deleted) if *deleted => return false,
            Ok(_) => {}
            // An attempt holds the entry right now.
            Err(_) => return true,
        }

        if now.saturating_duration_since(entry.requested_at) < inner.cfg.grace_period {
            return true;
        }

        attempts.spawn(attempt_delete(
            inner.clone(),
            entry.clone(),
            cancel.clone(),
        ));
        true
    });
}

async fn attempt_delete(
    inner: Arc<QueueInner>,
    entry: Arc<PendingDeletion>,
    cancel: CancellationToken,
) {
    let mut deleted = tokio::select! {
        _ = cancel.cancelled() => return,
        guard = entry.deleted.lock() => guard,
    };
    // A duplicate dispatch from an earlier tick may have finished first.
    if *deleted {
        return;
    }

    let res = tokio::select! {
        _ = cancel.cancelled() => return,
        res = inner.platform.delete_message(entry.target) => res,
    };

    match res {
        Ok(()) => {
            *deleted = true;
            inner.logger.debug(
                "deleter",
                &format!(
                    "deleted message {} in chat {}",
                    entry.target.message_id.0, entry.target.chat_id.0
                ),
            );
        }
        // The platform answered; the message is gone or can never be deleted.
        Err(e) if e.is_platform() => {
            *deleted = true;
            inner.logger.warn(
                "deleter",
                &format!(
                    "message {} in chat {} treated as deleted: {e}",
                    entry.target.message_id.0, entry.target.chat_id.0
                ),
            );
        }
        Err(e) => {
            inner.logger.warn(
                "deleter",
                &format!(
                    "delete of message {} in chat {} failed, will retry: {e}",
                    entry.target.message_id.0, entry.target.chat_id.0
                ),
            );
        }
    }
}
