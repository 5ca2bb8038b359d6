use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::directory::Contact;
use super::domain::{AlertId, AudienceKey};
use super::scheduler::ShutdownSignal;
use crate::obligations::domain::{AssetId, ObligationCategory};

pub const TEMPLATE_OBLIGATION_DUE: &str = "obligation_due";
pub const TEMPLATE_RENEWAL_CONFIRMED: &str = "renewal_confirmed";

/// Outbound message handed to the notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub template: String,
    pub audience: AudienceKey,
    pub recipients: Vec<Contact>,
    pub asset_id: AssetId,
    pub category: ObligationCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<AlertId>,
    pub details: BTreeMap<String, String>,
    pub attempts: u32,
}

impl Notice {
    pub fn new(
        template: &str,
        audience: AudienceKey,
        asset_id: AssetId,
        category: ObligationCategory,
    ) -> Self {
        Self {
            template: template.to_string(),
            audience,
            recipients: Vec::new(),
            asset_id,
            category,
            alert_id: None,
            details: BTreeMap::new(),
            attempts: 0,
        }
    }

    pub fn detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Mail or messaging transport. Implementations must not retry internally.
pub trait Notifier: Send + Sync {
    fn send(&self, notice: &Notice) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("notice delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("delivery queue is full")]
    QueueFull,
    #[error("delivery queue is closed")]
    QueueClosed,
}

#[derive(Debug, Default)]
struct DeliveryCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub failed: u64,
    pub awaiting_retry: usize,
}

/// Producer side of the delivery pipeline. Enqueueing never waits.
#[derive(Debug, Clone)]
pub struct DeliveryQueue {
    sender: mpsc::Sender<Notice>,
    failed: Arc<Mutex<Vec<Notice>>>,
    counters: Arc<DeliveryCounters>,
}

impl DeliveryQueue {
    pub fn channel<N>(capacity: usize, notifier: Arc<N>) -> (Self, DeliveryWorker<N>)
    where
        N: Notifier + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let failed = Arc::new(Mutex::new(Vec::new()));
        let counters = Arc::new(DeliveryCounters::default());
        let queue = Self {
            sender,
            failed: failed.clone(),
            counters: counters.clone(),
        };
        let worker = DeliveryWorker {
            receiver,
            notifier,
            failed,
            counters,
        };
        (queue, worker)
    }

    /// A notice that does not fit, or finds the worker gone, is parked with
    /// the failed notices so a later `requeue_failed` can pick it up.
    pub fn enqueue(&self, notice: Notice) -> Result<(), DeliveryError> {
        match self.sender.try_send(notice) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(notice)) => {
                lock(&self.failed).push(notice);
                Err(DeliveryError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(notice)) => {
                lock(&self.failed).push(notice);
                Err(DeliveryError::QueueClosed)
            }
        }
    }

    /// Moves failed notices back onto the queue; returns how many were requeued.
    pub fn requeue_failed(&self) -> usize {
        let mut failed = lock(&self.failed);
        let pending = std::mem::take(&mut *failed);
        let mut requeued = 0;
        for notice in pending {
            match self.sender.try_send(notice) {
                Ok(()) => requeued += 1,
                Err(mpsc::error::TrySendError::Full(notice))
                | Err(mpsc::error::TrySendError::Closed(notice)) => failed.push(notice),
            }
        }
        if requeued > 0 {
            debug!(requeued, remaining = failed.len(), "requeued failed notices");
        }
        requeued
    }

    pub fn failed_notices(&self) -> Vec<Notice> {
        lock(&self.failed).clone()
    }

    pub fn stats(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            awaiting_retry: lock(&self.failed).len(),
        }
    }
}

/// Consumer side: drains the queue into the notifier.
pub struct DeliveryWorker<N> {
    receiver: mpsc::Receiver<Notice>,
    notifier: Arc<N>,
    failed: Arc<Mutex<Vec<Notice>>>,
    counters: Arc<DeliveryCounters>,
}

impl<N> DeliveryWorker<N>
where
    N: Notifier + 'static,
{
    /// Delivers until shutdown is signalled or every queue handle is dropped,
    /// then flushes whatever is already buffered.
    pub async fn run(mut self, shutdown: ShutdownSignal) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                next = self.receiver.recv() => match next {
                    Some(notice) => self.deliver(notice),
                    None => return,
                },
            }
        }
        let flushed = self.drain_pending();
        debug!(flushed, "delivery worker stopped");
    }

    /// Delivers every notice currently buffered without waiting for more.
    pub fn drain_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(notice) = self.receiver.try_recv() {
            self.deliver(notice);
            processed += 1;
        }
        processed
    }

    fn deliver(&self, mut notice: Notice) {
        notice.attempts += 1;
        match self.notifier.send(&notice) {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    template = %notice.template,
                    audience = %notice.audience,
                    asset = %notice.asset_id,
                    category = %notice.category,
                    "notice delivered"
                );
            }
            Err(err) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    template = %notice.template,
                    audience = %notice.audience,
                    asset = %notice.asset_id,
                    category = %notice.category,
                    attempts = notice.attempts,
                    error = %err,
                    "notice delivery failed"
                );
                lock(&self.failed).push(notice);
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
