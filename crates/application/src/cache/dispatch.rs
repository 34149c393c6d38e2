use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use domain::{TagChange, TagListener};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::{debug, warn};

use crate::observer::ListenerRegistry;

/// A listener plus the tag it watches; `None` watches every tag
pub struct Subscription {
    pub filter: Option<String>,
    pub listener: Arc<dyn TagListener>,
}

impl Subscription {
    pub fn matches(&self, change: &TagChange) -> bool {
        match &self.filter {
            Some(tag) => change.concerns(tag),
            None => true,
        }
    }
}

/// Changes that did not fit the queue, latest per tag
type Backlog = Arc<Mutex<BTreeMap<String, TagChange>>>;

/// Producer half of the change queue
#[derive(Clone)]
pub(crate) struct ChangeSender {
    tx: mpsc::Sender<TagChange>,
    backlog: Backlog,
}

pub(crate) struct ChangeReceiver {
    rx: mpsc::Receiver<TagChange>,
    backlog: Backlog,
}

pub(crate) fn change_queue(capacity: usize) -> (ChangeSender, ChangeReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let backlog = Backlog::default();
    (
        ChangeSender {
            tx,
            backlog: backlog.clone(),
        },
        ChangeReceiver { rx, backlog },
    )
}

impl ChangeSender {
    /// Non-blocking enqueue.
    ///
    /// When the queue is full the change is parked in the backlog, where a
    /// newer change for the same tag replaces it. A tag with a parked change
    /// keeps using the backlog until the dispatcher drains it, so per-tag
    /// order holds.
    pub(crate) fn publish(&self, changes: Vec<TagChange>) {
        let mut backlog = self.backlog.lock().unwrap_or_else(PoisonError::into_inner);
        for change in changes {
            debug!(tag = %change.name, value = %change.value, "Tag changed");
            if let Some(parked) = backlog.get_mut(&change.name) {
                let previous = parked.previous.take();
                *parked = TagChange { previous, ..change };
                continue;
            }
            match self.tx.try_send(change) {
                Ok(()) => {}
                Err(TrySendError::Full(change)) => {
                    warn!(tag = %change.name, "Notification queue full, coalescing change");
                    backlog.insert(change.name.clone(), change);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Dispatcher closed, discarding changes");
                    return;
                }
            }
        }
    }
}

enum Next {
    One(TagChange),
    Parked(Vec<TagChange>),
    Wait,
    Closed(Vec<TagChange>),
}

/// Delivers queued changes in order until every sender is dropped.
///
/// Runs on its own task so a slow or failing listener never stalls the
/// poll loop. Parked changes go out once the queue is empty.
pub(crate) async fn run_dispatcher(
    mut queue: ChangeReceiver,
    subscribers: Arc<ListenerRegistry<Subscription>>,
) {
    loop {
        let next = {
            let mut backlog = queue.backlog.lock().unwrap_or_else(PoisonError::into_inner);
            match queue.rx.try_recv() {
                Ok(change) => Next::One(change),
                Err(TryRecvError::Empty) if backlog.is_empty() => Next::Wait,
                Err(TryRecvError::Empty) => {
                    Next::Parked(std::mem::take(&mut *backlog).into_values().collect())
                }
                Err(TryRecvError::Disconnected) => {
                    Next::Closed(std::mem::take(&mut *backlog).into_values().collect())
                }
            }
        };

        match next {
            Next::One(change) => deliver(&subscribers, &change).await,
            Next::Parked(changes) => {
                for change in &changes {
                    deliver(&subscribers, change).await;
                }
            }
            Next::Wait => {
                if let Some(change) = queue.rx.recv().await {
                    deliver(&subscribers, &change).await;
                }
            }
            Next::Closed(changes) => {
                for change in &changes {
                    deliver(&subscribers, change).await;
                }
                break;
            }
        }
    }
    debug!("Change dispatcher drained");
}

async fn deliver(subscribers: &ListenerRegistry<Subscription>, change: &TagChange) {
    for subscription in subscribers.snapshot() {
        if !subscription.matches(change) {
            continue;
        }
        if let Err(e) = subscription.listener.on_tag_changed(change).await {
            warn!(tag = %change.name, error = %e, "Tag listener failed");
        }
    }
}
