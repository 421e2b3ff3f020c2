//! Per-entry edit session: the edit buffer, the save lifecycle and the
//! cancellable delayed delete started by checking an item.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::ItemId,
    protocol::{Item, NewItem},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{error::ControllerError, resource::ItemResource, ClientEvent};

pub const DEFAULT_DELETE_DELAY: Duration = Duration::from_millis(1250);

/// Receives confirmed results from item controllers. The list controller is
/// the only writer of the shared collection and implements this.
#[async_trait]
pub trait CollectionSink: Send + Sync {
    async fn add(&self, item: Item);
    async fn update(&self, item: Item);
    async fn remove(&self, item: Item);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemSlot {
    Draft,
    Persisted(ItemId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemPhase {
    Editing,
    Saving,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    pub slot: ItemSlot,
    pub committed: Option<Item>,
    pub buffer: String,
    pub phase: ItemPhase,
    pub marked_for_deletion: bool,
    pub autofocus: bool,
    pub checkable: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Created(Item),
    Updated(Item),
    /// Buffer equals the committed text; nothing was sent.
    Unchanged,
    /// A request is already outstanding or the controller was torn down.
    Skipped,
    /// The request completed after teardown and was not applied.
    Discarded,
}

struct PendingDelete {
    epoch: u64,
    task: JoinHandle<()>,
}

struct EditSession {
    committed: Option<Item>,
    buffer: String,
    phase: ItemPhase,
    marked_for_deletion: bool,
    pending_delete: Option<PendingDelete>,
    timer_epoch: u64,
    /// The delete request itself has been sent.
    deleting: bool,
    last_error: Option<String>,
}

pub struct ItemController {
    slot: ItemSlot,
    resource: Arc<dyn ItemResource>,
    sink: Weak<dyn CollectionSink>,
    delete_delay: Duration,
    events: broadcast::Sender<ClientEvent>,
    torn_down: AtomicBool,
    me: Weak<ItemController>,
    session: Mutex<EditSession>,
}

impl ItemController {
    /// `initial` is `None` for a draft.
    pub fn new(
        initial: Option<Item>,
        resource: Arc<dyn ItemResource>,
        sink: Weak<dyn CollectionSink>,
        delete_delay: Duration,
        events: broadcast::Sender<ClientEvent>,
    ) -> Arc<Self> {
        let slot = match &initial {
            Some(item) => ItemSlot::Persisted(item.id.clone()),
            None => ItemSlot::Draft,
        };
        let (buffer, phase) = match &initial {
            Some(item) => (item.text.clone(), ItemPhase::Idle),
            None => (String::new(), ItemPhase::Editing),
        };
        Arc::new_cyclic(|me| Self {
            slot,
            resource,
            sink,
            delete_delay,
            events,
            torn_down: AtomicBool::new(false),
            me: me.clone(),
            session: Mutex::new(EditSession {
                committed: initial,
                buffer,
                phase,
                marked_for_deletion: false,
                pending_delete: None,
                timer_epoch: 0,
                deleting: false,
                last_error: None,
            }),
        })
    }

    pub fn slot(&self) -> &ItemSlot {
        &self.slot
    }

    pub fn is_draft(&self) -> bool {
        self.slot == ItemSlot::Draft
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub async fn view(&self) -> ItemView {
        let session = self.session.lock().await;
        ItemView {
            slot: self.slot.clone(),
            committed: session.committed.clone(),
            buffer: session.buffer.clone(),
            phase: session.phase,
            marked_for_deletion: session.marked_for_deletion,
            autofocus: self.is_draft(),
            checkable: !self.is_draft(),
            last_error: session.last_error.clone(),
        }
    }

    /// Replaces the edit buffer. Ignored while a request is outstanding,
    /// mirroring the disabled input.
    pub async fn edit(&self, text: impl Into<String>) -> bool {
        {
            let mut session = self.session.lock().await;
            if self.is_torn_down() || session.phase == ItemPhase::Saving {
                return false;
            }
            session.buffer = text.into();
            session.phase = ItemPhase::Editing;
        }
        self.notify();
        true
    }

    /// Persists the edit buffer: create for a draft, update for a persisted
    /// item whose text changed.
    pub async fn commit(&self) -> Result<CommitOutcome, ControllerError> {
        let request = {
            let mut session = self.session.lock().await;
            if self.is_torn_down() || session.phase == ItemPhase::Saving {
                debug!(slot = ?self.slot, "commit ignored");
                return Ok(CommitOutcome::Skipped);
            }
            let request = match &session.committed {
                None => CommitRequest::Create(NewItem::new(session.buffer.clone(), Utc::now())),
                Some(item) if item.text == session.buffer => {
                    session.phase = ItemPhase::Idle;
                    return Ok(CommitOutcome::Unchanged);
                }
                Some(item) => CommitRequest::Update(Item {
                    id: item.id.clone(),
                    text: session.buffer.clone(),
                    created_at: item.created_at,
                }),
            };
            session.phase = ItemPhase::Saving;
            session.last_error = None;
            request
        };
        self.notify();

        match request {
            CommitRequest::Create(new_item) => match self.resource.create(new_item).await {
                Ok(item) => {
                    info!(item_id = %item.id, "item created");
                    self.settle(item.clone()).await;
                    let Some(sink) = self.live_sink() else {
                        return Ok(CommitOutcome::Discarded);
                    };
                    sink.add(item.clone()).await;
                    Ok(CommitOutcome::Created(item))
                }
                Err(source) => {
                    let error = ControllerError::Create { source };
                    self.fail(&error, false).await;
                    Err(error)
                }
            },
            CommitRequest::Update(candidate) => {
                let id = candidate.id.clone();
                match self.resource.update(candidate).await {
                    Ok(item) => {
                        self.settle(item.clone()).await;
                        let Some(sink) = self.live_sink() else {
                            return Ok(CommitOutcome::Discarded);
                        };
                        sink.update(item.clone()).await;
                        Ok(CommitOutcome::Updated(item))
                    }
                    Err(source) => {
                        let error = ControllerError::Update { id, source };
                        self.fail(&error, false).await;
                        Err(error)
                    }
                }
            }
        }
    }

    /// The check gesture. Checking (re)starts the delete countdown, unchecking
    /// cancels it. Returns `false` when the gesture is not available: drafts,
    /// a torn-down controller, checking while a request is in flight, or
    /// unchecking once the delete request has been sent.
    pub async fn set_checked(&self, checked: bool) -> bool {
        if self.is_draft() {
            return false;
        }
        {
            let mut session = self.session.lock().await;
            if self.is_torn_down() || session.deleting {
                return false;
            }
            // unchecking stays available during a save so the countdown can
            // still be cancelled
            if checked && session.phase == ItemPhase::Saving {
                return false;
            }
            if let Some(pending) = session.pending_delete.take() {
                pending.task.abort();
            }
            session.timer_epoch += 1;
            session.marked_for_deletion = checked;
            if checked {
                let epoch = session.timer_epoch;
                session.pending_delete = Some(PendingDelete {
                    epoch,
                    task: self.spawn_delete_timer(epoch),
                });
            }
        }
        debug!(slot = ?self.slot, checked, "check gesture");
        self.notify();
        true
    }

    /// Cancels any pending delete and stops results from being reported.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut session = self.session.lock().await;
        if let Some(pending) = session.pending_delete.take() {
            pending.task.abort();
        }
        session.marked_for_deletion = false;
    }

    fn spawn_delete_timer(&self, epoch: u64) -> JoinHandle<()> {
        let me = self.me.clone();
        // the countdown starts at the gesture, not when the task is first polled
        let deadline = Instant::now() + self.delete_delay;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(controller) = me.upgrade() {
                controller.delete_when_due(epoch).await;
            }
        })
    }

    async fn delete_when_due(&self, epoch: u64) {
        let item = {
            let mut session = self.session.lock().await;
            let armed = session
                .pending_delete
                .as_ref()
                .is_some_and(|pending| pending.epoch == epoch);
            if self.is_torn_down() || !armed {
                return;
            }
            if session.phase == ItemPhase::Saving {
                // a save is in flight; wait out another full delay
                session.pending_delete = Some(PendingDelete {
                    epoch,
                    task: self.spawn_delete_timer(epoch),
                });
                return;
            }
            let Some(item) = session.committed.clone() else {
                return;
            };
            // the handle belongs to this task; dropping it only detaches
            session.pending_delete = None;
            session.deleting = true;
            session.phase = ItemPhase::Saving;
            session.last_error = None;
            item
        };
        self.notify();

        match self.resource.delete(&item.id).await {
            Ok(()) => {
                info!(item_id = %item.id, "item deleted");
                {
                    let mut session = self.session.lock().await;
                    session.deleting = false;
                    session.phase = ItemPhase::Idle;
                }
                if let Some(sink) = self.live_sink() {
                    sink.remove(item).await;
                }
            }
            Err(source) => {
                let error = ControllerError::Delete {
                    id: item.id,
                    source,
                };
                self.fail(&error, true).await;
            }
        }
    }

    async fn settle(&self, confirmed: Item) {
        {
            let mut session = self.session.lock().await;
            session.buffer = confirmed.text.clone();
            session.committed = Some(confirmed);
            session.phase = ItemPhase::Idle;
        }
        self.notify();
    }

    /// Failed requests return the item to `Editing` with the buffer intact.
    async fn fail(&self, error: &ControllerError, clear_mark: bool) {
        let message = error.report();
        warn!(slot = ?self.slot, error = %message, "item request failed");
        {
            let mut session = self.session.lock().await;
            session.deleting = false;
            session.phase = ItemPhase::Editing;
            session.last_error = Some(message.clone());
            if clear_mark {
                session.marked_for_deletion = false;
            }
        }
        if self.is_torn_down() {
            return;
        }
        self.notify();
        let _ = self.events.send(ClientEvent::Error {
            slot: Some(self.slot.clone()),
            message,
        });
    }

    fn live_sink(&self) -> Option<Arc<dyn CollectionSink>> {
        if self.is_torn_down() {
            debug!(slot = ?self.slot, "discarding result after teardown");
            return None;
        }
        self.sink.upgrade()
    }

    fn notify(&self) {
        if !self.is_torn_down() {
            let _ = self.events.send(ClientEvent::ItemChanged {
                slot: self.slot.clone(),
            });
        }
    }
}

impl Drop for ItemController {
    fn drop(&mut self) {
        if let Some(pending) = self.session.get_mut().pending_delete.take() {
            pending.task.abort();
        }
    }
}

enum CommitRequest {
    Create(NewItem),
    Update(Item),
}

#[cfg(test)]
#[path = "tests/item_controller_tests.rs"]
mod tests;
