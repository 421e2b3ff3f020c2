use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::join_all;
use shared::{domain::ItemId, protocol::Item};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::{
    error::ControllerError,
    item_controller::{CollectionSink, ItemController, ItemView, DEFAULT_DELETE_DELAY},
    resource::{ItemResource, StoreReseeder},
    ClientEvent, LoadState,
};

/// Owns the session's collection and the item controllers rendered from it.
///
/// The collection only changes on confirmed results: a finished load, or an
/// item controller reporting a completed create, update or delete through
/// [`CollectionSink`].
pub struct ListController {
    resource: Arc<dyn ItemResource>,
    reseeder: Option<Arc<dyn StoreReseeder>>,
    delete_delay: Duration,
    events: broadcast::Sender<ClientEvent>,
    torn_down: AtomicBool,
    load_generation: AtomicU64,
    me: Weak<ListController>,
    state: Mutex<ListState>,
}

struct ListState {
    load_state: LoadState,
    // ascending by numeric id; display walks it in reverse
    items: BTreeMap<ItemId, Item>,
    controllers: HashMap<ItemId, Arc<ItemController>>,
    draft: Option<Arc<ItemController>>,
}

impl ListController {
    /// A list without the reset capability, using the default delete delay.
    pub fn new(resource: Arc<dyn ItemResource>) -> Arc<Self> {
        Self::new_with_dependencies(resource, None, DEFAULT_DELETE_DELAY)
    }

    pub fn new_with_dependencies(
        resource: Arc<dyn ItemResource>,
        reseeder: Option<Arc<dyn StoreReseeder>>,
        delete_delay: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new_cyclic(|me| Self {
            resource,
            reseeder,
            delete_delay,
            events,
            torn_down: AtomicBool::new(false),
            load_generation: AtomicU64::new(0),
            me: me.clone(),
            state: Mutex::new(ListState {
                load_state: LoadState::Idle,
                items: BTreeMap::new(),
                controllers: HashMap::new(),
                draft: None,
            }),
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn can_reset(&self) -> bool {
        self.reseeder.is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub async fn load_state(&self) -> LoadState {
        self.state.lock().await.load_state.clone()
    }

    /// Persisted items in display order, newest identifier first.
    pub async fn items(&self) -> Vec<Item> {
        let state = self.state.lock().await;
        state.items.values().rev().cloned().collect()
    }

    /// What the list renders: nothing while loading, otherwise the draft
    /// (if any) followed by persisted items in display order.
    pub async fn rows(&self) -> Vec<ItemView> {
        let state = self.state.lock().await;
        if state.load_state == LoadState::Loading {
            return Vec::new();
        }
        let mut rows = Vec::with_capacity(state.items.len() + 1);
        if let Some(draft) = &state.draft {
            rows.push(draft.view().await);
        }
        for id in state.items.keys().rev() {
            if let Some(controller) = state.controllers.get(id) {
                rows.push(controller.view().await);
            }
        }
        rows
    }

    pub async fn item(&self, id: &ItemId) -> Option<Arc<ItemController>> {
        self.state.lock().await.controllers.get(id).cloned()
    }

    pub async fn draft(&self) -> Option<Arc<ItemController>> {
        self.state.lock().await.draft.clone()
    }

    /// Fetches the whole collection and replaces the in-memory one.
    ///
    /// A result that arrives after teardown, or after a newer load or reset
    /// started, is dropped without touching state.
    pub async fn load(&self) -> Result<(), ControllerError> {
        if self.is_torn_down() {
            return Ok(());
        }
        let generation = self.load_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_load_state(LoadState::Loading).await;

        let result = self.resource.list().await;
        if self.is_stale(generation) {
            debug!(generation, "discarding stale load result");
            return Ok(());
        }

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(source) => {
                let error = ControllerError::Load { source };
                warn!(error = %error.report(), "item load failed");
                self.set_load_state(LoadState::Failed(error.report()))
                    .await;
                let _ = self.events.send(ClientEvent::Error {
                    slot: None,
                    message: error.report(),
                });
                return Err(error);
            }
        };

        let retired = {
            let mut state = self.state.lock().await;
            // a teardown or newer load may have won the race for the lock
            if self.is_stale(generation) {
                debug!(generation, "discarding stale load result");
                return Ok(());
            }
            state.items = fetched
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect();
            let controllers: HashMap<_, _> = state
                .items
                .values()
                .map(|item| (item.id.clone(), self.spawn_controller(Some(item.clone()))))
                .collect();
            state.load_state = LoadState::Ready;
            std::mem::replace(&mut state.controllers, controllers)
        };
        join_all(retired.values().map(|controller| controller.teardown())).await;

        let count = self.state.lock().await.items.len();
        info!(count, "items loaded");
        let _ = self.events.send(ClientEvent::LoadStateChanged(LoadState::Ready));
        self.emit_collection().await;
        Ok(())
    }

    /// Ensures a draft exists and returns it. Calling again while a draft is
    /// pending returns the same draft.
    pub async fn start_draft(&self) -> Option<Arc<ItemController>> {
        if self.is_torn_down() {
            return None;
        }
        let draft = {
            let mut state = self.state.lock().await;
            if let Some(existing) = &state.draft {
                return Some(Arc::clone(existing));
            }
            let draft = self.spawn_controller(None);
            state.draft = Some(Arc::clone(&draft));
            draft
        };
        let _ = self.events.send(ClientEvent::DraftChanged { present: true });
        Some(draft)
    }

    /// Asks the reseed collaborator to reseed the store, then reloads.
    pub async fn reset(&self) -> Result<(), ControllerError> {
        let Some(reseeder) = self.reseeder.clone() else {
            return Err(ControllerError::ResetUnavailable);
        };
        if self.is_torn_down() {
            return Ok(());
        }
        // invalidate any load still in flight
        self.load_generation.fetch_add(1, Ordering::SeqCst);

        let (retired, draft) = {
            let mut state = self.state.lock().await;
            state.items.clear();
            state.load_state = LoadState::Loading;
            (std::mem::take(&mut state.controllers), state.draft.take())
        };
        join_all(
            retired
                .values()
                .chain(draft.iter())
                .map(|controller| controller.teardown()),
        )
        .await;
        let _ = self
            .events
            .send(ClientEvent::LoadStateChanged(LoadState::Loading));
        if draft.is_some() {
            let _ = self.events.send(ClientEvent::DraftChanged { present: false });
        }
        self.emit_collection().await;

        info!("reseeding backing store");
        if let Err(source) = reseeder.reset().await {
            let error = ControllerError::Reseed { source };
            warn!(error = %error.report(), "reset failed");
            if !self.is_torn_down() {
                self.set_load_state(LoadState::Failed(error.report()))
                    .await;
                let _ = self.events.send(ClientEvent::Error {
                    slot: None,
                    message: error.report(),
                });
            }
            return Err(error);
        }
        self.load().await
    }

    /// Unmounts the list: pending delete timers are cancelled and late
    /// results from loads or item requests are ignored from here on.
    pub async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let (retired, draft) = {
            let mut state = self.state.lock().await;
            (std::mem::take(&mut state.controllers), state.draft.take())
        };
        join_all(
            retired
                .values()
                .chain(draft.iter())
                .map(|controller| controller.teardown()),
        )
        .await;
        debug!("list controller torn down");
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.is_torn_down() || self.load_generation.load(Ordering::SeqCst) != generation
    }

    fn spawn_controller(&self, item: Option<Item>) -> Arc<ItemController> {
        let sink: Weak<dyn CollectionSink> = self.me.clone();
        ItemController::new(
            item,
            Arc::clone(&self.resource),
            sink,
            self.delete_delay,
            self.events.clone(),
        )
    }

    async fn set_load_state(&self, load_state: LoadState) {
        self.state.lock().await.load_state = load_state.clone();
        let _ = self.events.send(ClientEvent::LoadStateChanged(load_state));
    }

    async fn emit_collection(&self) {
        let ids = self
            .state
            .lock()
            .await
            .items
            .keys()
            .rev()
            .cloned()
            .collect();
        let _ = self.events.send(ClientEvent::CollectionChanged { ids });
    }
}

#[async_trait]
impl CollectionSink for ListController {
    async fn add(&self, item: Item) {
        if self.is_torn_down() {
            return;
        }
        let (replaced, draft) = {
            let mut state = self.state.lock().await;
            let controller = self.spawn_controller(Some(item.clone()));
            state.items.insert(item.id.clone(), item.clone());
            let replaced = state.controllers.insert(item.id.clone(), controller);
            (replaced, state.draft.take())
        };
        if let Some(previous) = replaced {
            previous.teardown().await;
        }
        if let Some(draft) = draft {
            draft.teardown().await;
            let _ = self.events.send(ClientEvent::DraftChanged { present: false });
        }
        debug!(item_id = %item.id, "item added to collection");
        self.emit_collection().await;
    }

    async fn update(&self, item: Item) {
        if self.is_torn_down() {
            return;
        }
        {
            let mut state = self.state.lock().await;
            match state.items.get_mut(&item.id) {
                Some(existing) => *existing = item,
                None => {
                    debug!(item_id = %item.id, "update for item no longer in collection");
                    return;
                }
            }
        }
        self.emit_collection().await;
    }

    async fn remove(&self, item: Item) {
        if self.is_torn_down() {
            return;
        }
        let controller = {
            let mut state = self.state.lock().await;
            if state.items.remove(&item.id).is_none() {
                debug!(item_id = %item.id, "remove for item no longer in collection");
            }
            state.controllers.remove(&item.id)
        };
        if let Some(controller) = controller {
            controller.teardown().await;
        }
        self.emit_collection().await;
    }
}

#[cfg(test)]
#[path = "tests/list_controller_tests.rs"]
mod tests;
