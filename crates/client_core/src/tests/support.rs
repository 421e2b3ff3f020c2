//! In-memory collaborators shared by the controller tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::ItemId,
    protocol::{Item, NewItem},
};
use tokio::sync::{oneshot, Mutex};

use crate::{resource::ItemResource, CollectionSink, StoreReseeder};

pub(crate) const TEST_DELAY: Duration = Duration::from_millis(1250);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Create(NewItem),
    Update(Item),
    Delete(ItemId),
}

#[derive(Default)]
pub(crate) struct FakeResource {
    items: Mutex<Vec<Item>>,
    next_id: Mutex<i64>,
    calls: Mutex<Vec<Call>>,
    gates: Mutex<HashMap<&'static str, oneshot::Receiver<()>>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl FakeResource {
    pub(crate) fn with_items(items: &[(&str, &str)]) -> Arc<Self> {
        let items: Vec<Item> = items.iter().map(|(id, text)| item(id, text)).collect();
        let next_id = items
            .iter()
            .filter_map(|item| item.id.numeric())
            .max()
            .unwrap_or(0);
        Arc::new(Self {
            items: Mutex::new(items),
            next_id: Mutex::new(next_id),
            ..Self::default()
        })
    }

    /// Blocks the next `op` call until the returned sender fires or drops.
    pub(crate) async fn hold(&self, op: &'static str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().await.insert(op, rx);
        tx
    }

    pub(crate) async fn fail(&self, op: &'static str) {
        self.failing.lock().await.insert(op);
    }

    pub(crate) async fn recover(&self, op: &'static str) {
        self.failing.lock().await.remove(op);
    }

    pub(crate) async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub(crate) async fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| {
                matches!(
                    (op, call),
                    ("list", Call::List)
                        | ("create", Call::Create(_))
                        | ("update", Call::Update(_))
                        | ("delete", Call::Delete(_))
                )
            })
            .count()
    }

    pub(crate) async fn replace_items(&self, items: &[(&str, &str)]) {
        *self.items.lock().await = items.iter().map(|(id, text)| item(id, text)).collect();
    }

    async fn enter(&self, op: &'static str, call: Call) -> Result<()> {
        self.calls.lock().await.push(call);
        let gate = self.gates.lock().await.remove(op);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.failing.lock().await.contains(op) {
            return Err(anyhow!("{op} unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ItemResource for FakeResource {
    async fn list(&self) -> Result<Vec<Item>> {
        self.enter("list", Call::List).await?;
        Ok(self.items.lock().await.clone())
    }

    async fn create(&self, new_item: NewItem) -> Result<Item> {
        self.enter("create", Call::Create(new_item.clone())).await?;
        let mut next_id = self.next_id.lock().await;
        *next_id += 1;
        let created = Item {
            id: ItemId::from(*next_id),
            text: new_item.text,
            created_at: new_item.created_at,
        };
        self.items.lock().await.push(created.clone());
        Ok(created)
    }

    async fn update(&self, item: Item) -> Result<Item> {
        self.enter("update", Call::Update(item.clone())).await?;
        let mut items = self.items.lock().await;
        let existing = items
            .iter_mut()
            .find(|existing| existing.id == item.id)
            .ok_or_else(|| anyhow!("item {} not found", item.id))?;
        existing.text = item.text;
        Ok(existing.clone())
    }

    async fn delete(&self, id: &ItemId) -> Result<()> {
        self.enter("delete", Call::Delete(id.clone())).await?;
        self.items.lock().await.retain(|item| &item.id != id);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeReseeder {
    pub(crate) resets: Mutex<usize>,
    pub(crate) fail: bool,
    seed: Option<Arc<FakeResource>>,
}

impl FakeReseeder {
    pub(crate) fn seeding(resource: Arc<FakeResource>) -> Arc<Self> {
        Arc::new(Self {
            seed: Some(resource),
            ..Self::default()
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl StoreReseeder for FakeReseeder {
    async fn reset(&self) -> Result<()> {
        *self.resets.lock().await += 1;
        if self.fail {
            return Err(anyhow!("reseed refused"));
        }
        if let Some(resource) = &self.seed {
            resource.replace_items(&[("1", "seed one"), ("2", "seed two")]).await;
            *resource.next_id.lock().await = 2;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reported {
    Added(Item),
    Updated(Item),
    Removed(Item),
}

/// Stands in for the list controller when exercising an item controller alone.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) reported: Mutex<Vec<Reported>>,
}

#[async_trait]
impl CollectionSink for RecordingSink {
    async fn add(&self, item: Item) {
        self.reported.lock().await.push(Reported::Added(item));
    }

    async fn update(&self, item: Item) {
        self.reported.lock().await.push(Reported::Updated(item));
    }

    async fn remove(&self, item: Item) {
        self.reported.lock().await.push(Reported::Removed(item));
    }
}

pub(crate) fn item(id: &str, text: &str) -> Item {
    Item {
        id: ItemId::new(id),
        text: text.to_string(),
        created_at: "2024-01-01T00:00:00Z".parse().expect("timestamp"),
    }
}

/// Lets spawned tasks run to their next real suspension point.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
