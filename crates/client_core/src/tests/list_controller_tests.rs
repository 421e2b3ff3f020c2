use super::*;
use crate::{
    item_controller::{CommitOutcome, ItemSlot},
    test_support::{settle, FakeReseeder, FakeResource, TEST_DELAY},
};

fn list_over(resource: &Arc<FakeResource>) -> Arc<ListController> {
    ListController::new_with_dependencies(resource.clone(), None, TEST_DELAY)
}

fn resettable_list(
    resource: &Arc<FakeResource>,
    reseeder: &Arc<FakeReseeder>,
) -> Arc<ListController> {
    let reseeder: Arc<dyn StoreReseeder> = reseeder.clone();
    ListController::new_with_dependencies(resource.clone(), Some(reseeder), TEST_DELAY)
}

async fn ids(list: &ListController) -> Vec<String> {
    list.items()
        .await
        .into_iter()
        .map(|item| item.id.to_string())
        .collect()
}

#[tokio::test]
async fn load_orders_items_newest_id_first() {
    let resource = FakeResource::with_items(&[("1", "A"), ("10", "J"), ("2", "B")]);
    let list = list_over(&resource);

    list.load().await.expect("load");

    assert_eq!(ids(&list).await, vec!["10", "2", "1"]);
    assert_eq!(list.load_state().await, LoadState::Ready);
    assert_eq!(resource.count("list").await, 1);
}

#[tokio::test(start_paused = true)]
async fn draft_then_check_walkthrough() {
    let resource = FakeResource::with_items(&[("1", "A"), ("2", "B")]);
    let list = list_over(&resource);
    list.load().await.expect("load");
    assert_eq!(ids(&list).await, vec!["2", "1"]);

    let draft = list.start_draft().await.expect("draft");
    draft.edit("C").await;
    let outcome = draft.commit().await.expect("create");
    assert!(matches!(outcome, CommitOutcome::Created(ref created) if created.id.as_str() == "3"));

    assert_eq!(ids(&list).await, vec!["3", "2", "1"]);
    assert!(list.draft().await.is_none());
    assert_eq!(resource.count("create").await, 1);

    let two = list.item(&ItemId::new("2")).await.expect("item 2");
    assert!(two.set_checked(true).await);
    tokio::time::sleep(TEST_DELAY + Duration::from_millis(10)).await;
    settle().await;

    assert_eq!(ids(&list).await, vec!["3", "1"]);
    assert_eq!(resource.count("delete").await, 1);
    assert!(list.item(&ItemId::new("2")).await.is_none());
    assert!(two.is_torn_down());
}

#[tokio::test]
async fn rows_put_the_draft_first() {
    let resource = FakeResource::with_items(&[("1", "A"), ("2", "B")]);
    let list = list_over(&resource);
    list.load().await.expect("load");
    list.start_draft().await.expect("draft");

    let slots: Vec<ItemSlot> = list.rows().await.into_iter().map(|row| row.slot).collect();
    assert_eq!(
        slots,
        vec![
            ItemSlot::Draft,
            ItemSlot::Persisted(ItemId::new("2")),
            ItemSlot::Persisted(ItemId::new("1")),
        ]
    );
}

#[tokio::test]
async fn start_draft_is_idempotent() {
    let resource = FakeResource::with_items(&[]);
    let list = list_over(&resource);
    list.load().await.expect("load");

    let first = list.start_draft().await.expect("draft");
    first.edit("half typed").await;
    let second = list.start_draft().await.expect("draft");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.view().await.buffer, "half typed");
}

#[tokio::test]
async fn update_shows_up_only_once_confirmed() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    list.load().await.expect("load");
    let controller = list.item(&ItemId::new("1")).await.expect("item 1");
    let release = resource.hold("update").await;

    controller.edit("A2").await;
    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.commit().await }
    });
    settle().await;
    assert_eq!(list.items().await[0].text, "A");

    release.send(()).expect("release");
    pending.await.expect("join").expect("commit");
    assert_eq!(list.items().await[0].text, "A2");
}

#[tokio::test]
async fn failed_update_leaves_collection_untouched() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    resource.fail("update").await;
    let list = list_over(&resource);
    list.load().await.expect("load");
    let controller = list.item(&ItemId::new("1")).await.expect("item 1");

    controller.edit("A2").await;
    assert!(controller.commit().await.is_err());

    assert_eq!(list.items().await[0].text, "A");
    assert_eq!(controller.view().await.buffer, "A2");
}

#[tokio::test]
async fn failed_create_keeps_the_draft() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    resource.fail("create").await;
    let list = list_over(&resource);
    list.load().await.expect("load");

    let draft = list.start_draft().await.expect("draft");
    draft.edit("C").await;
    let err = draft.commit().await.expect_err("create fails");
    assert!(matches!(err, ControllerError::Create { .. }));

    assert_eq!(ids(&list).await, vec!["1"]);
    let still_there = list.draft().await.expect("draft kept");
    assert!(Arc::ptr_eq(&draft, &still_there));
    assert_eq!(still_there.view().await.buffer, "C");
}

#[tokio::test(start_paused = true)]
async fn unchecking_in_time_keeps_the_item() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    list.load().await.expect("load");
    let controller = list.item(&ItemId::new("1")).await.expect("item 1");

    controller.set_checked(true).await;
    tokio::time::sleep(TEST_DELAY / 2).await;
    controller.set_checked(false).await;
    tokio::time::sleep(TEST_DELAY * 4).await;
    settle().await;

    assert_eq!(ids(&list).await, vec!["1"]);
    assert_eq!(resource.count("delete").await, 0);
}

#[tokio::test]
async fn rows_are_empty_while_loading() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    let release = resource.hold("list").await;

    let pending = tokio::spawn({
        let list = list.clone();
        async move { list.load().await }
    });
    settle().await;
    assert_eq!(list.load_state().await, LoadState::Loading);
    assert!(list.rows().await.is_empty());

    release.send(()).expect("release");
    pending.await.expect("join").expect("load");
    assert_eq!(list.rows().await.len(), 1);
}

#[tokio::test]
async fn load_finishing_after_teardown_changes_nothing() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    let release = resource.hold("list").await;

    let pending = tokio::spawn({
        let list = list.clone();
        async move { list.load().await }
    });
    settle().await;
    list.teardown().await;
    release.send(()).expect("release");
    pending.await.expect("join").expect("stale load is not an error");

    assert!(list.items().await.is_empty());
    assert!(list.item(&ItemId::new("1")).await.is_none());
    assert!(list.start_draft().await.is_none());
}

#[tokio::test]
async fn newer_load_wins_over_older_one() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    let release = resource.hold("list").await;

    let older = tokio::spawn({
        let list = list.clone();
        async move { list.load().await }
    });
    settle().await;

    resource.replace_items(&[("5", "E")]).await;
    list.load().await.expect("newer load");
    resource.replace_items(&[("9", "Z")]).await;

    release.send(()).expect("release");
    older.await.expect("join").expect("older load");
    assert_eq!(ids(&list).await, vec!["5"]);
}

#[tokio::test]
async fn load_failure_is_reported_and_retryable() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    resource.fail("list").await;
    let list = list_over(&resource);
    let mut events = list.subscribe_events();

    let err = list.load().await.expect_err("load fails");
    assert!(matches!(err, ControllerError::Load { .. }));
    assert!(matches!(list.load_state().await, LoadState::Failed(_)));

    let mut saw_error = false;
    while let Ok(event) = events.try_recv() {
        saw_error |= matches!(event, ClientEvent::Error { slot: None, .. });
    }
    assert!(saw_error);

    resource.recover("list").await;
    list.load().await.expect("retry");
    assert_eq!(list.load_state().await, LoadState::Ready);
    assert_eq!(ids(&list).await, vec!["1"]);
}

#[tokio::test]
async fn load_emits_state_then_collection() {
    let resource = FakeResource::with_items(&[("1", "A"), ("2", "B")]);
    let list = list_over(&resource);
    let mut events = list.subscribe_events();

    list.load().await.expect("load");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            ClientEvent::LoadStateChanged(LoadState::Loading),
            ClientEvent::LoadStateChanged(LoadState::Ready),
            ClientEvent::CollectionChanged {
                ids: vec![ItemId::new("2"), ItemId::new("1")],
            },
        ]
    );
}

#[tokio::test]
async fn update_for_unknown_item_is_ignored() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    list.load().await.expect("load");

    CollectionSink::update(&*list, crate::test_support::item("42", "ghost")).await;

    assert_eq!(ids(&list).await, vec!["1"]);
}

#[tokio::test]
async fn reset_without_reseeder_is_unavailable() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    list.load().await.expect("load");

    assert!(!list.can_reset());
    let err = list.reset().await.expect_err("no reseeder");
    assert!(matches!(err, ControllerError::ResetUnavailable));
    assert_eq!(ids(&list).await, vec!["1"]);
}

#[tokio::test]
async fn reset_reseeds_and_reloads() {
    let resource = FakeResource::with_items(&[("7", "stale")]);
    let reseeder = FakeReseeder::seeding(resource.clone());
    let list = resettable_list(&resource, &reseeder);
    list.load().await.expect("load");
    let old = list.item(&ItemId::new("7")).await.expect("item 7");
    list.start_draft().await.expect("draft");

    assert!(list.can_reset());
    list.reset().await.expect("reset");

    assert_eq!(*reseeder.resets.lock().await, 1);
    assert_eq!(ids(&list).await, vec!["2", "1"]);
    assert_eq!(list.items().await[0].text, "seed two");
    assert!(list.draft().await.is_none());
    assert!(old.is_torn_down());
    assert_eq!(list.load_state().await, LoadState::Ready);
}

#[tokio::test(start_paused = true)]
async fn reset_cancels_pending_deletes() {
    let resource = FakeResource::with_items(&[("7", "stale")]);
    let reseeder = FakeReseeder::seeding(resource.clone());
    let list = resettable_list(&resource, &reseeder);
    list.load().await.expect("load");

    let controller = list.item(&ItemId::new("7")).await.expect("item 7");
    controller.set_checked(true).await;
    list.reset().await.expect("reset");
    tokio::time::sleep(TEST_DELAY * 4).await;
    settle().await;

    assert_eq!(resource.count("delete").await, 0);
}

#[tokio::test]
async fn failed_reset_leaves_a_failed_empty_list() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let reseeder = FakeReseeder::failing();
    let list = resettable_list(&resource, &reseeder);
    list.load().await.expect("load");

    let err = list.reset().await.expect_err("reseed fails");
    assert!(matches!(err, ControllerError::Reseed { .. }));
    assert!(matches!(list.load_state().await, LoadState::Failed(_)));
    assert!(list.items().await.is_empty());

    // load is the way out
    list.load().await.expect("reload");
    assert_eq!(ids(&list).await, vec!["1"]);
}

#[tokio::test]
async fn teardown_stops_item_results_reaching_the_list() {
    let resource = FakeResource::with_items(&[("1", "A")]);
    let list = list_over(&resource);
    list.load().await.expect("load");
    let controller = list.item(&ItemId::new("1")).await.expect("item 1");
    let release = resource.hold("update").await;

    controller.edit("A2").await;
    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.commit().await }
    });
    settle().await;
    list.teardown().await;
    release.send(()).expect("release");

    let outcome = pending.await.expect("join").expect("commit");
    assert_eq!(outcome, CommitOutcome::Discarded);
    assert_eq!(list.items().await[0].text, "A");
}
