//! Tests for bulk task scheduling.

use std::sync::Arc;

use rota_rs::config::Settings;
use rota_rs::engine::AssignmentEngine;
use rota_rs::engine::bulk::CANCELLED_REASON;
use rota_rs::event::TracingDispatcher;
use rota_rs::model::*;
use rota_rs::store::memory::MemoryStore;
use tokio_util::sync::CancellationToken;

fn engine_with(settings: Settings) -> (Arc<MemoryStore>, AssignmentEngine) {
    let store = Arc::new(MemoryStore::new());
    let engine = AssignmentEngine::new(store.clone(), Arc::new(TracingDispatcher), settings);
    (store, engine)
}

fn items(restaurant: RestaurantId, n: usize) -> Vec<NewTask> {
    (0..n)
        .map(|i| NewTask::new(restaurant, format!("Task {i}")))
        .collect()
}

#[tokio::test]
async fn bad_items_fail_alone_with_their_index() {
    let (store, engine) = engine_with(Settings::default());
    let restaurant = RestaurantId::new();

    let mut batch = items(restaurant, 10);
    batch[3].title = None;
    batch[7].title = Some("  ".to_string());

    let outcome = engine
        .bulk_schedule(batch, None, StaffId::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.total_requested, 10);
    assert_eq!(outcome.successful_count, 8);
    assert_eq!(outcome.failed_count, 2);
    assert!(!outcome.cancelled);

    let failed: Vec<usize> = outcome.failed.iter().map(|f| f.index).collect();
    assert_eq!(failed, vec![3, 7]);
    assert!(outcome.failed[0].error.contains("title"));

    let ok: Vec<usize> = outcome.successful.iter().map(|s| s.index).collect();
    assert_eq!(ok, vec![0, 1, 2, 4, 5, 6, 8, 9]);
    assert_eq!(store.task_count(), 8);
}

#[tokio::test]
async fn defaults_fill_unset_fields_only() {
    let (_store, engine) = engine_with(Settings::default());
    let restaurant = RestaurantId::new();

    let defaults = TaskDefaults {
        restaurant_id: Some(restaurant),
        priority: Some(Priority::High),
        location: Some("bar".to_string()),
        estimated_minutes: Some(15),
        ..TaskDefaults::default()
    };
    let batch = vec![
        NewTask {
            title: Some("Cut limes".to_string()),
            ..NewTask::default()
        },
        NewTask {
            title: Some("Ice well".to_string()),
            priority: Some(Priority::Urgent),
            ..NewTask::default()
        },
    ];

    let outcome = engine
        .bulk_schedule(batch, Some(defaults), StaffId::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.successful_count, 2);
    let first = &outcome.successful[0].task;
    let second = &outcome.successful[1].task;
    assert_eq!(first.restaurant_id, restaurant);
    assert_eq!(first.priority, Priority::High);
    assert_eq!(first.location.as_deref(), Some("bar"));
    assert_eq!(first.estimated_minutes, 15);
    assert_eq!(second.priority, Priority::Urgent);
}

#[tokio::test]
async fn missing_restaurant_fails_the_item() {
    let (_store, engine) = engine_with(Settings::default());
    let batch = vec![NewTask {
        title: Some("Orphan".to_string()),
        ..NewTask::default()
    }];

    let outcome = engine
        .bulk_schedule(batch, None, StaffId::new(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.failed_count, 1);
    assert_eq!(outcome.failed[0].title.as_deref(), Some("Orphan"));
}

#[tokio::test]
async fn empty_and_oversized_requests_are_rejected_whole() {
    let mut settings = Settings::default();
    settings.bulk.max_items = 5;
    let (store, engine) = engine_with(settings);
    let restaurant = RestaurantId::new();
    let cancel = CancellationToken::new();

    let err = engine
        .bulk_schedule(Vec::new(), None, StaffId::new(), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_validation(), "{err}");

    let err = engine
        .bulk_schedule(items(restaurant, 6), None, StaffId::new(), &cancel)
        .await
        .unwrap_err();
    assert!(err.is_validation(), "{err}");
    assert_eq!(store.task_count(), 0);

    let outcome = engine
        .bulk_schedule(items(restaurant, 5), None, StaffId::new(), &cancel)
        .await
        .unwrap();
    assert_eq!(outcome.successful_count, 5);
}

#[tokio::test]
async fn cancelled_request_creates_nothing_and_reports_every_item() {
    let (store, engine) = engine_with(Settings::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = engine
        .bulk_schedule(items(RestaurantId::new(), 4), None, StaffId::new(), &cancel)
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert_eq!(outcome.successful_count, 0);
    assert_eq!(outcome.failed_count, 4);
    assert!(outcome.failed.iter().all(|f| f.error == CANCELLED_REASON));
    assert_eq!(store.task_count(), 0);
}

#[tokio::test]
async fn bulk_item_with_unknown_assignee_fails_alone() {
    let (store, engine) = engine_with(Settings::default());
    let restaurant = RestaurantId::new();
    let cook = StaffMember::new(restaurant, "Ana", Role::Staff);
    let cook_id = cook.id;
    store.upsert_staff(cook);

    let batch = vec![
        NewTask::new(restaurant, "Known").assignee(cook_id),
        NewTask::new(restaurant, "Unknown").assignee(StaffId::new()),
    ];
    let outcome = engine
        .bulk_schedule(batch, None, StaffId::new(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.successful_count, 1);
    assert_eq!(outcome.successful[0].task.status, TaskStatus::Assigned);
    assert_eq!(outcome.failed[0].index, 1);
}
