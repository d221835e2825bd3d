//! Exercises the minion reconciliation plan/apply pipeline against a real
//! `LifecycleOps` backed by a tempdir, bypassing only the network hop to
//! the master (tested separately in `control_api_test`).

use super::test_helpers::{sample_instance, test_lifecycle_ops};
use rds::core::commandlog::{Command, LogItem};
use rds::core::reconcile::handlers::HandlerContext;
use rds::core::reconcile::{dispatch, plan_reconciliation, ReconcileAction};
use std::time::Duration;

fn context<'a>(ops: &'a rds::core::lifecycle::ops::LifecycleOps) -> HandlerContext<'a> {
    HandlerContext {
        ops,
        redis_version: "7.2.0",
        master_ip: "127.0.0.1",
        max_sync_wait: Duration::from_secs(60),
        is_origin: false,
    }
}

#[tokio::test]
async fn apply_plan_creates_a_remote_only_instance_on_disk() {
    let (ops, _root) = test_lifecycle_ops();
    let ctx = context(&ops);

    let remote = sample_instance(1, "uuid-1");
    let plan = plan_reconciliation(&[], &[remote.clone()]);
    assert!(matches!(plan.as_slice(), [ReconcileAction::Create(i)] if i.id == 1));

    rds::core::reconcile::apply_plan(&ctx, plan).await;

    let persisted = ops.store.load(1).unwrap().expect("instance persisted after create");
    assert_eq!(persisted.uuid, "uuid-1");
}

#[tokio::test]
async fn apply_plan_destroys_a_local_only_instance() {
    let (ops, _root) = test_lifecycle_ops();
    let ctx = context(&ops);

    let local = ops.create(sample_instance(2, "uuid-2"), "7.2.0").await.unwrap();
    assert!(ops.store.load(2).unwrap().is_some());

    let plan = plan_reconciliation(&[local], &[]);
    rds::core::reconcile::apply_plan(&ctx, plan).await;

    assert!(ops.store.load(2).unwrap().is_none());
}

#[tokio::test]
async fn apply_plan_recreates_on_uuid_mismatch() {
    let (ops, _root) = test_lifecycle_ops();
    let ctx = context(&ops);

    ops.create(sample_instance(3, "old-uuid"), "7.2.0").await.unwrap();

    let remote = sample_instance(3, "new-uuid");
    let local = ops.store.load_all().unwrap();
    let plan = plan_reconciliation(&local, &[remote]);
    assert!(matches!(plan.as_slice(), [ReconcileAction::Recreate { .. }]));

    rds::core::reconcile::apply_plan(&ctx, plan).await;

    let persisted = ops.store.load(3).unwrap().expect("instance present after recreate");
    assert_eq!(persisted.uuid, "new-uuid");
}

#[tokio::test]
async fn apply_plan_updates_metadata_when_a_monitored_field_differs() {
    let (ops, _root) = test_lifecycle_ops();
    let ctx = context(&ops);

    ops.create(sample_instance(4, "uuid-4"), "7.2.0").await.unwrap();

    let mut remote = sample_instance(4, "uuid-4");
    remote.desc = "renamed".to_string();
    let local = ops.store.load_all().unwrap();
    let plan = plan_reconciliation(&local, &[remote]);
    assert!(matches!(plan.as_slice(), [ReconcileAction::Update(i)] if i.desc == "renamed"));

    rds::core::reconcile::apply_plan(&ctx, plan).await;

    let persisted = ops.store.load(4).unwrap().unwrap();
    assert_eq!(persisted.desc, "renamed");
}

#[tokio::test]
async fn dispatch_edit_item_updates_local_metadata_in_place() {
    let (ops, _root) = test_lifecycle_ops();
    let ctx = context(&ops);

    ops.create(sample_instance(5, "uuid-5"), "7.2.0").await.unwrap();

    let mut payload = sample_instance(5, "uuid-5");
    payload.desc = "edited via command log".to_string();
    let item = LogItem {
        command: Command::Edit,
        instance_id: 5,
        instance_uuid: "uuid-5".to_string(),
        initiator: "test".to_string(),
        timestamp: 0,
        payload: Some(payload),
    };

    dispatch::apply_batch(&ctx, vec![item]).await;

    let persisted = ops.store.load(5).unwrap().unwrap();
    assert_eq!(persisted.desc, "edited via command log");
}

#[tokio::test]
async fn dispatch_drops_a_command_whose_uuid_does_not_match_the_local_instance() {
    let (ops, _root) = test_lifecycle_ops();
    let ctx = context(&ops);

    ops.create(sample_instance(6, "uuid-6"), "7.2.0").await.unwrap();

    let mut stale_payload = sample_instance(6, "stale-uuid");
    stale_payload.desc = "should not apply".to_string();
    let item = LogItem {
        command: Command::Edit,
        instance_id: 6,
        instance_uuid: "stale-uuid".to_string(),
        initiator: "test".to_string(),
        timestamp: 0,
        payload: Some(stale_payload),
    };

    dispatch::apply_batch(&ctx, vec![item]).await;

    let persisted = ops.store.load(6).unwrap().unwrap();
    assert_eq!(persisted.desc, "instance 6", "edit with a stale uuid must be dropped, not applied");
}

#[tokio::test]
async fn dispatch_create_then_destroy_in_the_same_batch_compacts_to_a_no_op() {
    let (ops, _root) = test_lifecycle_ops();
    let ctx = context(&ops);

    let create_item = LogItem {
        command: Command::Create,
        instance_id: 7,
        instance_uuid: "uuid-7".to_string(),
        initiator: "test".to_string(),
        timestamp: 1,
        payload: Some(sample_instance(7, "uuid-7")),
    };
    let destroy_item = LogItem {
        command: Command::Destroy,
        instance_id: 7,
        instance_uuid: "uuid-7".to_string(),
        initiator: "test".to_string(),
        timestamp: 2,
        payload: None,
    };

    dispatch::apply_batch(&ctx, vec![create_item, destroy_item]).await;

    assert!(ops.store.load(7).unwrap().is_none(), "compaction must prevent the instance from ever being created");
}
