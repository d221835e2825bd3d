//! Exercises the control-API handlers against an in-process master.

use super::test_helpers::{TestMaster, sample_instance};
use axum::Json;
use axum::body::to_bytes;
use axum::extract::{ConnectInfo, State};
use rds::core::api::dto::{CidRequest, FetchResponse, HelloRequest, InfoRequest, PullResponse, PushRequest};
use rds::core::api::handlers;
use rds::core::commandlog::{Command, NodeRole};
use std::net::SocketAddr;

fn follower_addr() -> SocketAddr {
    "127.0.0.1:9000".parse().unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> (axum::http::StatusCode, T) {
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await.expect("read response body");
    let value = serde_json::from_slice(&bytes).expect("response body is valid json");
    (parts.status, value)
}

#[tokio::test]
async fn hello_registers_a_follower_and_returns_superuser_credentials() {
    let master = TestMaster::new().await;

    let response = handlers::hello(
        State(master.state.clone()),
        ConnectInfo(follower_addr()),
        Json(HelloRequest {
            hostname: "minion-1".to_string(),
            role: NodeRole::Minion,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
    .await;

    let (status, hello): (_, rds::core::api::dto::HelloResponse) = body_json(response).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert!(!hello.cid.is_empty());
    assert_eq!(hello.master_version, env!("CARGO_PKG_VERSION"));
    assert!(!hello.superuser.hash.is_empty());

    assert!(master.state.followers.get(&hello.cid).is_some());
}

#[tokio::test]
async fn hello_with_incompatible_major_version_is_rejected() {
    let master = TestMaster::new().await;

    let response = handlers::hello(
        State(master.state.clone()),
        ConnectInfo(follower_addr()),
        Json(HelloRequest {
            hostname: "minion-1".to_string(),
            role: NodeRole::Minion,
            version: "999.0.0".to_string(),
        }),
    )
    .await;

    assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);
}

async fn register(master: &TestMaster) -> String {
    let response = handlers::hello(
        State(master.state.clone()),
        ConnectInfo(follower_addr()),
        Json(HelloRequest {
            hostname: "minion-1".to_string(),
            role: NodeRole::Minion,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
    .await;
    let (_, hello): (_, rds::core::api::dto::HelloResponse) = body_json(response).await;
    hello.cid
}

#[tokio::test]
async fn fetch_returns_the_full_roster_and_clears_the_syncing_flag() {
    let master = TestMaster::new().await;
    let cid = register(&master).await;

    master.state.ops.store.save(&sample_instance(1, "uuid-1")).unwrap();
    master.state.ops.store.save(&sample_instance(2, "uuid-2")).unwrap();

    let response = handlers::fetch(State(master.state.clone()), Json(CidRequest { cid: cid.clone() })).await;
    let (status, fetch): (_, FetchResponse) = body_json(response).await;
    assert_eq!(status, axum::http::StatusCode::OK);
    assert_eq!(fetch.instances.len(), 2);

    let record = master.state.followers.get(&cid).unwrap();
    assert!(!record.syncing);
}

#[tokio::test]
async fn fetch_with_an_unknown_cid_is_rejected() {
    let master = TestMaster::new().await;
    let response = handlers::fetch(
        State(master.state.clone()),
        Json(CidRequest { cid: "no-such-cid".to_string() }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn push_then_pull_round_trips_a_single_command() {
    let master = TestMaster::new().await;
    let cid = register(&master).await;

    let push_response = handlers::push(
        State(master.state.clone()),
        ConnectInfo("127.0.0.1:5555".parse().unwrap()),
        Json(PushRequest {
            command: Command::Start,
            instance_id: 7,
            instance_uuid: "uuid-7".to_string(),
            initiator: "test".to_string(),
            payload: None,
        }),
    )
    .await;
    assert_eq!(push_response.status(), axum::http::StatusCode::OK);

    let pull_response = handlers::pull(State(master.state.clone()), Json(CidRequest { cid })).await;
    let (_, pull): (_, PullResponse) = body_json(pull_response).await;
    assert_eq!(pull.items.len(), 1);
    assert_eq!(pull.items[0].instance_id, 7);
    assert!(matches!(pull.items[0].command, Command::Start));
}

#[tokio::test]
async fn push_from_a_non_local_non_master_ip_is_rejected() {
    let master = TestMaster::new().await;

    let response = handlers::push(
        State(master.state.clone()),
        ConnectInfo("10.0.0.9:5555".parse().unwrap()),
        Json(PushRequest {
            command: Command::Start,
            instance_id: 1,
            instance_uuid: "uuid-1".to_string(),
            initiator: "test".to_string(),
            payload: None,
        }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn info_rejects_a_uuid_mismatch_as_not_found() {
    let master = TestMaster::new().await;
    let cid = register(&master).await;
    master.state.ops.store.save(&sample_instance(3, "uuid-3")).unwrap();

    let response = handlers::info(
        State(master.state.clone()),
        Json(InfoRequest { cid, id: 3, uuid: "wrong-uuid".to_string() }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn info_populates_the_cache_on_a_store_miss() {
    let master = TestMaster::new().await;
    let cid = register(&master).await;
    master.state.ops.store.save(&sample_instance(4, "uuid-4")).unwrap();
    assert!(master.state.ops.cache.get(4).is_none());

    let response = handlers::info(
        State(master.state.clone()),
        Json(InfoRequest { cid, id: 4, uuid: "uuid-4".to_string() }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert!(master.state.ops.cache.get(4).is_some());
}

#[tokio::test]
async fn bye_unregisters_a_follower_from_the_same_ip_it_registered_from() {
    let master = TestMaster::new().await;
    let cid = register(&master).await;

    let response = handlers::bye(
        State(master.state.clone()),
        ConnectInfo(follower_addr()),
        Json(CidRequest { cid: cid.clone() }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    assert!(master.state.followers.get(&cid).is_none());
}

#[tokio::test]
async fn bye_from_a_different_ip_than_registration_is_rejected() {
    let master = TestMaster::new().await;
    let cid = register(&master).await;

    let response = handlers::bye(
        State(master.state.clone()),
        ConnectInfo("10.0.0.9:1".parse().unwrap()),
        Json(CidRequest { cid: cid.clone() }),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::FORBIDDEN);
    assert!(master.state.followers.get(&cid).is_some());
}

#[tokio::test]
async fn replication_and_stats_reflect_a_registered_follower() {
    let master = TestMaster::new().await;
    let _cid = register(&master).await;

    let replication_response = handlers::replication(State(master.state.clone())).await;
    let (_, replication): (_, rds::core::api::dto::ReplicationResponse) = body_json(replication_response).await;
    assert_eq!(replication.followers.len(), 1);

    let stats_response = handlers::stats(State(master.state.clone())).await;
    let (_, stats): (_, rds::core::api::dto::StatsResponse) = body_json(stats_response).await;
    assert_eq!(*stats.followers_by_role.get("minion").unwrap(), 1);
}
