mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

fn room_json() -> serde_json::Value {
    serde_json::json!({
        "organization_id": "org1",
        "team_id": "team1",
        "meeting_type": "quarterly",
    })
}

async fn send_json(write: &mut WsWrite, value: serde_json::Value) {
    write
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Read the next text frame as JSON, with a timeout so a missing dispatch
/// fails the test instead of hanging it.
async fn recv_json(read: &mut WsRead) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).expect("json"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert that no dispatch arrives within a short window.
async fn assert_silent(read: &mut WsRead) {
    let result = time::timeout(Duration::from_millis(300), read.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

/// Connect, send JOIN, and return the split stream plus the JOINED payload.
async fn join(
    addr: SocketAddr,
    participant_id: &str,
    display_name: &str,
    wants_leadership: bool,
) -> (WsWrite, WsRead, serde_json::Value) {
    let url = format!("ws://{addr}/gateway");
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .expect("ws connect");
    let (mut write, mut read) = stream.split();

    send_json(
        &mut write,
        serde_json::json!({
            "op": 2,
            "d": {
                "room": room_json(),
                "participant_id": participant_id,
                "display_name": display_name,
                "wants_leadership": wants_leadership,
            }
        }),
    )
    .await;

    let joined = recv_json(&mut read).await;
    assert_eq!(joined["op"], 0);
    assert_eq!(joined["t"], "JOINED");
    (write, read, joined["d"].clone())
}

// ---------------------------------------------------------------------------
// Join & presence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_joiner_becomes_leader() {
    let (addr, _state) = common::start_server().await;
    let (_w, _r, joined) = join(addr, "prt_a", "Ann", false).await;

    assert_eq!(joined["is_leader"], true);
    assert_eq!(joined["leader_id"], "prt_a");
    assert_eq!(joined["participants"].as_array().unwrap().len(), 1);
    assert!(joined["session"].is_null());
    assert!(joined["heartbeat_interval_ms"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn follower_join_is_broadcast_to_the_room() {
    let (addr, _state) = common::start_server().await;
    let (_wa, mut ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (_wb, _rb, joined_b) = join(addr, "prt_b", "Ben", false).await;

    assert_eq!(joined_b["is_leader"], false);
    assert_eq!(joined_b["leader_id"], "prt_a");

    let presence = recv_json(&mut ra).await;
    assert_eq!(presence["t"], "PRESENCE_CHANGED");
    assert_eq!(presence["d"]["leader_id"], "prt_a");
    assert_eq!(presence["d"]["participants"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn wanting_leadership_does_not_displace_a_sitting_leader() {
    let (addr, _state) = common::start_server().await;
    let (_wa, _ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (_wb, _rb, joined_b) = join(addr, "prt_b", "Ben", true).await;

    assert_eq!(joined_b["is_leader"], false);
    assert_eq!(joined_b["leader_id"], "prt_a");
}

#[tokio::test]
async fn leader_leave_vacates_and_a_rejoin_can_claim() {
    let (addr, _state) = common::start_server().await;
    let (mut wa, _ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (_wb, mut rb, _) = join(addr, "prt_b", "Ben", false).await;

    send_json(&mut wa, serde_json::json!({ "op": 3 })).await;

    // No promotion: the seat is simply vacant.
    let presence = recv_json(&mut rb).await;
    assert_eq!(presence["t"], "PRESENCE_CHANGED");
    assert!(presence["d"]["leader_id"].is_null());
    assert_eq!(presence["d"]["participants"].as_array().unwrap().len(), 1);

    // An explicit claim on the vacant seat succeeds.
    let (_wc, _rc, joined_c) = join(addr, "prt_c", "Cat", true).await;
    assert_eq!(joined_c["is_leader"], true);
    assert_eq!(joined_c["leader_id"], "prt_c");
}

#[tokio::test]
async fn reconnect_replaces_the_connection_and_keeps_leadership() {
    let (addr, _state) = common::start_server().await;
    let (wa, ra, _) = join(addr, "prt_a", "Ann", false).await;
    drop(wa);
    drop(ra);

    // Same participant id on a fresh connection within the grace period.
    let (_wa2, _ra2, joined) = join(addr, "prt_a", "Ann", false).await;
    assert_eq!(joined["is_leader"], true);
    assert_eq!(joined["participants"].as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Event fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn vote_reaches_everyone_except_the_originator() {
    let (addr, _state) = common::start_server().await;
    let (_wa, mut ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (mut wb, mut rb, _) = join(addr, "prt_b", "Ben", false).await;
    recv_json(&mut ra).await; // presence for B's join

    send_json(
        &mut wb,
        serde_json::json!({
            "op": 4,
            "d": { "kind": "vote", "issue_id": "issue-9", "delta": 1 }
        }),
    )
    .await;

    let vote = recv_json(&mut ra).await;
    assert_eq!(vote["t"], "VOTE");
    assert_eq!(vote["d"]["issue_id"], "issue-9");
    assert_eq!(vote["d"]["delta"], 1);
    assert_eq!(vote["d"]["originator_id"], "prt_b");

    assert_silent(&mut rb).await;
}

#[tokio::test]
async fn sequence_numbers_increase_per_connection() {
    let (addr, _state) = common::start_server().await;
    let (_wa, mut ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (mut wb, _rb, _) = join(addr, "prt_b", "Ben", false).await;

    let presence = recv_json(&mut ra).await;
    let first = presence["s"].as_u64().unwrap();

    send_json(
        &mut wb,
        serde_json::json!({
            "op": 4,
            "d": { "kind": "vote", "issue_id": "i1", "delta": -1 }
        }),
    )
    .await;
    let vote = recv_json(&mut ra).await;
    assert!(vote["s"].as_u64().unwrap() > first);
}

#[tokio::test]
async fn rating_aggregate_goes_to_everyone_including_the_submitter() {
    let (addr, _state) = common::start_server().await;
    let (_wa, mut ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (mut wb, mut rb, _) = join(addr, "prt_b", "Ben", false).await;
    recv_json(&mut ra).await; // presence for B's join

    send_json(
        &mut wb,
        serde_json::json!({
            "op": 4,
            "d": { "kind": "rating", "participant_id": "prt_b", "rating": 8.5 }
        }),
    )
    .await;

    let to_a = recv_json(&mut ra).await;
    assert_eq!(to_a["t"], "CURRENT_RATINGS");
    assert_eq!(to_a["d"]["total_ratings"], 1);
    assert_eq!(to_a["d"]["total_participants"], 2);

    let to_b = recv_json(&mut rb).await;
    assert_eq!(to_b["t"], "CURRENT_RATINGS");
    assert!((to_b["d"]["average_rating"].as_f64().unwrap() - 8.5).abs() < 0.01);
}

#[tokio::test]
async fn notes_are_cached_for_late_joiners() {
    let (addr, _state) = common::start_server().await;
    let (mut wa, _ra, _) = join(addr, "prt_a", "Ann", false).await;

    send_json(
        &mut wa,
        serde_json::json!({
            "op": 4,
            "d": { "kind": "notes_update", "section_id": "issues", "text": "ship it" }
        }),
    )
    .await;
    // Small delay so the publish lands before the second join reads state.
    time::sleep(Duration::from_millis(100)).await;

    let (_wb, _rb, joined_b) = join(addr, "prt_b", "Ben", false).await;
    assert_eq!(joined_b["notes"]["issues"], "ship it");
}

// ---------------------------------------------------------------------------
// Leader-only enforcement
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_leader_timer_publish_is_denied() {
    let (addr, _state) = common::start_server().await;
    let (_wa, mut ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (mut wb, mut rb, _) = join(addr, "prt_b", "Ben", false).await;
    recv_json(&mut ra).await; // presence for B's join

    send_json(
        &mut wb,
        serde_json::json!({
            "op": 4,
            "d": { "kind": "section_change", "section_id": "issues" }
        }),
    )
    .await;

    // The error goes only to the offending connection.
    let error = recv_json(&mut rb).await;
    assert_eq!(error["t"], "ERROR");
    assert_eq!(error["d"]["code"], "NOT_LEADER");

    assert_silent(&mut ra).await;
}

#[tokio::test]
async fn leader_section_change_reaches_followers() {
    let (addr, _state) = common::start_server().await;
    let (mut wa, _ra, _) = join(addr, "prt_a", "Ann", false).await;
    let (_wb, mut rb, _) = join(addr, "prt_b", "Ben", false).await;

    send_json(
        &mut wa,
        serde_json::json!({
            "op": 4,
            "d": { "kind": "section_change", "section_id": "priorities" }
        }),
    )
    .await;

    let change = recv_json(&mut rb).await;
    assert_eq!(change["t"], "SECTION_CHANGE");
    assert_eq!(change["d"]["section_id"], "priorities");
}

// ---------------------------------------------------------------------------
// Protocol edges
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_is_acked() {
    let (addr, _state) = common::start_server().await;
    let (mut wa, mut ra, _) = join(addr, "prt_a", "Ann", false).await;

    send_json(&mut wa, serde_json::json!({ "op": 1, "d": { "seq": 3 } })).await;
    let ack = recv_json(&mut ra).await;
    assert_eq!(ack["op"], 6);
    assert_eq!(ack["d"]["ack"], 3);
}

#[tokio::test]
async fn first_frame_must_be_join() {
    let (addr, _state) = common::start_server().await;
    let url = format!("ws://{addr}/gateway");
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .expect("ws connect");
    let (mut write, mut read) = stream.split();

    send_json(&mut write, serde_json::json!({ "op": 1, "d": {} })).await;

    let msg = time::timeout(Duration::from_secs(5), read.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("ws read");
    match msg {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4003),
        other => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn second_join_on_one_connection_is_rejected() {
    let (addr, _state) = common::start_server().await;
    let (mut wa, mut ra, _) = join(addr, "prt_a", "Ann", false).await;

    send_json(
        &mut wa,
        serde_json::json!({
            "op": 2,
            "d": {
                "room": room_json(),
                "participant_id": "prt_a",
                "display_name": "Ann",
                "wants_leadership": false,
            }
        }),
    )
    .await;

    let msg = time::timeout(Duration::from_secs(5), ra.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("ws read");
    match msg {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 4000),
        other => panic!("expected close, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Room introspection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn active_room_endpoint_reflects_membership() {
    let (addr, _state) = common::start_server().await;
    let client = reqwest::Client::new();
    let url = format!(
        "http://{addr}/api/v1/rooms/active?organization_id=org1&team_id=team1&meeting_type=quarterly"
    );

    let body: serde_json::Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert!(body["room"].is_null());

    let (_wa, _ra, _) = join(addr, "prt_a", "Ann", false).await;
    let body: serde_json::Value = client.get(&url).send().await.unwrap().json().await.unwrap();
    assert_eq!(body["room"]["participant_count"], 1);
    assert_eq!(body["room"]["leader_id"], "prt_a");
    assert_eq!(body["room"]["key"], "org1-team1-quarterly");
}
