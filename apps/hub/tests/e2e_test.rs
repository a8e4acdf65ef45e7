//! End-to-end: the client library against a live hub — the full
//! quarterly-meeting scenario with a leader and a follower.

mod common;

use std::time::Duration;

use cadence_client::{ClientConfig, ClientError, MeetingClient, MeetingEvent, TimerView};
use cadence_common::room::RoomKey;
use tokio::time;

fn room() -> RoomKey {
    RoomKey::new("org1", "team1", "quarterly")
}

async fn next(client: &mut MeetingClient) -> MeetingEvent {
    time::timeout(Duration::from_secs(5), client.next_event())
        .await
        .expect("timeout waiting for meeting event")
        .expect("meeting event")
}

#[tokio::test]
async fn quarterly_meeting_scenario() {
    let (addr, _state) = common::start_server().await;
    let config = ClientConfig::new(format!("http://{addr}"));

    // Leader connects; nobody is in the room yet.
    let mut leader = MeetingClient::connect(config.clone(), room(), "prt_a", "Ann")
        .await
        .expect("leader connect");
    assert!(leader.active_room().await.expect("room query").is_none());
    assert!(leader.join(false).await.expect("leader join"));

    leader.start_session().await.expect("start session");
    assert!(leader.session().is_some());

    // A second start for the same key is a conflict.
    assert!(matches!(
        leader.sessions().start(&room(), "prt_x").await,
        Err(ClientError::SessionConflict)
    ));

    // Follower connects, sees the occupied room, and joins as follower.
    let mut follower = MeetingClient::connect(config, room(), "prt_b", "Ben")
        .await
        .expect("follower connect");
    let active = follower.active_room().await.expect("room query").unwrap();
    assert_eq!(active.leader_id.as_deref(), Some("prt_a"));
    assert!(!follower.join(false).await.expect("follower join"));

    // The follower's timer is reconciled from the session in JOINED.
    assert!(follower.session().is_some());
    assert!(!follower.timer().is_paused());

    match next(&mut leader).await {
        MeetingEvent::PresenceChanged { participants, leader_id } => {
            assert_eq!(participants.len(), 2);
            assert_eq!(leader_id.as_deref(), Some("prt_a"));
        }
        other => panic!("expected presence change, got {other:?}"),
    }

    // Collaboration flows follower → leader, never echoing back.
    follower.cast_vote("issue-9", 1).expect("vote");
    match next(&mut leader).await {
        MeetingEvent::VoteCast { issue_id, delta } => {
            assert_eq!(issue_id, "issue-9");
            assert_eq!(delta, 1);
        }
        other => panic!("expected vote, got {other:?}"),
    }

    // A follower cannot drive the timer.
    assert!(matches!(
        follower.resume_meeting().await,
        Err(ClientError::NotLeader)
    ));
    assert!(matches!(
        follower.change_section("issues"),
        Err(ClientError::NotLeader)
    ));

    // Leader navigates; the follower's timer follows.
    leader.change_section("issues").expect("section change");
    match next(&mut follower).await {
        MeetingEvent::SectionChanged { section_id } => assert_eq!(section_id, "issues"),
        other => panic!("expected section change, got {other:?}"),
    }

    // Pause propagates as an authoritative snapshot.
    leader.pause_meeting().await.expect("pause");
    assert!(leader.timer().is_paused());
    match next(&mut follower).await {
        MeetingEvent::TimerPaused => {}
        other => panic!("expected timer pause, got {other:?}"),
    }
    assert!(follower.timer().is_paused());
    let frozen = follower.timer().active_duration_seconds(chrono::Utc::now());

    leader.resume_meeting().await.expect("resume");
    match next(&mut follower).await {
        MeetingEvent::TimerResumed => {}
        other => panic!("expected timer resume, got {other:?}"),
    }
    assert!(!follower.timer().is_paused());
    // An immediate pause/resume must not cost active duration.
    let resumed = follower.timer().active_duration_seconds(chrono::Utc::now());
    assert!((resumed - frozen).abs() <= 2, "frozen {frozen}, resumed {resumed}");

    // Ratings aggregate to everyone, including the submitter.
    follower.submit_rating(8.5).expect("rating");
    match next(&mut leader).await {
        MeetingEvent::RatingsUpdated(summary) => {
            assert_eq!(summary.total_ratings, 1);
            assert!((summary.average_rating - 8.5).abs() < 0.01);
        }
        other => panic!("expected ratings, got {other:?}"),
    }
    match next(&mut follower).await {
        MeetingEvent::RatingsUpdated(_) => {}
        other => panic!("expected ratings, got {other:?}"),
    }

    // Conclude; double end is caller-success.
    leader.end_meeting().await.expect("end");
    match next(&mut follower).await {
        MeetingEvent::MeetingEnded => {}
        other => panic!("expected meeting end, got {other:?}"),
    }
    assert!(follower.timer().is_paused());
    leader.end_meeting().await.expect("double end is success");
}

#[tokio::test]
async fn session_start_reaches_already_joined_followers() {
    let (addr, _state) = common::start_server().await;
    let config = ClientConfig::new(format!("http://{addr}"));

    let mut leader = MeetingClient::connect(config.clone(), room(), "prt_a", "Ann")
        .await
        .expect("leader connect");
    leader.join(false).await.expect("leader join");

    // The follower is in the room before any session exists, so its JOINED
    // payload carried none.
    let mut follower = MeetingClient::connect(config, room(), "prt_b", "Ben")
        .await
        .expect("follower connect");
    follower.join(false).await.expect("follower join");
    assert!(follower.session().is_none());
    match next(&mut leader).await {
        MeetingEvent::PresenceChanged { .. } => {}
        other => panic!("expected presence change, got {other:?}"),
    }

    leader.start_session().await.expect("start session");
    match next(&mut follower).await {
        MeetingEvent::SessionStarted => {}
        other => panic!("expected session start, got {other:?}"),
    }
    assert!(follower.session().is_some());
    assert!(!follower.timer().is_paused());

    // Section navigation lands on the follower's now-running timer.
    leader.change_section("issues").expect("section change");
    match next(&mut follower).await {
        MeetingEvent::SectionChanged { section_id } => assert_eq!(section_id, "issues"),
        other => panic!("expected section change, got {other:?}"),
    }
    assert_eq!(follower.timer().current_section(), Some("issues"));
}

#[tokio::test]
async fn join_is_single_shot_per_connection_lifetime() {
    let (addr, _state) = common::start_server().await;
    let config = ClientConfig::new(format!("http://{addr}"));

    let mut client = MeetingClient::connect(config, room(), "prt_a", "Ann")
        .await
        .expect("connect");
    client.join(false).await.expect("join");
    assert!(matches!(
        client.join(false).await,
        Err(ClientError::AlreadyJoined)
    ));
}

#[tokio::test]
async fn leave_reconnect_and_resync() {
    let (addr, _state) = common::start_server().await;
    let config = ClientConfig::new(format!("http://{addr}"));

    let mut leader = MeetingClient::connect(config.clone(), room(), "prt_a", "Ann")
        .await
        .expect("leader connect");
    leader.join(false).await.expect("leader join");
    leader.start_session().await.expect("start session");

    let mut follower = MeetingClient::connect(config, room(), "prt_b", "Ben")
        .await
        .expect("follower connect");
    follower.join(false).await.expect("follower join");
    match next(&mut leader).await {
        MeetingEvent::PresenceChanged { .. } => {}
        other => panic!("expected presence change, got {other:?}"),
    }

    // The leader leaves; the hub closes the connection and the transport
    // comes back on its own, but the room is not auto-rejoined.
    leader.leave().expect("leave");
    match next(&mut leader).await {
        MeetingEvent::Disconnected => {}
        other => panic!("expected disconnect, got {other:?}"),
    }
    assert!(!leader.is_joined());
    match next(&mut leader).await {
        MeetingEvent::Reconnected => {}
        other => panic!("expected reconnect, got {other:?}"),
    }

    // The follower sees the vacated seat, with no promotion.
    match next(&mut follower).await {
        MeetingEvent::PresenceChanged { participants, leader_id } => {
            assert_eq!(participants.len(), 1);
            assert!(leader_id.is_none());
        }
        other => panic!("expected presence change, got {other:?}"),
    }
    assert!(!follower.is_leader());

    // Explicit resync: re-join claiming the vacant seat, session and timer
    // reconciled before ticking resumes.
    assert!(leader
        .resume_from_reconnect(true)
        .await
        .expect("resume from reconnect"));
    assert!(leader.session().is_some());
    assert!(!leader.timer().is_paused());

    match next(&mut follower).await {
        MeetingEvent::PresenceChanged { participants, leader_id } => {
            assert_eq!(participants.len(), 2);
            assert_eq!(leader_id.as_deref(), Some("prt_a"));
        }
        other => panic!("expected presence change, got {other:?}"),
    }
}
