mod common;

use serde_json::json;
use tokio_test::assert_ok;

use boardcall::relay::drawings_path;
use boardcall::whiteboard::{Brush, DisplayList};
use boardcall::{Error, MemoryRelay, Point, PointerInput, RelayStore, Role, Session};

use common::{config, segments_eventually, store, FakeAgent};

async fn stroke(session: &mut Session<DisplayList>, points: &[(f64, f64)]) {
    let mut points = points.iter().map(|&(x, y)| Point::new(x, y));
    if let Some(start) = points.next() {
        session.handle_input(PointerInput::Start(start)).await;
    }
    for p in points {
        assert!(session.handle_input(PointerInput::Move(p)).await);
    }
    session.handle_input(PointerInput::End).await;
}

fn expect_err(result: boardcall::Result<Session<DisplayList>>) -> Error {
    match result {
        Ok(session) => panic!("expected an error, got room {}", session.room_id()),
        Err(e) => e,
    }
}

async fn pair(relay: &MemoryRelay) -> (Session<DisplayList>, Session<DisplayList>) {
    let cfg = config();
    let alice = assert_ok!(
        Session::create(store(relay), FakeAgent::new("A", 10), DisplayList::default(), &cfg).await
    );
    let bob = assert_ok!(
        Session::join(
            store(relay),
            FakeAgent::new("B", 20),
            alice.room_id(),
            DisplayList::default(),
            &cfg,
        )
        .await
    );
    (alice, bob)
}

#[tokio::test]
async fn late_joiner_sees_only_strokes_after_the_clear() {
    let relay = MemoryRelay::new();
    let cfg = config();
    let mut alice = assert_ok!(
        Session::create(store(&relay), FakeAgent::new("A", 10), DisplayList::default(), &cfg).await
    );
    assert_eq!(alice.role(), Role::Initiator);

    stroke(&mut alice, &[(0.0, 0.0), (10.0, 10.0), (20.0, 20.0)]).await;
    assert_eq!(segments_eventually(&alice, 2).await.len(), 2);

    alice.clear_board().await;
    assert!(segments_eventually(&alice, 0).await.is_empty());

    alice.set_brush(Brush {
        color: "#0000ff".into(),
        size: 3.0,
    });
    stroke(&mut alice, &[(5.0, 5.0), (6.0, 6.0)]).await;
    let mine = segments_eventually(&alice, 1).await;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].color, "#0000ff");

    let bob = assert_ok!(
        Session::join(
            store(&relay),
            FakeAgent::new("B", 20),
            alice.room_id(),
            DisplayList::default(),
            &cfg,
        )
        .await
    );
    assert_eq!(bob.role(), Role::Responder);
    let theirs = segments_eventually(&bob, 1).await;
    assert_eq!(theirs, mine);
    assert_eq!(theirs[0].from, Point::new(5.0, 5.0));
    assert_eq!(theirs[0].size, 3.0);
}

#[tokio::test]
async fn strokes_reach_the_other_participant() {
    let relay = MemoryRelay::new();
    let (mut alice, mut bob) = pair(&relay).await;
    assert_ok!(alice.negotiation().wait_connected().await);
    assert_ok!(bob.negotiation().wait_connected().await);

    stroke(&mut bob, &[(1.0, 1.0), (2.0, 2.0)]).await;
    stroke(&mut alice, &[(3.0, 3.0), (4.0, 4.0)]).await;

    let seen_by_alice = segments_eventually(&alice, 2).await;
    let seen_by_bob = segments_eventually(&bob, 2).await;
    assert_eq!(seen_by_alice.len(), 2);
    assert_eq!(seen_by_alice, seen_by_bob);
}

#[tokio::test]
async fn clear_from_either_side_blanks_both_boards() {
    let relay = MemoryRelay::new();
    let (mut alice, bob) = pair(&relay).await;

    stroke(&mut alice, &[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]).await;
    assert_eq!(segments_eventually(&bob, 2).await.len(), 2);

    bob.clear_board().await;
    assert!(segments_eventually(&alice, 0).await.is_empty());
    assert!(segments_eventually(&bob, 0).await.is_empty());

    let log = assert_ok!(relay.list(&drawings_path(alice.room_id())).await);
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].data, json!({ "type": "clear" }));
}

#[tokio::test]
async fn strokes_are_stored_in_wire_format() {
    let relay = MemoryRelay::new();
    let cfg = config();
    let mut alice = assert_ok!(
        Session::create(store(&relay), FakeAgent::new("A", 10), DisplayList::default(), &cfg).await
    );
    stroke(&mut alice, &[(1.0, 2.0), (3.0, 4.0)]).await;

    let log = assert_ok!(relay.list(&drawings_path(alice.room_id())).await);
    assert_eq!(log.len(), 1);
    assert_eq!(
        log[0].data,
        json!({
            "type": "draw",
            "lastPos": { "x": 1.0, "y": 2.0 },
            "currentPos": { "x": 3.0, "y": 4.0 },
            "color": "#000000",
            "size": 4.0,
        })
    );
}

#[tokio::test]
async fn redraw_reproduces_the_same_picture() {
    let relay = MemoryRelay::new();
    let (mut alice, _bob) = pair(&relay).await;
    stroke(&mut alice, &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (3.0, 0.0)]).await;
    let before = segments_eventually(&alice, 3).await;
    assert_eq!(before.len(), 3);

    alice.redraw().await;
    alice.redraw().await;
    let after = alice.with_surface(|s| s.segments().to_vec()).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn closing_releases_every_listener() {
    let relay = MemoryRelay::new();
    let alice_agent = FakeAgent::new("A", 10);
    let bob_agent = FakeAgent::new("B", 20);
    let cfg = config();
    let alice = assert_ok!(
        Session::create(store(&relay), alice_agent.clone(), DisplayList::default(), &cfg).await
    );
    let bob = assert_ok!(
        Session::join(
            store(&relay),
            bob_agent.clone(),
            alice.room_id(),
            DisplayList::default(),
            &cfg,
        )
        .await
    );
    assert!(relay.watcher_count() > 0);

    assert_ok!(alice.close().await);
    assert_ok!(bob.close().await);
    assert_eq!(relay.watcher_count(), 0);
    assert!(alice_agent.is_closed());
    assert!(bob_agent.is_closed());
}

#[tokio::test]
async fn failed_setup_reports_user_facing_errors() {
    let relay = MemoryRelay::new();
    let cfg = config();

    let err = expect_err(
        Session::join(
            store(&relay),
            FakeAgent::new("B", 20),
            "zzzzzz",
            DisplayList::default(),
            &cfg,
        )
        .await,
    );
    assert_eq!(err.user_message(), "Room does not exist or is invalid.");

    relay.set_offline(true);
    let err = expect_err(
        Session::create(store(&relay), FakeAgent::new("A", 10), DisplayList::default(), &cfg).await,
    );
    assert!(err.is_relay());
    assert!(err.user_message().starts_with("Error: "));
    assert_eq!(relay.watcher_count(), 0);
}
