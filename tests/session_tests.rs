#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration tests for the Nexus client.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server frames
//! and drives a `Session` through the host and client lifecycles.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use nexus_client::protocol::{CloseInfo, Identifier};
use nexus_client::{NexusError, RoleKind, Session};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use common::{
    from_client_json, hosting_json, joined_json, list_json, lost_client_json, message_json,
    new_client_json, no_such_host_json, quiet_connector, server_info_json, MockTransport,
};

/// Shared counter handed to `'static` callbacks.
fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn bump(count: &Arc<AtomicUsize>) -> impl FnMut(&()) + Send + 'static {
    let count = Arc::clone(count);
    move |_| {
        count.fetch_add(1, Ordering::SeqCst);
    }
}

// ════════════════════════════════════════════════════════════════════
// Joining
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_before_open_sends_one_join_and_resolves() {
    common::init_tracing();
    let (transport, recorded) = MockTransport::scripted([joined_json("abc")]);

    let mut connector = quiet_connector();
    let joined_with = Arc::new(StdMutex::new(None));
    let sink = Arc::clone(&joined_with);
    assert_ok!(connector.join("roomA")).then(move |host| {
        *sink.lock().unwrap() = Some(host.clone());
    });
    assert_eq!(connector.role(), RoleKind::Client);

    let mut session = Session::new(connector);
    assert_ok!(session.attach(transport).await);
    assert_ok!(session.run_until(|c| !c.joined().is_pending()).await);

    assert_eq!(
        recorded.lock().unwrap().sent_json(),
        vec![json!({"type": "JOIN", "name": "roomA"})]
    );
    assert_eq!(
        *joined_with.lock().unwrap(),
        Some(Identifier::Text("abc".into()))
    );
    let connector = session.connector();
    assert_eq!(connector.role(), RoleKind::Client);
    assert_eq!(
        connector.as_client().unwrap().host_id(),
        Some(&Identifier::Text("abc".into()))
    );
}

#[tokio::test]
async fn rejected_join_reverts_to_user() {
    let (transport, _recorded) = MockTransport::scripted([no_such_host_json("not found")]);

    let mut connector = quiet_connector();
    let failure = Arc::new(StdMutex::new(None));
    let sink = Arc::clone(&failure);
    connector
        .join("roomA")
        .unwrap()
        .on_error(move |err| *sink.lock().unwrap() = Some(err.to_string()));

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    session
        .run_until(|c| c.role() == RoleKind::User)
        .await
        .unwrap();

    assert!(session.connector_mut().joined().is_failed());
    assert!(session.connector().as_client().is_none());
    let failure = failure.lock().unwrap().clone().expect("on_error fired");
    assert!(failure.contains("not found"), "unexpected failure: {failure}");
}

#[tokio::test]
async fn user_can_host_after_rejected_join() {
    let (transport, recorded) =
        MockTransport::scripted([no_such_host_json("gone"), hosting_json(5, "roomA")]);

    let mut session = Session::new(quiet_connector());
    session.attach(transport).await.unwrap();
    session.connector_mut().join("roomA").unwrap();
    session
        .run_until(|c| c.role() == RoleKind::User)
        .await
        .unwrap();

    session.connector_mut().host("roomA").unwrap();
    session
        .run_until(|c| c.hosting().is_succeeded())
        .await
        .unwrap();

    assert_eq!(recorded.lock().unwrap().sent_types(), vec!["JOIN", "HOST"]);
    assert_eq!(session.connector().role(), RoleKind::Host);
}

#[tokio::test]
async fn join_or_host_falls_back_to_hosting() {
    let (transport, recorded) =
        MockTransport::scripted([no_such_host_json("nobody"), hosting_json(9, "roomB")]);

    let mut connector = quiet_connector();
    connector.join_or_host("roomB").unwrap();

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    session
        .run_until(|c| c.hosting().is_succeeded())
        .await
        .unwrap();

    assert_eq!(
        recorded.lock().unwrap().sent_json(),
        vec![
            json!({"type": "JOIN", "name": "roomB"}),
            json!({"type": "HOST", "name": "roomB"}),
        ]
    );
    let connector = session.connector_mut();
    assert!(connector.joined().is_failed());
    assert_eq!(connector.role(), RoleKind::Host);
    let host = connector.as_host().unwrap();
    assert_eq!(host.host_id(), Some(&Identifier::from(9_u64)));
    assert_eq!(host.host_name(), Some("roomB"));
}

#[tokio::test]
async fn join_or_host_joins_when_host_exists() {
    let (transport, recorded) = MockTransport::scripted([joined_json(3)]);

    let mut connector = quiet_connector();
    connector.join_or_host("roomB").unwrap();
    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    session
        .run_until(|c| c.joined().is_succeeded())
        .await
        .unwrap();

    assert_eq!(recorded.lock().unwrap().sent_types(), vec!["JOIN"]);
    assert_eq!(session.connector().role(), RoleKind::Client);
}

#[tokio::test]
async fn client_messages_are_held_until_joined() {
    let (transport, recorded) = MockTransport::scripted([joined_json("abc")]);

    let mut connector = quiet_connector();
    connector.join("roomA").unwrap();
    {
        let mut client = connector.as_client_mut().unwrap();
        client.send(json!({"move": 1}));
        client.send(json!({"move": 2}));
    }

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    assert_eq!(recorded.lock().unwrap().sent_types(), vec!["JOIN"]);

    session
        .run_until(|c| c.joined().is_succeeded())
        .await
        .unwrap();
    session.flush().await.unwrap();

    assert_eq!(
        recorded.lock().unwrap().sent_json(),
        vec![
            json!({"type": "JOIN", "name": "roomA"}),
            json!({"type": "SEND", "message": {"move": 1}}),
            json!({"type": "SEND", "message": {"move": 2}}),
        ]
    );
}

#[tokio::test]
async fn client_receives_host_messages() {
    let (transport, _recorded) = MockTransport::scripted([
        joined_json("abc"),
        message_json(json!("hello")),
        message_json(json!({"score": 3})),
    ]);

    let mut connector = quiet_connector();
    connector.join("roomA").unwrap();
    let received = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    connector
        .as_client_mut()
        .unwrap()
        .on_message()
        .subscribe(move |message| sink.lock().unwrap().push(message.clone()));

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    let seen = Arc::clone(&received);
    session
        .run_until(move |_| seen.lock().unwrap().len() == 2)
        .await
        .unwrap();

    assert_eq!(
        *received.lock().unwrap(),
        vec![json!("hello"), json!({"score": 3})]
    );
}

// ════════════════════════════════════════════════════════════════════
// Hosting
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_tracks_clients_and_fires_each_signal_once() {
    let (transport, _recorded) = MockTransport::scripted([
        hosting_json(1, "lobby"),
        new_client_json(7, json!({"name": "lobby"})),
        lost_client_json(7),
    ]);

    let mut connector = quiet_connector();
    connector.host("lobby").unwrap();
    let joins = counter();
    let losses = counter();
    {
        let mut host = connector.as_host_mut().unwrap();
        let mut on_join = bump(&joins);
        host.on_new_client().subscribe(move |(id, request)| {
            assert_eq!(*id, Identifier::from(7_u64));
            assert_eq!(request["name"], "lobby");
            on_join(&());
        });
        let mut on_loss = bump(&losses);
        host.on_lost_client().subscribe(move |id| {
            assert_eq!(*id, Identifier::from(7_u64));
            on_loss(&());
        });
    }

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    let done = Arc::clone(&losses);
    session
        .run_until(move |_| done.load(Ordering::SeqCst) == 1)
        .await
        .unwrap();

    assert_eq!(joins.load(Ordering::SeqCst), 1);
    assert_eq!(losses.load(Ordering::SeqCst), 1);
    assert!(session.connector().as_host().unwrap().client_ids().is_empty());
}

#[tokio::test]
async fn unsubscribed_host_message_reaches_missed_fallback_once() {
    let (transport, _recorded) = MockTransport::scripted([
        hosting_json(1, "lobby"),
        from_client_json(4, json!("ping")),
    ]);

    let mut connector = quiet_connector();
    connector.host("lobby").unwrap();
    let missed = counter();
    let mut on_missed = bump(&missed);
    connector
        .as_host_mut()
        .unwrap()
        .on_message()
        .on_missed(move |(message, from)| {
            assert_eq!(message, &json!("ping"));
            assert_eq!(from, &Identifier::from(4_u64));
            on_missed(&());
        });

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    let done = Arc::clone(&missed);
    session
        .run_until(move |_| done.load(Ordering::SeqCst) > 0)
        .await
        .unwrap();

    assert_eq!(missed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn host_sends_to_selected_clients_and_broadcasts() {
    let (transport, recorded) = MockTransport::scripted([
        hosting_json(1, "lobby"),
        new_client_json(1, json!({})),
        new_client_json(2, json!({})),
    ]);

    let mut connector = quiet_connector();
    connector.host("lobby").unwrap();
    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    session
        .run_until(|c| c.as_host().is_some_and(|h| h.client_ids().len() == 2))
        .await
        .unwrap();

    {
        let mut host = session.connector_mut().as_host_mut().unwrap();
        host.send(json!("just you"), Some(vec![Identifier::from(2_u64)]));
        host.broadcast(json!("everyone"));
    }
    session.flush().await.unwrap();

    let sent = recorded.lock().unwrap().sent_json();
    assert_eq!(
        &sent[1..],
        &[
            json!({"type": "SEND", "message": "just you", "clientIDs": [2]}),
            json!({"type": "SEND", "message": "everyone"}),
        ]
    );
}

// ════════════════════════════════════════════════════════════════════
// Connection lifetime
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn host_listing_fires_on_list() {
    let (transport, recorded) = MockTransport::scripted([list_json(json!(["a", "b"]))]);

    let mut connector = quiet_connector();
    let listing = Arc::new(StdMutex::new(None));
    let sink = Arc::clone(&listing);
    connector
        .get_hosts()
        .unwrap()
        .subscribe_once(move |payload| *sink.lock().unwrap() = Some(payload.clone()));

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    let seen = Arc::clone(&listing);
    session
        .run_until(move |_| seen.lock().unwrap().is_some())
        .await
        .unwrap();

    assert_eq!(recorded.lock().unwrap().sent_types(), vec!["LIST"]);
    assert_eq!(*listing.lock().unwrap(), Some(json!(["a", "b"])));
}

#[tokio::test]
async fn server_info_is_reported_without_affecting_role() {
    let (transport, _recorded) = MockTransport::scripted([server_info_json("2.0.0")]);

    let mut connector = quiet_connector();
    let version = Arc::new(StdMutex::new(None));
    let sink = Arc::clone(&version);
    connector
        .on_server_info()
        .subscribe(move |info| *sink.lock().unwrap() = info.api_version.clone());

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    let seen = Arc::clone(&version);
    session
        .run_until(move |_| seen.lock().unwrap().is_some())
        .await
        .unwrap();

    assert_eq!(version.lock().unwrap().as_deref(), Some("2.0.0"));
    assert_eq!(session.connector().role(), RoleKind::User);
}

#[tokio::test]
async fn unknown_and_malformed_frames_are_ignored() {
    let (transport, _recorded) = MockTransport::scripted([
        r#"{"type":"SOMETHING_NEW","x":1}"#.to_string(),
        "not json".to_string(),
        joined_json("abc"),
    ]);

    let mut connector = quiet_connector();
    connector.join("roomA").unwrap();
    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    assert_ok!(
        session
            .run_until(|c| c.joined().is_succeeded())
            .await
    );
    assert_eq!(session.connector().role(), RoleKind::Client);
}

#[tokio::test]
async fn server_close_fires_on_close_and_fails_pending_join() {
    let (transport, _recorded) = MockTransport::new(vec![None]);
    let transport = transport.with_server_close(CloseInfo::new(4000, "maintenance"));

    let mut connector = quiet_connector();
    connector.join("roomA").unwrap();
    let closed_with = Arc::new(StdMutex::new(None));
    let sink = Arc::clone(&closed_with);
    connector
        .on_close()
        .subscribe(move |info| *sink.lock().unwrap() = Some(info.clone()));

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    session.run().await;

    assert_eq!(
        *closed_with.lock().unwrap(),
        Some(CloseInfo::new(4000, "maintenance"))
    );
    let connector = session.connector_mut();
    assert_eq!(connector.role(), RoleKind::Dead);
    assert!(connector.connected().is_succeeded());
    assert!(matches!(
        connector.joined().state().failure(),
        Some(NexusError::ConnectionClosed { code: 4000, .. })
    ));
}

#[tokio::test]
async fn transport_error_makes_connector_dead() {
    let (transport, _recorded) =
        MockTransport::new(vec![Some(Err(NexusError::TransportReceive("reset".into())))]);

    let mut connector = quiet_connector();
    connector.host("lobby").unwrap();
    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();
    session.run().await;

    let connector = session.connector_mut();
    assert_eq!(connector.role(), RoleKind::Dead);
    assert!(connector.connected().is_failed());
    assert!(connector.hosting().is_failed());
    assert_err!(connector.host("again"));
    assert_err!(connector.get_hosts());
}

#[tokio::test]
async fn local_close_sends_close_with_code_and_reason() {
    let (transport, recorded) = MockTransport::new(vec![]);

    let mut session = Session::new(quiet_connector());
    session.attach(transport).await.unwrap();
    session.close("bye", 4001).await.unwrap();

    assert_eq!(
        recorded.lock().unwrap().closed_with,
        Some(CloseInfo::new(4001, "bye"))
    );
    assert!(!session.is_open());
    assert_eq!(session.connector().role(), RoleKind::Dead);
}

#[tokio::test]
async fn close_before_open_is_sent_after_queued_requests() {
    let (transport, recorded) = MockTransport::new(vec![]);

    let mut connector = quiet_connector();
    connector.get_hosts().unwrap();
    connector.close_default().unwrap();

    let mut session = Session::new(connector);
    session.attach(transport).await.unwrap();

    let recorded = recorded.lock().unwrap();
    assert_eq!(recorded.sent_types(), vec!["LIST"]);
    assert_eq!(
        recorded.closed_with.as_ref().map(|info| info.code),
        Some(CloseInfo::NORMAL)
    );
}
