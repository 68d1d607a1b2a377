use super::*;

use proptest::prelude::*;

fn mailbox(capacity: usize) -> (Mailbox, mpsc::Receiver<Bytes>) {
    mpsc::channel(capacity)
}

fn drain(rx: &mut mpsc::Receiver<Bytes>) -> Vec<Bytes> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

fn spawn_hub() -> (HubHandle, CancellationToken, tokio::task::JoinHandle<()>) {
    let (hub, handle) = Hub::new(DEFAULT_REQUEST_BUFFER);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(hub.run(shutdown.clone()));
    (handle, shutdown, task)
}

// ── loop state, driven directly ─────────────────────────────────────

#[test]
fn broadcast_reaches_every_member() {
    let (mut hub, _handle) = Hub::new(8);
    let mut receivers = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = mailbox(4);
        hub.register(SessionId::new(), tx);
        receivers.push(rx);
    }

    let outcome = hub.broadcast(&Bytes::from_static(b"hello"));
    assert_eq!(outcome.delivered, 3);
    assert_eq!(outcome.evicted, 0);

    for rx in &mut receivers {
        assert_eq!(drain(rx), vec![Bytes::from_static(b"hello")]);
    }
}

#[test]
fn broadcast_with_no_members_is_a_no_op() {
    let (mut hub, _handle) = Hub::new(8);
    let outcome = hub.broadcast(&Bytes::from_static(b"nobody"));
    assert_eq!(outcome, FanOut::default());
    assert_eq!(hub.snapshot().broadcasts, 1);
}

#[test]
fn unregister_twice_matches_once() {
    let (mut hub, _handle) = Hub::new(8);
    let keep = SessionId::new();
    let gone = SessionId::new();
    let (keep_tx, _keep_rx) = mailbox(4);
    let (gone_tx, mut gone_rx) = mailbox(4);
    hub.register(keep.clone(), keep_tx);
    hub.register(gone.clone(), gone_tx);

    assert!(hub.unregister(&gone));
    let after_once = hub.snapshot();
    assert!(!hub.unregister(&gone));
    let after_twice = hub.snapshot();

    assert_eq!(after_once.members, after_twice.members);
    assert_eq!(after_twice.members, vec![keep]);
    assert!(matches!(
        gone_rx.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));
}

#[test]
fn unregister_unknown_session_is_a_no_op() {
    let (mut hub, _handle) = Hub::new(8);
    assert!(!hub.unregister(&SessionId::new()));
    assert!(hub.snapshot().is_empty());
}

#[test]
fn full_mailbox_is_evicted_and_others_unaffected() {
    let capacity = 256;
    let (mut hub, _handle) = Hub::new(8);
    let stalled = SessionId::new();
    let healthy = SessionId::new();
    let (stalled_tx, mut stalled_rx) = mailbox(capacity);
    let (healthy_tx, mut healthy_rx) = mailbox(capacity);
    hub.register(stalled.clone(), stalled_tx);
    hub.register(healthy.clone(), healthy_tx);

    for i in 0..capacity {
        let outcome = hub.broadcast(&Bytes::from(format!("m{i}")));
        assert_eq!(outcome.evicted, 0);
        // The healthy session keeps up.
        assert_eq!(drain(&mut healthy_rx).len(), 1);
    }
    assert!(hub.snapshot().contains(&stalled));

    let outcome = hub.broadcast(&Bytes::from_static(b"overflow"));
    assert_eq!(outcome.evicted, 1);
    assert_eq!(outcome.delivered, 1);

    let snapshot = hub.snapshot();
    assert!(!snapshot.contains(&stalled));
    assert!(snapshot.contains(&healthy));
    assert_eq!(snapshot.evictions, 1);
    assert_eq!(drain(&mut healthy_rx), vec![Bytes::from_static(b"overflow")]);

    // The evicted mailbox keeps what it had queued, then reads as closed.
    assert_eq!(drain(&mut stalled_rx).len(), capacity);
    assert!(matches!(
        stalled_rx.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));

    let _ = hub.broadcast(&Bytes::from_static(b"later"));
    assert_eq!(drain(&mut healthy_rx), vec![Bytes::from_static(b"later")]);
}

#[test]
fn dropped_receiver_is_removed_on_next_broadcast() {
    let (mut hub, _handle) = Hub::new(8);
    let id = SessionId::new();
    let (tx, rx) = mailbox(4);
    hub.register(id.clone(), tx);
    drop(rx);

    let outcome = hub.broadcast(&Bytes::from_static(b"x"));
    assert_eq!(outcome.gone, 1);
    assert!(!hub.snapshot().contains(&id));
    assert_eq!(hub.snapshot().evictions, 0);
}

#[test]
fn reregistering_replaces_previous_mailbox() {
    let (mut hub, _handle) = Hub::new(8);
    let id = SessionId::new();
    let (old_tx, mut old_rx) = mailbox(4);
    let (new_tx, mut new_rx) = mailbox(4);
    hub.register(id.clone(), old_tx);
    hub.register(id.clone(), new_tx);

    assert_eq!(hub.snapshot().len(), 1);
    let _ = hub.broadcast(&Bytes::from_static(b"x"));
    assert_eq!(drain(&mut new_rx).len(), 1);
    assert!(matches!(
        old_rx.try_recv(),
        Err(mpsc::error::TryRecvError::Disconnected)
    ));
}

// ── through the handle and the running loop ─────────────────────────

#[tokio::test]
async fn register_is_visible_once_acknowledged() {
    let (handle, _shutdown, _task) = spawn_hub();
    let id = SessionId::new();
    let (tx, _rx) = mailbox(4);

    handle.register(id.clone(), tx).await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.members, vec![id]);
}

#[tokio::test]
async fn two_sessions_both_receive_hello() {
    let (handle, _shutdown, _task) = spawn_hub();
    let s1 = SessionId::new();
    let s2 = SessionId::new();
    let (tx1, mut rx1) = mailbox(256);
    let (tx2, mut rx2) = mailbox(256);
    handle.register(s1, tx1).await.unwrap();
    handle.register(s2, tx2).await.unwrap();

    // S1's own message comes back to it as well.
    handle.broadcast(Bytes::from_static(b"hello")).await.unwrap();
    // The snapshot round-trip orders us after the broadcast.
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.broadcasts, 1);

    assert_eq!(drain(&mut rx1), vec![Bytes::from_static(b"hello")]);
    assert_eq!(drain(&mut rx2), vec![Bytes::from_static(b"hello")]);
}

#[tokio::test]
async fn unregistered_session_gets_nothing_more() {
    let (handle, _shutdown, _task) = spawn_hub();
    let s1 = SessionId::new();
    let s2 = SessionId::new();
    let (tx1, mut rx1) = mailbox(8);
    let (tx2, mut rx2) = mailbox(8);
    handle.register(s1.clone(), tx1).await.unwrap();
    handle.register(s2, tx2).await.unwrap();

    handle.unregister(&s1).unwrap();
    handle.unregister(&s1).unwrap();
    handle.broadcast(Bytes::from_static(b"after")).await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();

    assert!(!snapshot.contains(&s1));
    assert_eq!(snapshot.len(), 1);
    assert!(rx1.recv().await.is_none());
    assert_eq!(rx2.recv().await, Some(Bytes::from_static(b"after")));
}

#[tokio::test]
async fn stalled_session_is_evicted_through_the_loop() {
    let (handle, _shutdown, _task) = spawn_hub();
    let stalled = SessionId::new();
    let (tx, _stalled_rx) = mailbox(256);
    handle.register(stalled.clone(), tx).await.unwrap();

    for i in 0..256 {
        handle.broadcast(Bytes::from(format!("m{i}"))).await.unwrap();
    }
    assert!(handle.snapshot().await.unwrap().contains(&stalled));

    handle.broadcast(Bytes::from_static(b"one too many")).await.unwrap();
    let snapshot = handle.snapshot().await.unwrap();
    assert!(!snapshot.contains(&stalled));
    assert_eq!(snapshot.evictions, 1);
}

#[tokio::test]
async fn shutdown_closes_every_mailbox() {
    let (handle, shutdown, task) = spawn_hub();
    let (tx, mut rx) = mailbox(4);
    handle.register(SessionId::new(), tx).await.unwrap();

    shutdown.cancel();
    task.await.unwrap();

    assert!(rx.recv().await.is_none());
    assert_eq!(handle.snapshot().await, Err(HubError::Closed));
    assert_eq!(
        handle.broadcast(Bytes::from_static(b"late")).await,
        Err(HubError::Closed)
    );
    assert_eq!(handle.unregister(&SessionId::new()), Err(HubError::Closed));
}

#[tokio::test]
async fn loop_ends_when_every_handle_is_dropped() {
    let (hub, handle) = Hub::new(4);
    let task = tokio::spawn(hub.run(CancellationToken::new()));
    drop(handle);
    task.await.unwrap();
}

// ── properties ──────────────────────────────────────────────────────

proptest! {
    #[test]
    fn every_member_gets_each_broadcast_exactly_once(
        sessions in 1usize..12,
        messages in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 1..20),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let (handle, _shutdown, _task) = spawn_hub();
            let mut receivers = Vec::new();
            for _ in 0..sessions {
                let (tx, rx) = mailbox(messages.len());
                handle.register(SessionId::new(), tx).await.unwrap();
                receivers.push(rx);
            }

            for m in &messages {
                handle.broadcast(Bytes::from(m.clone())).await.unwrap();
            }
            let snapshot = handle.snapshot().await.unwrap();
            prop_assert_eq!(snapshot.len(), sessions);

            let expected: Vec<Bytes> = messages.iter().cloned().map(Bytes::from).collect();
            for rx in &mut receivers {
                prop_assert_eq!(drain(rx), expected.clone());
            }
            Ok(())
        })?;
    }

    #[test]
    fn membership_follows_register_and_unregister(ops in proptest::collection::vec((0usize..6, any::<bool>()), 0..40)) {
        let ids: Vec<SessionId> = (0..6).map(|_| SessionId::new()).collect();
        let (mut hub, _handle) = Hub::new(4);
        let mut expected = std::collections::HashSet::new();
        let mut receivers = Vec::new();

        for (slot, add) in ops {
            let id = &ids[slot];
            if add {
                let (tx, rx) = mailbox(1);
                hub.register(id.clone(), tx);
                receivers.push(rx);
                let _ = expected.insert(id.clone());
            } else {
                let was_member = hub.unregister(id);
                prop_assert_eq!(was_member, expected.remove(id));
            }
        }

        let actual: std::collections::HashSet<SessionId> = hub.snapshot().members.into_iter().collect();
        prop_assert_eq!(actual, expected);
    }
}
