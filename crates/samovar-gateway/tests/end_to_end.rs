//! End-to-end tests over loopback TCP: a real server, real sockets, and
//! the line-level codec driven directly.

mod common;

use common::{TestClient, spawn_server};

use samovar_proto::{ClientFrame, ServerFrame};
use samovar_types::events::{ChatType, ClientCommand, ServerEvent};

#[tokio::test]
async fn register_then_login_and_wrong_password_fails() {
    let (addr, _ctx, _dir) = spawn_server("auth").await;

    // Register and log in on one connection.
    let alice = TestClient::login(addr, "alice", "pw123", true).await;
    alice.shutdown().await;

    // Wrong password: FAIL, then the server closes the connection.
    let mut bad = TestClient::connect(addr).await;
    bad.send(&ClientFrame::Login {
        username: "alice".into(),
        password: "wrong".into(),
    })
    .await;
    assert_eq!(bad.recv().await, Some(ServerFrame::Fail));
    assert_eq!(bad.recv().await, None);

    // Unknown user: same fatal rejection.
    let mut ghost = TestClient::connect(addr).await;
    ghost
        .send(&ClientFrame::Login {
            username: "nobody".into(),
            password: "pw123".into(),
        })
        .await;
    assert_eq!(ghost.recv().await, Some(ServerFrame::Fail));

    // Correct credentials still work afterwards.
    let ok = TestClient::login(addr, "alice", "pw123", false).await;
    ok.shutdown().await;
}

#[tokio::test]
async fn duplicate_registration_is_rejected_without_closing() {
    let (addr, _ctx, _dir) = spawn_server("dup_reg").await;

    let mut first = TestClient::connect(addr).await;
    first
        .send(&ClientFrame::Register {
            username: "alice".into(),
            password: "pw123".into(),
        })
        .await;
    assert_eq!(first.recv().await, Some(ServerFrame::Ok));

    first
        .send(&ClientFrame::Register {
            username: "alice".into(),
            password: "other".into(),
        })
        .await;
    match first.recv().await {
        Some(ServerFrame::Event(ServerEvent::Error { error })) => {
            assert!(error.contains("taken"));
        }
        other => panic!("expected error event, got {other:?}"),
    }

    // The connection survived: a login on it still succeeds.
    first
        .send(&ClientFrame::Login {
            username: "alice".into(),
            password: "pw123".into(),
        })
        .await;
    assert_eq!(first.recv().await, Some(ServerFrame::Ok));
}

#[tokio::test]
async fn public_message_reaches_every_session_and_is_persisted() {
    let (addr, ctx, _dir) = spawn_server("public").await;

    let mut alice = TestClient::login(addr, "alice", "pw123", true).await;
    let mut bob = TestClient::login(addr, "bob", "pw456", true).await;

    alice
        .send(&ClientFrame::Public {
            text: "hello: world".into(),
        })
        .await;

    let frame = bob
        .recv_until(|f| matches!(f, ServerFrame::Public(_)))
        .await;
    let ServerFrame::Public(msg) = frame else {
        unreachable!()
    };
    assert_eq!(msg.user, "alice");
    assert_eq!(msg.message, "hello: world");
    assert!(!msg.is_admin);

    // The sender gets its own echo too.
    alice
        .recv_until(
            |f| matches!(f, ServerFrame::Public(m) if m.message == "hello: world"),
        )
        .await;

    let stored = ctx.store.public_messages().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, msg.id);
}

#[tokio::test]
async fn private_message_is_stored_under_canonical_key_and_delivered_live_iff_online() {
    let (addr, ctx, _dir) = spawn_server("private").await;

    // bob registers but does not stay logged in.
    let mut reg = TestClient::connect(addr).await;
    reg.send(&ClientFrame::Register {
        username: "bob".into(),
        password: "pw456".into(),
    })
    .await;
    assert_eq!(reg.recv().await, Some(ServerFrame::Ok));
    reg.shutdown().await;

    let mut alice = TestClient::login(addr, "alice", "pw123", true).await;
    alice
        .send(&ClientFrame::Private {
            recipient: "bob".into(),
            text: "are you there?".into(),
        })
        .await;

    // Sender echo names the thread peer.
    let frame = alice
        .recv_until(|f| matches!(f, ServerFrame::Private { .. }))
        .await;
    let ServerFrame::Private { peer, message } = frame else {
        unreachable!()
    };
    assert_eq!(peer, "bob");
    assert_eq!(message.user, "alice");

    // Persisted under min_max ordering even though alice < bob sent it.
    let thread = ctx.store.private_thread("alice_bob").unwrap();
    assert_eq!(thread.len(), 1);

    // bob was offline: nothing was lost, history delivers it.
    let mut bob = TestClient::login(addr, "bob", "pw456", false).await;
    bob.send(&ClientFrame::Command(ClientCommand::LoadMessages {
        chat_type: ChatType::Private,
        target: Some("alice".into()),
    }))
    .await;
    let frame = bob
        .recv_until(|f| {
            matches!(
                f,
                ServerFrame::Event(ServerEvent::MessagesData { .. })
            )
        })
        .await;
    let ServerFrame::Event(ServerEvent::MessagesData { messages, .. }) = frame else {
        unreachable!()
    };
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message, "are you there?");

    // Now that bob is online, delivery is live.
    alice
        .send(&ClientFrame::Private {
            recipient: "bob".into(),
            text: "ping".into(),
        })
        .await;
    let frame = bob
        .recv_until(|f| matches!(f, ServerFrame::Private { .. }))
        .await;
    let ServerFrame::Private { peer, message } = frame else {
        unreachable!()
    };
    assert_eq!(peer, "alice");
    assert_eq!(message.message, "ping");
}

#[tokio::test]
async fn channel_fanout_hits_subscribers_only_and_write_policy_is_enforced() {
    let (addr, ctx, _dir) = spawn_server("channel").await;

    let mut alice = TestClient::login(addr, "alice", "pw1", true).await;
    let mut bob = TestClient::login(addr, "bob", "pw2", true).await;
    let mut carol = TestClient::login(addr, "carol", "pw3", true).await;

    // alice creates an announcements-style channel: subscribers read-only.
    alice
        .send(&ClientFrame::Command(ClientCommand::CreateChannel {
            name: "announce".into(),
            description: "read-only".into(),
            is_public: true,
            subscribers_can_write: false,
        }))
        .await;
    alice
        .recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::ChannelsUpdated)))
        .await;

    let channels = ctx.store.channels().unwrap();
    assert_eq!(channels.len(), 1);
    let channel_id = channels[0].id.clone();
    assert!(channels[0].is_subscriber("alice"));

    // bob saw the create-broadcast too; drain it so the next update he
    // waits for is the one from his own join.
    bob.recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::ChannelsUpdated)))
        .await;

    // bob joins; joining twice keeps a single membership.
    for _ in 0..2 {
        bob.send(&ClientFrame::Command(ClientCommand::JoinChannel {
            channel_id: channel_id.clone(),
        }))
        .await;
    }
    bob.recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::ChannelsUpdated)))
        .await;
    let channel = ctx.store.channel(&channel_id).unwrap().unwrap();
    assert_eq!(
        channel.subscribers.iter().filter(|s| *s == "bob").count(),
        1
    );

    // bob is a subscriber but the channel is read-only for him.
    bob.send(&ClientFrame::ChannelMsg {
        channel_id: channel_id.clone(),
        text: "me first!".into(),
    })
    .await;
    bob.recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::Error { .. })))
        .await;
    assert!(ctx.store.channel_messages(&channel_id).unwrap().is_empty());

    // The owner can always write.
    alice
        .send(&ClientFrame::ChannelMsg {
            channel_id: channel_id.clone(),
            text: "release at 16:00".into(),
        })
        .await;
    // Marker lets us prove carol never saw the channel message.
    alice
        .send(&ClientFrame::Public {
            text: "marker".into(),
        })
        .await;

    let frame = bob
        .recv_until(|f| matches!(f, ServerFrame::ChannelMsg { .. }))
        .await;
    let ServerFrame::ChannelMsg {
        channel_id: got_id,
        message,
    } = frame
    else {
        unreachable!()
    };
    assert_eq!(got_id, channel_id);
    assert_eq!(message.message, "release at 16:00");

    // carol is not subscribed: she sees the marker but no channel frame.
    loop {
        match carol.recv().await.expect("carol connection open") {
            ServerFrame::ChannelMsg { .. } => panic!("non-subscriber received channel message"),
            ServerFrame::Public(m) if m.message == "marker" => break,
            _ => continue,
        }
    }
}

#[tokio::test]
async fn presence_is_broadcast_and_get_users_reflects_disconnect() {
    let (addr, _ctx, _dir) = spawn_server("presence").await;

    let alice = TestClient::login(addr, "alice", "pw1", true).await;
    let mut bob = TestClient::login(addr, "bob", "pw2", true).await;

    alice.shutdown().await;
    bob.recv_until(
        |f| matches!(f, ServerFrame::Event(ServerEvent::UserOffline { user }) if user == "alice"),
    )
    .await;

    bob.send(&ClientFrame::Command(ClientCommand::GetUsers)).await;
    let frame = bob
        .recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::UsersList { .. })))
        .await;
    let ServerFrame::Event(ServerEvent::UsersList { users }) = frame else {
        unreachable!()
    };
    assert!(
        users.iter().all(|u| u.username != "alice"),
        "disconnected user still listed: {users:?}"
    );
    let bob_entry = users.iter().find(|u| u.username == "bob").unwrap();
    assert!(bob_entry.online);
}

#[tokio::test]
async fn second_login_evicts_the_older_session() {
    let (addr, _ctx, _dir) = spawn_server("evict").await;

    let mut first = TestClient::login(addr, "alice", "pw1", true).await;
    let mut second = TestClient::login(addr, "alice", "pw1", false).await;

    // The older connection gets a final error, then the socket closes.
    first
        .recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::Error { .. })))
        .await;
    assert_eq!(first.recv().await, None);

    // The newer session is fully functional.
    second
        .send(&ClientFrame::Public {
            text: "still here".into(),
        })
        .await;
    second
        .recv_until(|f| matches!(f, ServerFrame::Public(m) if m.message == "still here"))
        .await;
}

#[tokio::test]
async fn delete_message_requires_authorship() {
    let (addr, ctx, _dir) = spawn_server("delete").await;

    let mut alice = TestClient::login(addr, "alice", "pw1", true).await;
    let mut bob = TestClient::login(addr, "bob", "pw2", true).await;

    alice
        .send(&ClientFrame::Public {
            text: "regrettable".into(),
        })
        .await;
    let frame = alice
        .recv_until(|f| matches!(f, ServerFrame::Public(_)))
        .await;
    let ServerFrame::Public(msg) = frame else {
        unreachable!()
    };

    // bob may not delete alice's message.
    bob.send(&ClientFrame::Command(ClientCommand::DeleteMessage {
        message_id: msg.id.clone(),
        chat_type: ChatType::Public,
        target: None,
    }))
    .await;
    bob.recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::Error { .. })))
        .await;
    assert_eq!(ctx.store.public_messages().unwrap().len(), 1);

    // The author may.
    alice
        .send(&ClientFrame::Command(ClientCommand::DeleteMessage {
            message_id: msg.id.clone(),
            chat_type: ChatType::Public,
            target: None,
        }))
        .await;
    bob.recv_until(
        |f| matches!(f, ServerFrame::Event(ServerEvent::MessageDeleted { message_id, .. }) if *message_id == msg.id),
    )
    .await;
    assert!(ctx.store.public_messages().unwrap().is_empty());
}

#[tokio::test]
async fn file_upload_is_stored_by_kind_and_announced() {
    let (addr, _ctx, dir) = spawn_server("file").await;

    let mut alice = TestClient::login(addr, "alice", "pw1", true).await;
    let mut bob = TestClient::login(addr, "bob", "pw2", true).await;

    let payload = b"\x89PNG fake image bytes";
    alice
        .send(&ClientFrame::File {
            filename: "team.png".into(),
            size: payload.len() as u64,
        })
        .await;
    alice.send_bytes(payload).await;

    let frame = bob
        .recv_until(|f| matches!(f, ServerFrame::File { .. }))
        .await;
    assert_eq!(
        frame,
        ServerFrame::File {
            filename: "team.png".into()
        }
    );

    // The broadcast happens after the write, so the blob is on disk now.
    let stored = std::fs::read(dir.join("chat_images").join("team.png")).unwrap();
    assert_eq!(stored, payload);
}

#[tokio::test]
async fn storage_failure_during_delete_is_reported_as_such() {
    let (addr, ctx, dir) = spawn_server("delete_io").await;

    let mut alice = TestClient::login(addr, "alice", "pw1", true).await;
    alice
        .send(&ClientFrame::Public {
            text: "doomed".into(),
        })
        .await;
    let frame = alice
        .recv_until(|f| matches!(f, ServerFrame::Public(_)))
        .await;
    let ServerFrame::Public(msg) = frame else {
        unreachable!()
    };

    // Pull the data directory out from under the store so the rewrite
    // fails while the in-memory lookup still succeeds.
    std::fs::remove_dir_all(&dir).unwrap();

    alice
        .send(&ClientFrame::Command(ClientCommand::DeleteMessage {
            message_id: msg.id.clone(),
            chat_type: ChatType::Public,
            target: None,
        }))
        .await;
    let frame = alice
        .recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::Error { .. })))
        .await;
    let ServerFrame::Event(ServerEvent::Error { error }) = frame else {
        unreachable!()
    };
    assert!(error.contains("storage failure"), "got {error:?}");
    // The in-memory deletion is kept (at-most-once durability).
    assert!(ctx.store.public_messages().unwrap().is_empty());
}

#[tokio::test]
async fn oversized_attachment_is_refused_with_an_error() {
    let (addr, _ctx, _dir) = spawn_server("too_large").await;

    let mut alice = TestClient::login(addr, "alice", "pw1", true).await;
    alice
        .send(&ClientFrame::File {
            filename: "huge.bin".into(),
            size: 65 * 1024 * 1024,
        })
        .await;

    // The refusal must reach the peer before the server closes the socket.
    let frame = alice
        .recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::Error { .. })))
        .await;
    let ServerFrame::Event(ServerEvent::Error { error }) = frame else {
        unreachable!()
    };
    assert!(error.contains("too large"), "got {error:?}");
    assert_eq!(alice.recv().await, None);
}

#[tokio::test]
async fn malformed_frames_do_not_kill_the_session() {
    let (addr, _ctx, _dir) = spawn_server("malformed").await;

    let mut alice = TestClient::login(addr, "alice", "pw1", true).await;
    alice.send_bytes(b"SHOUT:into the void\n").await;
    alice
        .recv_until(|f| matches!(f, ServerFrame::Event(ServerEvent::Error { .. })))
        .await;

    // Still alive and routable.
    alice
        .send(&ClientFrame::Public {
            text: "survived".into(),
        })
        .await;
    alice
        .recv_until(|f| matches!(f, ServerFrame::Public(m) if m.message == "survived"))
        .await;
}

#[tokio::test]
async fn concurrent_public_senders_lose_no_messages() {
    let (addr, ctx, _dir) = spawn_server("concurrent").await;

    let users = ["nika", "timur", "aru"];
    let mut clients = Vec::new();
    for (i, user) in users.iter().enumerate() {
        clients.push(TestClient::login(addr, user, &format!("pw{i}"), true).await);
    }

    let mut tasks = Vec::new();
    for (i, mut client) in clients.into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            for n in 0..10 {
                client
                    .send(&ClientFrame::Public {
                        text: format!("sender {i} message {n}"),
                    })
                    .await;
            }
            client
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Fan-out and the durable append happen on the server's schedule; poll.
    let deadline = tokio::time::Instant::now() + common::RECV_DEADLINE;
    loop {
        let stored = ctx.store.public_messages().unwrap();
        if stored.len() == 30 {
            let mut ids: Vec<_> = stored.iter().map(|m| m.id.clone()).collect();
            ids.sort();
            ids.dedup();
            assert_eq!(ids.len(), 30, "duplicate message ids");
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "only {} of 30 messages arrived",
            stored.len()
        );
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}
