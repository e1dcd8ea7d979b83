mod common;

use anonrelay::relay::admin::{self, AdminOutcome};
use anonrelay::relay::pipeline::RelayOutcome;
use anonrelay::relay::{EventOutcome, InboundEvent, RecordingTransport, RelayServer};
use anonrelay::storage::{StateStore, UserStats};
use common::{base_config, seed_state, state_path, ADMIN, CHANNEL};
use serde_json::json;

fn two_users() -> serde_json::Value {
    json!({
        "users": {
            "7": { "alias": "IT-407", "role": "IT" },
            "8": { "alias": "CN-808", "role": "CN" },
            "9": { "banned": false }
        },
        "config": {}
    })
}

#[tokio::test]
async fn non_admin_stats_gets_no_reply() {
    let (cfg, _tmp) = base_config();
    seed_state(&cfg, &two_users());
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg, transport.clone()).await.unwrap();

    for text in ["/stats", "/ban IT-407", "/bind"] {
        let outcome = server
            .handle_event(InboundEvent::private_text("7", text))
            .await;
        assert_eq!(outcome, EventOutcome::Admin(AdminOutcome::Unauthorized));
    }
    assert!(transport.deliveries().is_empty());
    assert!(!server.store().get("7").unwrap().banned);
    assert!(server.channel_id().is_none());
}

#[tokio::test]
async fn admin_stats_counts_by_role() {
    let (cfg, _tmp) = base_config();
    seed_state(&cfg, &two_users());
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg, transport.clone()).await.unwrap();

    let outcome = server
        .handle_event(InboundEvent::private_text(ADMIN, "/stats"))
        .await;
    let expected = UserStats {
        total: 3,
        it: 1,
        cn: 1,
    };
    assert_eq!(outcome, EventOutcome::Admin(AdminOutcome::Stats(expected)));
    assert_eq!(
        transport.replies_to(ADMIN),
        vec!["👥 Users: 3 (IT: 1, CN: 1)".to_string()]
    );
}

#[tokio::test]
async fn ban_unknown_alias_leaves_store_unchanged() {
    let (cfg, _tmp) = base_config();
    seed_state(&cfg, &two_users());
    let before = std::fs::read(state_path(&cfg)).unwrap();
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg.clone(), transport.clone())
        .await
        .unwrap();

    let outcome = server
        .handle_event(InboundEvent::private_text(ADMIN, "/ban IT-999"))
        .await;
    assert_eq!(
        outcome,
        EventOutcome::Admin(AdminOutcome::AliasNotFound("IT-999".into()))
    );
    assert_eq!(
        transport.replies_to(ADMIN),
        vec![admin::ALIAS_NOT_FOUND.to_string()]
    );
    assert_eq!(std::fs::read(state_path(&cfg)).unwrap(), before);
    assert!(server.store().users().all(|(_, r)| !r.banned));
}

#[tokio::test]
async fn ban_is_durable_and_blocks_relay() {
    let (mut cfg, _tmp) = base_config();
    cfg.relay.default_channel_id = Some(CHANNEL.into());
    seed_state(&cfg, &two_users());
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg.clone(), transport.clone())
        .await
        .unwrap();

    let outcome = server
        .handle_event(InboundEvent::private_text(ADMIN, "/ban IT-407"))
        .await;
    assert_eq!(
        outcome,
        EventOutcome::Admin(AdminOutcome::Banned {
            alias: "IT-407".into(),
            user_id: "7".into(),
        })
    );
    assert_eq!(
        transport.replies_to(ADMIN),
        vec!["🚫 Banned IT-407".to_string()]
    );

    let outcome = server
        .handle_event(InboundEvent::private_text("7", "can you hear me"))
        .await;
    assert_eq!(outcome, EventOutcome::Relay(RelayOutcome::Banned));
    assert!(transport.channel_posts().is_empty());
    assert!(transport.replies_to("7").is_empty());

    let reloaded = StateStore::load(&cfg.storage.data_dir, &cfg.storage.db_file)
        .await
        .unwrap();
    let record = reloaded.get("7").unwrap();
    assert!(record.banned);
    assert_eq!(record.alias.as_deref(), Some("IT-407"));
}

#[tokio::test]
async fn ban_without_alias_shows_usage() {
    let (cfg, _tmp) = base_config();
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg, transport.clone()).await.unwrap();

    let outcome = server
        .handle_event(InboundEvent::private_text(ADMIN, "/ban"))
        .await;
    assert_eq!(outcome, EventOutcome::Admin(AdminOutcome::BanUsage));
    assert_eq!(
        transport.replies_to(ADMIN),
        vec![admin::BAN_USAGE.to_string()]
    );
}

#[tokio::test]
async fn bind_in_channel_sets_destination() {
    let (cfg, _tmp) = base_config();
    seed_state(&cfg, &two_users());
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg.clone(), transport.clone())
        .await
        .unwrap();

    let outcome = server
        .handle_event(InboundEvent::channel_post(ADMIN, CHANNEL, "/bind"))
        .await;
    assert_eq!(
        outcome,
        EventOutcome::Admin(AdminOutcome::Bound(CHANNEL.into()))
    );
    assert_eq!(server.channel_id().as_deref(), Some(CHANNEL));
    assert_eq!(
        transport.take(),
        vec![anonrelay::relay::transport::Delivery::Channel {
            channel_id: CHANNEL.into(),
            text: admin::BIND_OK.into(),
            hint: anonrelay::relay::FormatHint::Plain,
        }]
    );

    server
        .handle_event(InboundEvent::private_text("8", "ni hao"))
        .await;
    assert_eq!(
        transport.channel_posts(),
        vec![(CHANNEL.to_string(), "CN-808:\nni hao".to_string())]
    );

    let reloaded = StateStore::load(&cfg.storage.data_dir, &cfg.storage.db_file)
        .await
        .unwrap();
    assert_eq!(reloaded.channel_id(), Some(CHANNEL));
}

#[tokio::test]
async fn rebind_replaces_previous_channel() {
    let (cfg, _tmp) = base_config();
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg, transport).await.unwrap();

    server
        .handle_event(InboundEvent::channel_post(ADMIN, CHANNEL, "/bind"))
        .await;
    server
        .handle_event(InboundEvent::channel_post(ADMIN, "-100999", "/bind@relay_bot"))
        .await;
    assert_eq!(server.channel_id().as_deref(), Some("-100999"));
}

#[tokio::test]
async fn bind_outside_channel_gives_hint() {
    let (cfg, _tmp) = base_config();
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg, transport.clone()).await.unwrap();

    let outcome = server
        .handle_event(InboundEvent::private_text(ADMIN, "/bind"))
        .await;
    assert_eq!(outcome, EventOutcome::Admin(AdminOutcome::BindHint));
    assert_eq!(
        transport.replies_to(ADMIN),
        vec![admin::BIND_HINT.to_string()]
    );
    assert!(server.channel_id().is_none());
}

#[tokio::test]
async fn anonymous_channel_post_cannot_bind() {
    let (cfg, _tmp) = base_config();
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg, transport.clone()).await.unwrap();

    let outcome = server
        .handle_event(InboundEvent::channel_post("", CHANNEL, "/bind"))
        .await;
    assert_eq!(outcome, EventOutcome::Admin(AdminOutcome::Unauthorized));
    assert!(server.channel_id().is_none());
    assert!(transport.deliveries().is_empty());
}

#[tokio::test]
async fn command_for_another_bot_is_not_handled() {
    let (cfg, _tmp) = base_config();
    seed_state(&cfg, &two_users());
    let transport = RecordingTransport::new();
    let mut server = RelayServer::new(cfg, transport.clone()).await.unwrap();

    let ev = InboundEvent::channel_post(ADMIN, CHANNEL, "/bind@someotherbot")
        .addressed_to(Some("relay_bot"));
    assert_eq!(server.handle_event(ev).await, EventOutcome::Ignored);
    assert!(server.channel_id().is_none());
    assert!(transport.deliveries().is_empty());
}
