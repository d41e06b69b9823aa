//! livesync-wasm 統合テスト
//!
//! channel + router + reducer + buffer の完全なパイプラインを ViewCore 経由でテストする。
//! ホスト（JS）の役割はテスト側で演じる。

use std::cell::RefCell;
use std::rc::Rc;

use livesync_channel::{ChannelOptions, Command, ConnectionId, ConnectionState, Credentials};
use livesync_event::kinds;
use livesync_reduce::{HydrationOutcome, HydrationTicket, MergePolicy, SliceId};
use livesync_router::HandlerError;
use livesync_wasm::ViewCore;
use serde_json::{json, Value};

// ==============================================================
// ヘルパー: ホストのふり
// ==============================================================

fn options(schedule: &str) -> ChannelOptions {
    let json = format!(r#"{{"credentials":"omit","backoffScheduleMs":{}}}"#, schedule);
    ChannelOptions::from_json(&json).unwrap()
}

fn dashboard() -> ViewCore {
    let mut view = ViewCore::open("wss://ops.example.com/live", options("[100, 200]")).unwrap();
    view.register_feed(
        kinds::ORCHESTRATION_TASK_UPDATE,
        "tasks",
        MergePolicy::from_parts("upsert", 3, Some("id")).unwrap(),
    )
    .unwrap();
    view.register_feed(
        kinds::AGENT_ACTIVITY_NEW,
        "activity",
        MergePolicy::from_parts("prepend", 3, None).unwrap(),
    )
    .unwrap();
    view.register_feed(
        kinds::FUNDING_TOTAL_UPDATE,
        "funding",
        MergePolicy::from_parts("replace", 0, None).unwrap(),
    )
    .unwrap();
    view
}

/// poll して Connect を実行し、ソケットを開いたことにする
fn connect(view: &mut ViewCore, now: u64) -> (ConnectionId, Option<HydrationTicket>) {
    let id = match view.poll(now).as_slice() {
        [Command::Connect { connection_id, with_credentials, .. }] => {
            assert!(!*with_credentials);
            *connection_id
        }
        other => panic!("Connect を期待: {:?}", other),
    };
    let ticket = view.transport_opened(id, &format!("sock-{}", id.raw()), now);
    (id, ticket)
}

fn send(view: &mut ViewCore, id: ConnectionId, kind: &str, payload: Value, now: u64) {
    view.receive(id, kind, &payload.to_string(), now).unwrap();
}

fn slice(view: &ViewCore, name: &str) -> Value {
    view.snapshot(name).unwrap()
}

// ==============================================================
// テスト
// ==============================================================

#[test]
fn test_prepend_feed_scenario() {
    let mut view = dashboard();
    let (id, _) = connect(&mut view, 0);

    for (i, v) in ["A", "B", "C", "D"].iter().enumerate() {
        send(&mut view, id, kinds::AGENT_ACTIVITY_NEW, json!(v), 10 + i as u64);
    }

    assert_eq!(slice(&view, "activity"), json!(["D", "C", "B"]));
}

#[test]
fn test_upsert_feed_scenario() {
    let mut view = dashboard();
    let (id, _) = connect(&mut view, 0);

    send(&mut view, id, kinds::ORCHESTRATION_TASK_UPDATE, json!({"id": 2, "v": "b"}), 1);
    send(&mut view, id, kinds::ORCHESTRATION_TASK_UPDATE, json!({"id": 1, "v": "a"}), 2);
    assert_eq!(slice(&view, "tasks"), json!([{"id": 1, "v": "a"}, {"id": 2, "v": "b"}]));

    send(&mut view, id, kinds::ORCHESTRATION_TASK_UPDATE, json!({"id": 1, "v": "a2"}), 3);
    assert_eq!(slice(&view, "tasks"), json!([{"id": 1, "v": "a2"}, {"id": 2, "v": "b"}]));
}

#[test]
fn test_replace_slice_and_change_tracking() {
    let mut view = dashboard();
    let (id, _) = connect(&mut view, 0);
    assert!(view.take_changed().is_empty());

    send(&mut view, id, kinds::FUNDING_TOTAL_UPDATE, json!({"total": 10}), 1);
    send(&mut view, id, kinds::FUNDING_TOTAL_UPDATE, json!({"total": 25}), 2);

    assert_eq!(slice(&view, "funding"), json!({"total": 25}));
    assert_eq!(view.take_changed(), vec![SliceId::from("funding")]);
    assert!(view.take_changed().is_empty());
}

#[test]
fn test_reconnect_triggers_rehydration_once_per_reconnect() {
    let mut view = dashboard();
    let mount = view.mount(0);

    let (first, ticket) = connect(&mut view, 1);
    assert_eq!(ticket, None, "初回接続は mount の取得でカバー済み");
    view.complete_hydration(mount, &json!({"activity": ["seed"]}), 2).unwrap();

    let mut tickets = Vec::new();
    let mut id = first;
    let mut now = 10;
    for _ in 0..3 {
        view.transport_dropped(id, now).unwrap();
        assert_eq!(view.connection_state(), ConnectionState::Disconnected);
        assert!(view.status().reconnecting);

        now = view.next_wakeup_ms().unwrap();
        let (next, ticket) = connect(&mut view, now);
        tickets.push(ticket.expect("再接続ごとに再取得が要求される"));
        id = next;
        now += 10;
    }

    let seqs: Vec<u64> = tickets.iter().map(|t| t.seq).collect();
    assert_eq!(seqs, vec![mount.seq + 1, mount.seq + 2, mount.seq + 3]);
}

#[test]
fn test_rehydration_closes_gap_and_discards_stale_events() {
    let mut view = dashboard();
    let mount = view.mount(0);
    let (first, _) = connect(&mut view, 0);
    view.complete_hydration(mount, &json!({"activity": []}), 1).unwrap();

    send(&mut view, first, kinds::AGENT_ACTIVITY_NEW, json!("before-drop"), 5);
    view.transport_dropped(first, 10).unwrap();

    // 切断中の "missed" はサーバー側にだけ存在する
    let (second, ticket) = connect(&mut view, 110);
    let ticket = ticket.unwrap();

    // 取得中に届いたイベントは取得結果に含まれる（受信 120 < 完了 150）
    send(&mut view, second, kinds::AGENT_ACTIVITY_NEW, json!("during-fetch"), 120);

    let refetched = r#"{"activity": ["during-fetch", "missed", "before-drop"]}"#;
    let outcome = view.complete_hydration_json(ticket, refetched, 150).unwrap();
    assert_eq!(outcome, HydrationOutcome::Applied(vec![SliceId::from("activity")]));
    assert_eq!(slice(&view, "activity"), json!(["during-fetch", "missed", "before-drop"]));

    // 完了前に受信してホスト側で滞留していたイベントは、取得結果に含まれているものとして破棄
    send(&mut view, second, kinds::AGENT_ACTIVITY_NEW, json!("queued"), 140);
    assert_eq!(slice(&view, "activity"), json!(["during-fetch", "missed", "before-drop"]));

    // 取得完了後のイベントは通常どおり統合される
    send(&mut view, second, kinds::AGENT_ACTIVITY_NEW, json!("after"), 160);
    assert_eq!(slice(&view, "activity"), json!(["after", "during-fetch", "missed"]));
}

#[test]
fn test_superseded_hydration_is_discarded() {
    let mut view = dashboard();
    let old = view.mount(0);
    let (first, _) = connect(&mut view, 0);
    view.transport_dropped(first, 5).unwrap();
    let (_, newer) = connect(&mut view, 105);
    let newer = newer.unwrap();

    view.complete_hydration(newer, &json!({"funding": {"total": 2}}), 200).unwrap();
    let outcome = view.complete_hydration(old, &json!({"funding": {"total": 1}}), 210).unwrap();

    assert_eq!(outcome, HydrationOutcome::Superseded);
    assert_eq!(slice(&view, "funding"), json!({"total": 2}));
}

#[test]
fn test_handler_isolation() {
    let mut view = dashboard();
    let calls = Rc::new(RefCell::new(Vec::new()));

    let spy = Rc::clone(&calls);
    view.on(kinds::LOW_STOCK_ALERT, move |_| {
        spy.borrow_mut().push("throws");
        Err(HandlerError::rejected("toast service down"))
    })
    .unwrap();
    let spy = Rc::clone(&calls);
    view.on(kinds::LOW_STOCK_ALERT, move |_| {
        spy.borrow_mut().push("panics");
        panic!("badge renderer bug")
    })
    .unwrap();
    let spy = Rc::clone(&calls);
    view.on(kinds::LOW_STOCK_ALERT, move |_| {
        spy.borrow_mut().push("ok");
        Ok(())
    })
    .unwrap();

    let (id, _) = connect(&mut view, 0);
    let report = view
        .receive(id, kinds::LOW_STOCK_ALERT, r#"{"sku":"W-7"}"#, 1)
        .unwrap()
        .unwrap();

    assert_eq!(*calls.borrow(), vec!["throws", "panics", "ok"]);
    assert_eq!(report.invoked, 3);
    assert_eq!(report.failed, 2);

    let failures = view.take_failures();
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.kind.as_str() == kinds::LOW_STOCK_ALERT));
    assert!(view.take_failures().is_empty());
}

#[test]
fn test_post_close_silence() {
    let mut view = dashboard();
    let mount = view.mount(0);
    let (id, _) = connect(&mut view, 0);
    send(&mut view, id, kinds::AGENT_ACTIVITY_NEW, json!("kept"), 1);
    view.take_changed();

    assert_eq!(view.close(), Some(Command::Disconnect { connection_id: id }));
    assert_eq!(view.close(), None);

    // トランスポートのバッファに残っていたイベントと、遅れて完了した取得
    assert_eq!(view.receive(id, kinds::AGENT_ACTIVITY_NEW, r#""late""#, 2).unwrap(), None);
    assert_eq!(
        view.complete_hydration(mount, &json!({"activity": []}), 3).unwrap(),
        HydrationOutcome::Superseded
    );
    assert_eq!(view.transport_opened(id, "sock", 4), None);

    assert_eq!(slice(&view, "activity"), json!(["kept"]));
    assert!(view.take_changed().is_empty());
    assert!(view.poll(10_000).is_empty());
    assert_eq!(view.connection_state(), ConnectionState::Closed);
}

#[test]
fn test_close_from_handler_stops_delivery() {
    let mut view = dashboard();
    let handle = view.close_handle();
    view.on(kinds::ORDER_CREATED, move |_| {
        handle.close();
        Ok(())
    })
    .unwrap();
    let hits = Rc::new(RefCell::new(0));
    let spy = Rc::clone(&hits);
    view.on(kinds::ORDER_CREATED, move |_| {
        *spy.borrow_mut() += 1;
        Ok(())
    })
    .unwrap();

    let (id, _) = connect(&mut view, 0);
    view.receive(id, kinds::ORDER_CREATED, "{}", 1).unwrap();

    assert_eq!(*hits.borrow(), 0);
    assert_eq!(view.poll(2), vec![Command::Disconnect { connection_id: id }]);
    assert!(view.is_closed());
}

#[test]
fn test_unreachable_without_reconnect() {
    let mut opts = options("[50]");
    opts.reconnect = false;
    opts.credentials = Credentials::Include;
    let mut view = ViewCore::open("https://ops.example.com/live", opts).unwrap();

    let first = match view.poll(0).as_slice() {
        [Command::Connect { connection_id, .. }] => *connection_id,
        other => panic!("Connect を期待: {:?}", other),
    };
    view.transport_failed(first, 1).unwrap();

    let second = match view.poll(51).as_slice() {
        [Command::Connect { connection_id, attempt, .. }] => {
            assert_eq!(*attempt, 1);
            *connection_id
        }
        other => panic!("Connect を期待: {:?}", other),
    };
    let err = view.transport_failed(second, 60).unwrap_err();

    assert_eq!(err.to_string(), "endpoint unreachable after 2 attempts");
    assert_eq!(view.next_wakeup_ms(), None);
}

#[test]
fn test_malformed_upsert_key_is_prepended() {
    let mut view = dashboard();
    let (id, _) = connect(&mut view, 0);

    send(&mut view, id, kinds::ORCHESTRATION_TASK_UPDATE, json!({"id": 1, "v": "a"}), 1);
    send(&mut view, id, kinds::ORCHESTRATION_TASK_UPDATE, json!({"v": "no-id"}), 2);

    assert_eq!(slice(&view, "tasks"), json!([{"v": "no-id"}, {"id": 1, "v": "a"}]));
}
