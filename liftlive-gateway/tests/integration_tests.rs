use futures_util::{SinkExt, StreamExt};
use liftlive_gateway::{GatewayConfig, GatewayServer, LiveGateway, ServerEvent};
use liftlive_metrics::SetState;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::{connect_async, tungstenite::Message};

fn drain(rx: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn rep_frame(id: &str, speed: f64, rom_hit: bool) -> String {
    json!({
        "event": "rep",
        "data": {
            "id": id,
            "metrics": {"tut": 3.0, "speed": speed, "romHit": rom_hit},
            "timestamp": 1_700_000_000_000_i64
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_full_set_over_gateway() {
    let gateway = LiveGateway::default();
    let (session, mut rx) = gateway.connect().await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], ServerEvent::ConnectionAck { .. }));

    gateway
        .handle_frame(session, r#"{"event":"startSet","data":{"exerciseId":"squat","load":100}}"#)
        .await
        .unwrap();
    assert_eq!(gateway.state().await, SetState::Active);

    for (i, (speed, rom)) in [(0.5, true), (0.4, true), (0.3, false)].iter().enumerate() {
        gateway
            .handle_frame(session, &rep_frame(&format!("r{}", i), *speed, *rom))
            .await
            .unwrap();
    }

    let reps = json!({
        "event": "endSet",
        "data": {"reps": [
            {"id": "r0", "metrics": {"tut": 3.0, "speed": 0.5, "romHit": true}},
            {"id": "r1", "metrics": {"tut": 3.0, "speed": 0.4, "romHit": true}},
            {"id": "r2", "metrics": {"tut": 3.0, "speed": 0.3, "romHit": false}}
        ]}
    });
    gateway.handle_frame(session, &reps.to_string()).await.unwrap();

    let events = drain(&mut rx);
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec!["rep", "setUpdate", "rep", "setUpdate", "rep", "setUpdate", "setEnd"]
    );

    match events.last().unwrap() {
        ServerEvent::SetEnd(set_end) => {
            assert_eq!(set_end.summary.reps, 3);
            assert_eq!(set_end.summary.vl, 40.0);
            assert_eq!(set_end.summary.rom_hit_rate, 66.7);
        }
        other => panic!("expected setEnd, got {:?}", other),
    }
    assert_eq!(gateway.state().await, SetState::Idle);

    // Late reps for the finished set are dropped
    gateway
        .handle_frame(session, &rep_frame("late", 0.2, true))
        .await
        .unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_set_end_fans_out_to_every_session() {
    let gateway = LiveGateway::default();
    let (first, mut first_rx) = gateway.connect().await;
    let (_second, mut second_rx) = gateway.connect().await;
    drain(&mut first_rx);
    drain(&mut second_rx);

    gateway
        .handle_frame(first, r#"{"event":"startSet"}"#)
        .await
        .unwrap();
    gateway
        .handle_frame(
            first,
            r#"{"event":"endSet","data":{"reps":[{"metrics":{"tut":2.5,"speed":0.6}}]}}"#,
        )
        .await
        .unwrap();

    let first_end: Vec<_> = drain(&mut first_rx)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::SetEnd(_)))
        .collect();
    let second_end: Vec<_> = drain(&mut second_rx)
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::SetEnd(_)))
        .collect();

    assert_eq!(first_end.len(), 1);
    assert_eq!(first_end, second_end);
}

#[tokio::test]
async fn test_late_joiner_gets_snapshot() {
    let gateway = LiveGateway::default();
    let (session, mut rx) = gateway.connect().await;
    gateway
        .handle_frame(session, r#"{"event":"startSet","data":null}"#)
        .await
        .unwrap();
    gateway
        .handle_frame(session, &rep_frame("r0", 0.5, true))
        .await
        .unwrap();
    drain(&mut rx);

    let (_late, mut late_rx) = gateway.connect().await;
    let events = drain(&mut late_rx);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ServerEvent::ConnectionAck { .. }));
    match &events[1] {
        ServerEvent::SetUpdate(update) => assert_eq!(update.reps_completed, 1),
        other => panic!("expected setUpdate, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_frame_answers_sender_only() {
    let gateway = LiveGateway::default();
    let (bad, mut bad_rx) = gateway.connect().await;
    let (_other, mut other_rx) = gateway.connect().await;
    drain(&mut bad_rx);
    drain(&mut other_rx);

    assert!(gateway.handle_frame(bad, "not json").await.is_err());
    assert!(gateway
        .handle_frame(bad, r#"{"event":"jump","data":{}}"#)
        .await
        .is_err());

    let events = drain(&mut bad_rx);
    assert_eq!(events.len(), 2);
    match &events[1] {
        ServerEvent::ProcessingError { code, .. } => assert_eq!(code, "unknown_event"),
        other => panic!("expected processing_error, got {:?}", other),
    }
    assert!(drain(&mut other_rx).is_empty());
    assert_eq!(gateway.state().await, SetState::Idle);
}

#[tokio::test]
async fn test_disconnect_keeps_set_running() {
    let gateway = LiveGateway::default();
    let (session, _rx) = gateway.connect().await;
    gateway
        .handle_frame(session, r#"{"event":"startSet"}"#)
        .await
        .unwrap();

    gateway.disconnect(session).await;
    assert_eq!(gateway.client_count().await, 0);
    assert_eq!(gateway.state().await, SetState::Active);
}

#[tokio::test]
async fn test_watchdog_expires_idle_set() {
    let gateway = Arc::new(LiveGateway::new(GatewayConfig {
        idle_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    }));
    let watchdog = gateway.spawn_watchdog().unwrap();

    gateway.start_set(None, Default::default()).await;
    assert_eq!(gateway.state().await, SetState::Active);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(gateway.state().await, SetState::Idle);

    watchdog.abort();
}

#[tokio::test]
async fn test_websocket_round_trip() {
    let gateway = Arc::new(LiveGateway::default());
    let server = GatewayServer::new(Arc::clone(&gateway));
    let addr = server.start("127.0.0.1:0".parse().unwrap()).await.unwrap();
    assert_eq!(server.local_addr().await, Some(addr));

    let url = format!("ws://{}/ws", addr);
    let (mut ws, _) = connect_async(url).await.expect("connect");

    async fn next_json(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("timed out")
                .expect("stream closed")
                .expect("ws error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    let ack = next_json(&mut ws).await;
    assert_eq!(ack["event"], "connection_ack");
    assert_eq!(ack["data"]["status"], "connected");

    ws.send(Message::Text(r#"{"event":"startSet"}"#.into()))
        .await
        .unwrap();
    ws.send(Message::Text(rep_frame("r0", 0.5, true))).await.unwrap();

    let rep = next_json(&mut ws).await;
    assert_eq!(rep["event"], "rep");
    assert_eq!(rep["data"]["metrics"]["speed"], 0.5);

    let update = next_json(&mut ws).await;
    assert_eq!(update["event"], "setUpdate");
    assert_eq!(update["data"]["repsCompleted"], 1);

    ws.send(Message::Text(r#"{"event":"endSet","data":{}}"#.into()))
        .await
        .unwrap();
    let end = next_json(&mut ws).await;
    assert_eq!(end["event"], "setEnd");
    assert_eq!(end["data"]["summary"]["reps"], 1);
    assert!(end["data"]["tip"].is_string());

    ws.close(None).await.unwrap();
    server.stop().await.unwrap();
    assert!(server.stop().await.is_err());
}
