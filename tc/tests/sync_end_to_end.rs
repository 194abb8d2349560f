//! Coordinator tests over real HTTP and WebSocket transports

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use itinerary::{ItemId, ItineraryList};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tripcrew::config::{Config, ServerConfig};
use tripcrew::gateway::{HttpGateway, TripGateway};
use tripcrew::realtime::{Connector, WsConnector};
use tripcrew::sync::{SyncCoordinator, SyncHandle, SyncOptions};
use tripcrew::trip::TripId;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn trip_json(items: serde_json::Value) -> serde_json::Value {
    json!({
        "id": 3,
        "title": "Porto weekend",
        "start_date": "2024-06-07",
        "end_date": "2024-06-09",
        "itinerary_items": items,
        "chats": [{"id": 1, "sender": {"id": 5, "nickname": "ana"}, "message": "hello"}]
    })
}

fn initial_items() -> serde_json::Value {
    json!([
        {"id": 10, "day": 1, "order_in_day": 1, "place_name": "Livraria Lello"},
        {"id": 11, "day": 1, "order_in_day": 2, "place_name": "Ribeira"},
        {"id": 12, "day": 3, "order_in_day": 1, "place_name": "Serralves"}
    ])
}

async fn mount_me(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5, "nickname": "ana"})))
        .mount(server)
        .await;
}

fn gateway(server: &MockServer) -> Arc<dyn TripGateway> {
    let config = ServerConfig {
        base_url: server.uri(),
        fetch_retries: 0,
        ..Default::default()
    };
    Arc::new(HttpGateway::new(config, "secret").expect("Failed to build gateway"))
}

fn ids(list: &ItineraryList) -> Vec<(i64, u32, u32)> {
    list.items().map(|item| (item.id.0, item.day, item.order_in_day)).collect()
}

async fn settled_snapshot(handle: &SyncHandle) -> ItineraryList {
    tokio::time::timeout(Duration::from_secs(5), handle.settle())
        .await
        .expect("coordinator did not settle")
        .unwrap();
    handle.snapshot().await.unwrap()
}

#[tokio::test]
async fn test_reorder_is_persisted_as_one_batch() {
    let server = MockServer::start().await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trip_json(initial_items())))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/trips/3/itinerary/order"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let handle = SyncCoordinator::spawn(TripId(3), gateway(&server), None, SyncOptions::default())
        .await
        .unwrap();
    handle.move_item(ItemId(12), 1, 1).await.unwrap();

    let list = settled_snapshot(&handle).await;
    assert_eq!(ids(&list), vec![(12, 1, 1), (10, 1, 2), (11, 1, 3)]);

    let requests = server.received_requests().await.unwrap();
    let put = requests
        .iter()
        .find(|request| request.method.as_str() == "PUT")
        .expect("no order request");
    let mut body: Vec<serde_json::Value> = put.body_json::<serde_json::Value>().unwrap()["items"]
        .as_array()
        .unwrap()
        .clone();
    body.sort_by_key(|change| change["id"].as_i64());
    assert_eq!(
        body,
        vec![
            json!({"id": 10, "day": 1, "order_in_day": 2}),
            json!({"id": 11, "day": 1, "order_in_day": 3}),
            json!({"id": 12, "day": 1, "order_in_day": 1}),
        ]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rejected_order_reverts_to_server_state() {
    let server = MockServer::start().await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trip_json(initial_items())))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/trips/3/itinerary/order"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let handle = SyncCoordinator::spawn(TripId(3), gateway(&server), None, SyncOptions::default())
        .await
        .unwrap();
    handle.move_item(ItemId(10), 1, 2).await.unwrap();

    let list = settled_snapshot(&handle).await;
    assert_eq!(ids(&list), vec![(10, 1, 1), (11, 1, 2), (12, 3, 1)]);
    assert_eq!(handle.status().await.unwrap().pending_edits, 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_plan_update_over_websocket_triggers_refetch() {
    let server = MockServer::start().await;
    mount_me(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trip_json(initial_items())))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trip_json(json!([
            {"id": 12, "day": 1, "order_in_day": 1, "place_name": "Serralves"},
            {"id": 30, "day": 2, "order_in_day": 1, "place_name": "Douro Valley"}
        ]))))
        .mount(&server)
        .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(
            r#"{"type": "chat_message", "payload": {"id": 2, "message": "I rearranged your trip", "is_from_gpt": true}}"#
                .to_string(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            r#"{"type": "plan_update", "payload": {"message": "Trip itinerary has been updated by GPT."}}"#.to_string(),
        ))
        .await
        .unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    });

    let mut config = Config::default();
    config.realtime.ws_url = Some(format!("ws://{}", addr));
    config.realtime.reconnect.enabled = false;
    let connector: Arc<dyn Connector> = Arc::new(WsConnector::new(&config, "secret"));

    let handle = SyncCoordinator::spawn(TripId(3), gateway(&server), Some(connector), SyncOptions::from(&config))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let list = handle.snapshot().await.unwrap();
        if ids(&list) == vec![(12, 1, 1), (30, 2, 1)] {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "refetched plan never arrived");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let transcript = handle.transcript().await.unwrap();
    assert_eq!(transcript.len(), 2);
    assert!(transcript[1].is_from_assistant);

    handle.shutdown().await.unwrap();
}
