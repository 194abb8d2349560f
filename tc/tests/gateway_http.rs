//! HTTP gateway tests against a mock trip server

use itinerary::{ItemId, ItemPatch, NewItineraryItem, OrderChange};
use serde_json::json;
use tripcrew::config::ServerConfig;
use tripcrew::gateway::{GatewayError, HttpGateway, TripGateway};
use tripcrew::trip::TripId;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> HttpGateway {
    let config = ServerConfig {
        base_url: server.uri(),
        fetch_retries: 2,
        initial_backoff_ms: 10,
        timeout_ms: 2_000,
        ..Default::default()
    };
    HttpGateway::new(config, "secret").expect("Failed to build gateway")
}

fn trip_json() -> serde_json::Value {
    json!({
        "id": 3,
        "title": "Porto weekend",
        "start_date": "2024-06-07",
        "end_date": "2024-06-09",
        "itinerary_items": [
            {"id": 10, "day": 1, "order_in_day": 1, "place_name": "Livraria Lello", "start_time": "10:00:00"},
            {"id": 11, "day": 1, "order_in_day": 2, "place_name": "Ribeira"},
            {"id": 12, "day": 3, "order_in_day": 1, "place_name": "Serralves"}
        ],
        "chats": [
            {"id": 1, "sender": {"id": 5, "nickname": "ana"}, "message": "so excited", "created_at": "2024-06-01T09:00:00"}
        ]
    })
}

#[tokio::test]
async fn test_fetch_trip_sends_bearer_token_and_parses_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .and(header("Authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trip_json()))
        .expect(1)
        .mount(&server)
        .await;

    let trip = gateway(&server).fetch_trip(TripId(3)).await.unwrap();

    assert_eq!(trip.title, "Porto weekend");
    assert_eq!(trip.span().trip_days, 3);
    assert_eq!(trip.itinerary_items.len(), 3);
    assert_eq!(trip.itinerary_items[2].position(), (3, 1));
    assert_eq!(trip.chats.len(), 1);
}

#[tokio::test]
async fn test_fetch_retries_transient_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trip_json()))
        .mount(&server)
        .await;

    let trip = gateway(&server).fetch_trip(TripId(3)).await.unwrap();
    assert_eq!(trip.id, TripId(3));
}

#[tokio::test]
async fn test_retry_delay_is_capped_for_huge_backoff() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(trip_json()))
        .mount(&server)
        .await;

    let config = ServerConfig {
        base_url: server.uri(),
        fetch_retries: 3,
        initial_backoff_ms: u64::MAX / 2,
        max_backoff_ms: 10,
        timeout_ms: 2_000,
        ..Default::default()
    };
    let gateway = HttpGateway::new(config, "secret").expect("Failed to build gateway");
    let trip = tokio::time::timeout(std::time::Duration::from_secs(5), gateway.fetch_trip(TripId(3)))
        .await
        .expect("retry slept too long")
        .unwrap();
    assert_eq!(trip.id, TripId(3));
}

#[tokio::test]
async fn test_fetch_does_not_retry_client_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/9"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Trip not found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = gateway(&server).fetch_trip(TripId(9)).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert!(err.to_string().contains("Trip not found"));
}

#[tokio::test]
async fn test_submit_order_puts_batch_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/trips/3/itinerary/order"))
        .and(body_json(json!({"items": [
            {"id": 12, "day": 1, "order_in_day": 1},
            {"id": 10, "day": 1, "order_in_day": 2}
        ]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let changes = [
        OrderChange {
            id: ItemId(12),
            day: 1,
            order_in_day: 1,
        },
        OrderChange {
            id: ItemId(10),
            day: 1,
            order_in_day: 2,
        },
    ];
    gateway(&server).submit_order(TripId(3), &changes).await.unwrap();
}

#[tokio::test]
async fn test_submit_order_is_never_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/trips/3/itinerary/order"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let changes = [OrderChange {
        id: ItemId(10),
        day: 2,
        order_in_day: 1,
    }];
    let err = gateway(&server).submit_order(TripId(3), &changes).await.unwrap_err();
    assert!(matches!(err, GatewayError::Http { status: 503, .. }));
}

#[tokio::test]
async fn test_create_update_and_delete_item() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/trips/3/itinerary-items/"))
        .and(body_json(json!({"day": 2, "order_in_day": 1, "place_name": "Bolhão Market"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"id": 20, "day": 2, "order_in_day": 1, "place_name": "Bolhão Market"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/trips/3/itinerary-items/20"))
        .and(body_json(json!({"place_name": "Mercado do Bolhão"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"id": 20, "day": 2, "order_in_day": 1, "place_name": "Mercado do Bolhão"}),
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/trips/3/itinerary-items/20"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let mut new_item = NewItineraryItem::new(2, "Bolhão Market");
    new_item.order_in_day = 1;
    let created = gateway.create_item(TripId(3), &new_item).await.unwrap();
    assert_eq!(created.id, ItemId(20));

    let patch = ItemPatch {
        place_name: Some("Mercado do Bolhão".to_string()),
        ..Default::default()
    };
    let updated = gateway.update_item(TripId(3), ItemId(20), &patch).await.unwrap();
    assert_eq!(updated.place_name, "Mercado do Bolhão");

    gateway.delete_item(TripId(3), ItemId(20)).await.unwrap();
}

#[tokio::test]
async fn test_fetch_me_and_chats() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 5, "nickname": "ana"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/trips/3/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "sender": {"id": 5, "nickname": "ana"}, "message": "hi"},
            {"id": 2, "message": "Here is a plan", "is_from_gpt": true}
        ])))
        .mount(&server)
        .await;

    let gateway = gateway(&server);
    let me = gateway.fetch_me().await.unwrap();
    assert_eq!(me.nickname, "ana");

    let chats = gateway.fetch_chats(TripId(3)).await.unwrap();
    assert_eq!(chats.len(), 2);
    assert!(chats[0].is_from(5));
    assert!(chats[1].is_from_assistant);
}
