use dispatch_sync::api::{
    ApiError, DriverRegistration, OrderSubmission, RestClient, StatusUpdate, WebData,
};
use dispatch_sync::booking::{self, BookingDraft, PassengerBooking};
use dispatch_sync::button::RecordingHostButton;
use dispatch_sync::geocode::{Geocoder, NominatimGeocoder};
use dispatch_sync::model::{LatLng, Money, OrderId, PresenceStatus, SessionIdentity};
use dispatch_sync::poller::OrderFeed;
use dispatch_sync::pricing::{polyline, OrsRoutePlanner, PricingEngine, RouteError, RoutePlanner};
use httpmock::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn anna() -> SessionIdentity {
    SessionIdentity {
        user_id: 7,
        username: Some("anna".into()),
    }
}

#[tokio::test]
async fn test_active_orders_accepts_mixed_shapes() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/active-orders");
            then.status(200).header("content-type", "application/json").body(
                r#"[
                    {"id": 1, "from": "A", "to": "B", "price": 210, "distance": 5.0},
                    {"orderId": "2", "pickup": "C", "dropoff": "D", "canceledAt": null,
                     "updatedAt": 1714557600000}
                ]"#,
            );
        })
        .await;
    let client = RestClient::new(server.base_url());

    let snapshot = client.fetch().await.unwrap();

    mock.assert_async().await;
    assert_eq!(snapshot.records.len(), 2);
    assert_eq!(snapshot.records[0].id, Some(OrderId::from("1")));
    assert_eq!(snapshot.records[0].price, Some(Money(210)));
    assert_eq!(snapshot.records[0].distance_km, Some(5.0));
    assert_eq!(snapshot.records[1].dropoff.as_deref(), Some("D"));
    assert_eq!(snapshot.records[1].canceled_at, Some(None));
    assert_eq!(
        snapshot.records[1].updated_at.map(|t| t.timestamp()),
        Some(1_714_557_600)
    );
}

#[tokio::test]
async fn test_error_status_keeps_body() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/active-orders");
            then.status(502).body("upstream down");
        })
        .await;
    let client = RestClient::new(server.base_url());

    match client.active_orders().await {
        Err(ApiError::Status { status, body }) => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream down");
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_write_endpoints_send_identity() {
    let server = MockServer::start_async().await;
    let driver = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/driver")
                .json_body_partial(r#"{"user_id": 7, "username": "anna", "location": {"lat": 60.7076}}"#);
            then.status(200).body("{}");
        })
        .await;
    let status = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/status")
                .json_body(serde_json::json!({"user_id": 7, "status": "offline"}));
            then.status(200).body("{}");
        })
        .await;
    let web_data = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/web-data")
                .json_body_partial(r#"{"data": {"action": "ping"}}"#);
            then.status(200).body("{}");
        })
        .await;
    let client = RestClient::new(format!("{}/", server.base_url()));

    client
        .register_driver(&DriverRegistration {
            identity: anna(),
            location: Some(LatLng::new(60.7076, 28.7528)),
        })
        .await
        .unwrap();
    client
        .update_status(&StatusUpdate {
            user_id: 7,
            status: PresenceStatus::Offline,
        })
        .await
        .unwrap();
    client
        .send_web_data(&WebData {
            identity: anna(),
            data: serde_json::json!({"action": "ping"}),
        })
        .await
        .unwrap();

    driver.assert_async().await;
    status.assert_async().await;
    web_data.assert_async().await;
}

#[tokio::test]
async fn test_submit_order_posts_flat_body() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/order-data").json_body(serde_json::json!({
                "user_id": 7,
                "username": "anna",
                "phone": "89991234567",
                "pickup": "Vokzalnaya 1",
                "dropoff": "Lenina 5",
                "pickup_coords": {"lat": 60.7, "lon": 28.75},
                "dropoff_coords": {"lat": 60.73, "lon": 28.8},
                "tariff": "eco",
                "distance_km": 5.0,
                "price": 210
            }));
            then.status(201).body("{}");
        })
        .await;
    let client = RestClient::new(server.base_url());

    client
        .submit_order(&OrderSubmission {
            identity: anna(),
            phone: "89991234567".into(),
            pickup: "Vokzalnaya 1".into(),
            dropoff: "Lenina 5".into(),
            pickup_coords: LatLng::new(60.70, 28.75),
            dropoff_coords: LatLng::new(60.73, 28.80),
            tariff: "eco".into(),
            distance_km: 5.0,
            price: Money(210),
        })
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_button_press_submits_quoted_order() {
    let server = MockServer::start_async().await;
    let geometry = polyline::encode(&[LatLng::new(60.70, 28.75), LatLng::new(60.73, 28.80)]);
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v2/directions/driving-car");
            then.status(200).json_body(serde_json::json!({
                "routes": [{"geometry": geometry, "summary": {"distance": 5004.0}}]
            }));
        })
        .await;
    let order_data = server
        .mock_async(|when, then| {
            when.method(POST).path("/order-data").json_body_partial(
                r#"{"user_id": 7, "phone": "+79991234567", "tariff": "kids", "price": 250, "distance_km": 5.0}"#,
            );
            then.status(200).body("{}");
        })
        .await;

    let (tx, rx) = mpsc::channel(4);
    let submitter = tokio::spawn(booking::run_submitter(RestClient::new(server.base_url()), rx));
    let host = Arc::new(RecordingHostButton::new());
    let mut booking = PassengerBooking::new(host.clone(), anna(), tx);

    let pickup = LatLng::new(60.70, 28.75);
    let dropoff = LatLng::new(60.73, 28.80);
    let planner = OrsRoutePlanner::new_with_base_url("k".into(), server.base_url());
    let trip = PricingEngine::new(Arc::new(planner))
        .quote_trip(&[pickup, dropoff])
        .await
        .unwrap();

    booking.edit(|draft: &mut BookingDraft| {
        draft.ride.pickup = Some(pickup);
        draft.ride.dropoff = Some(dropoff);
        draft.ride.tariff = Some("Kids".into());
        draft.quote = Some(trip);
    });
    assert!(!host.is_visible());
    for ch in "+79991234567".chars() {
        booking.edit(|draft| draft.phone.phone.push(ch).unwrap());
    }
    assert!(host.is_visible());

    assert_eq!(host.press(), 1);
    drop(booking);
    tokio::time::timeout(Duration::from_secs(5), submitter)
        .await
        .expect("submitter drained")
        .unwrap();

    order_data.assert_async().await;
}

#[tokio::test]
async fn test_ors_route_reads_geometry_and_distance() {
    let geometry = polyline::encode(&[
        LatLng::new(60.70, 28.75),
        LatLng::new(60.72, 28.77),
        LatLng::new(60.73, 28.80),
    ]);
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v2/directions/driving-car")
                .header("authorization", "secret-key")
                .json_body(serde_json::json!({"coordinates": [[28.75, 60.70], [28.80, 60.73]]}));
            then.status(200).json_body(serde_json::json!({
                "routes": [{"geometry": geometry, "summary": {"distance": 5004.0, "duration": 600.0}}]
            }));
        })
        .await;
    let planner = OrsRoutePlanner::new_with_base_url("secret-key".into(), server.base_url());

    let route = planner
        .plan(&[LatLng::new(60.70, 28.75), LatLng::new(60.73, 28.80)])
        .await
        .unwrap();

    assert_eq!(route.distance_km, 5.0);
    assert_eq!(route.points.len(), 3);

    let trip = PricingEngine::new(Arc::new(planner))
        .quote_trip(&[LatLng::new(60.70, 28.75), LatLng::new(60.73, 28.80)])
        .await
        .unwrap();
    assert_eq!(trip.quotes[0].price, Money(210));
    mock.assert_hits_async(2).await;
}

#[tokio::test]
async fn test_ors_without_routes_is_an_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v2/directions/driving-car");
            then.status(200).json_body(serde_json::json!({"routes": []}));
        })
        .await;
    let planner = OrsRoutePlanner::new_with_base_url("k".into(), server.base_url());

    let err = planner
        .plan(&[LatLng::new(60.70, 28.75), LatLng::new(60.73, 28.80)])
        .await
        .unwrap_err();
    assert!(matches!(err, RouteError::NoRoute));
}

#[tokio::test]
async fn test_reverse_geocode_shortens_address() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/reverse")
                .query_param("format", "json")
                .query_param("lat", "60.7076")
                .header_exists("user-agent");
            then.status(200).json_body(serde_json::json!({
                "display_name": "12, Leningradskoye Shosse, Vyborg, Leningrad Oblast, Russia"
            }));
        })
        .await;
    let geocoder = NominatimGeocoder::new_with_base_url(server.base_url());

    let address = geocoder.reverse(LatLng::new(60.7076, 28.7528)).await.unwrap();

    assert_eq!(address, "12, Leningradskoye Shosse, Vyborg");
    mock.assert_async().await;
}
