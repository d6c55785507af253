use helios::tibber::queries;
use helios::tibber::types::{
    ConsumptionResponse, HomeFeaturesResponse, HomesResponse, PriceInfoResponse, PriceLevel,
    PushResponse,
};

#[test]
fn homes_response_decodes_with_subscription_endpoint() {
    let body = r#"{
      "viewer": {
        "homes": [
          {
            "id": "home-1",
            "timeZone": "Europe/Oslo",
            "address": {"address1": "Storgata 1", "postalCode": "0155", "city": "Oslo"},
            "features": {"realTimeConsumptionEnabled": true},
            "currentSubscription": {"status": "running"}
          },
          {
            "id": "home-2",
            "timeZone": "Europe/Stockholm",
            "address": null,
            "features": null,
            "currentSubscription": null
          }
        ],
        "websocketSubscriptionUrl": "wss://websocket-api.tibber.com/v1-beta/gql/subscriptions"
      }
    }"#;

    let response: HomesResponse = serde_json::from_str(body).unwrap();
    assert_eq!(response.viewer.homes.len(), 2);
    assert!(response.viewer.homes[0].has_real_time_consumption());
    assert!(!response.viewer.homes[1].has_real_time_consumption());
    assert!(
        response
            .viewer
            .websocket_subscription_url
            .unwrap()
            .starts_with("wss://")
    );
}

#[test]
fn home_features_response_tolerates_missing_home() {
    let body = r#"{"viewer": {"home": null, "websocketSubscriptionUrl": "wss://example"}}"#;
    let response: HomeFeaturesResponse = serde_json::from_str(body).unwrap();
    assert!(response.viewer.home.is_none());
    assert_eq!(
        response.viewer.websocket_subscription_url.as_deref(),
        Some("wss://example")
    );
}

#[test]
fn price_response_decodes_today_and_tomorrow() {
    let body = r#"{
      "viewer": {
        "home": {
          "currentSubscription": {
            "priceInfo": {
              "today": [
                {"total": 0.4612, "energy": 0.3239, "tax": 0.1373, "startsAt": "2023-02-01T00:00:00+01:00", "level": "CHEAP"}
              ],
              "tomorrow": [
                {"total": 0.5421, "energy": 0.3901, "tax": 0.1520, "startsAt": "2023-02-02T00:00:00+01:00", "level": "NORMAL"}
              ]
            }
          }
        }
      }
    }"#;

    let response: PriceInfoResponse = serde_json::from_str(body).unwrap();
    let info = response.into_price_info();
    assert_eq!(info.today.len(), 1);
    assert_eq!(info.tomorrow.len(), 1);
    assert_eq!(info.today[0].level, PriceLevel::Cheap);
    assert!(info.today[0].starts_at < info.tomorrow[0].starts_at);
}

#[test]
fn consumption_response_decodes_nodes() {
    let body = r#"{
      "viewer": {
        "home": {
          "daily": {"nodes": [
            {"from": "2023-01-31T00:00:00+01:00", "to": "2023-02-01T00:00:00+01:00",
             "totalCost": 12.33, "unitCost": 11.21, "unitPrice": 0.54, "consumption": 20.5}
          ]},
          "hourly": {"nodes": [
            {"from": "2023-01-31T22:00:00+01:00", "to": "2023-01-31T23:00:00+01:00",
             "totalCost": 0.55, "consumption": 1.1}
          ]}
        }
      }
    }"#;

    let response: ConsumptionResponse = serde_json::from_str(body).unwrap();
    let data = response.viewer.home.unwrap();
    let daily = data.daily.unwrap();
    assert_eq!(daily.nodes.len(), 1);
    assert_eq!(daily.nodes[0].consumption, Some(20.5));
    assert_eq!(daily.nodes[0].unit_price, Some(0.54));

    let hourly = data.hourly.unwrap();
    assert_eq!(hourly.nodes[0].unit_cost, None);
}

#[test]
fn push_response_decodes_device_count() {
    let body = r#"{"sendPushNotification": {"successful": true, "pushedToNumberOfDevices": 3}}"#;
    let response: PushResponse = serde_json::from_str(body).unwrap();
    assert!(response.send_push_notification.successful);
    assert_eq!(response.send_push_notification.pushed_to_number_of_devices, 3);
}

#[test]
fn query_documents_are_self_consistent() {
    // The price query asks for exactly the fields PriceEntry decodes
    let query = queries::price_query("home-1");
    for field in ["total", "energy", "tax", "startsAt", "level"] {
        assert!(query.contains(field), "missing field {}", field);
    }

    // The subscription asks for the fields LiveMeasurement decodes
    let subscription = queries::live_measurement_subscription("home-1");
    for field in [
        "timestamp",
        "power",
        "powerProduction",
        "accumulatedConsumption",
        "accumulatedProduction",
        "accumulatedCost",
        "accumulatedReward",
        "currentL1",
        "currentL2",
        "currentL3",
        "lastMeterConsumption",
        "lastMeterProduction",
    ] {
        assert!(subscription.contains(field), "missing field {}", field);
    }
}
