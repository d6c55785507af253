//! GraphQL query documents for the Tibber API
//!
//! Documents are built as plain strings; variables that originate from user
//! input are escaped before interpolation.

/// Escape a value for embedding inside a double-quoted GraphQL string
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Homes listing with metadata, features, and the subscription endpoint
pub fn homes_query() -> String {
    r#"{
      viewer {
        homes {
          id
          timeZone
          address {
            address1
            postalCode
            city
          }
          features {
            realTimeConsumptionEnabled
          }
          currentSubscription {
            status
          }
        }
        websocketSubscriptionUrl
      }
    }"#
    .to_string()
}

/// Features of a single home plus the current subscription endpoint.
/// Fetched before every (re)subscribe; the endpoint is not stable.
pub fn home_features_query(home_id: &str) -> String {
    format!(
        r#"{{
      viewer {{
        home(id:"{}") {{
          id
          features {{
            realTimeConsumptionEnabled
          }}
        }}
        websocketSubscriptionUrl
      }}
    }}"#,
        escape(home_id)
    )
}

/// Today's and tomorrow's hourly prices for a home
pub fn price_query(home_id: &str) -> String {
    format!(
        r#"{{
      viewer {{
        home(id:"{}") {{
          currentSubscription {{
            priceInfo {{
              today {{
                total
                energy
                tax
                startsAt
                level
              }}
              tomorrow {{
                total
                energy
                tax
                startsAt
                level
              }}
            }}
          }}
        }}
      }}
    }}"#,
        escape(home_id)
    )
}

/// Daily and hourly consumption history for a home
pub fn consumption_query(home_id: &str, days_to_fetch: u32, hours_to_fetch: u32) -> String {
    format!(
        r#"{{
      viewer {{
        home(id:"{}") {{
          daily: consumption(resolution: DAILY, last: {}) {{
            nodes {{
              from
              to
              totalCost
              unitCost
              unitPrice
              consumption
            }}
          }},
          hourly: consumption(resolution: HOURLY, last: {}) {{
            nodes {{
              from
              to
              totalCost
              consumption
            }}
          }}
        }}
      }}
    }}"#,
        escape(home_id),
        days_to_fetch,
        hours_to_fetch
    )
}

/// Push-notification mutation
pub fn push_notification_mutation(title: &str, message: &str) -> String {
    format!(
        r#"mutation{{
      sendPushNotification(input: {{
        title: "{}",
        message: "{}",
        screenToOpen: CONSUMPTION
      }}){{
        successful
        pushedToNumberOfDevices
      }}
    }}"#,
        escape(title),
        escape(message)
    )
}

/// Live measurement subscription for a home
pub fn live_measurement_subscription(home_id: &str) -> String {
    format!(
        r#"subscription{{
      liveMeasurement(homeId:"{}"){{
        timestamp
        power
        powerProduction
        minPower
        averagePower
        maxPower
        accumulatedConsumption
        accumulatedProduction
        accumulatedCost
        accumulatedReward
        currency
        currentL1
        currentL2
        currentL3
        lastMeterConsumption
        lastMeterProduction
      }}
    }}"#,
        escape(home_id)
    )
}
