//! HTTP broker adapter.
//!
//! Every call runs under a bounded deadline; a deadline miss surfaces as
//! `BrokerError::Unavailable`. There is no transport-level retry here:
//! retry policy belongs to the caller and the recovery loop.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::config::{BrokerConfig, ConfigError};
use crate::domain::{BrokerOrderId, OrderIntent, Quote};

use super::api_types::{BrokerErrorResponse, LatestQuoteResponse, OrderRequest, OrderResponse};
use super::{BrokerAdapter, BrokerError, BrokerOrderView, PlaceAck};

/// REST adapter for the configured broker endpoint.
#[derive(Debug, Clone)]
pub struct HttpBroker {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    write_deadline: Duration,
    read_deadline: Duration,
}

impl HttpBroker {
    /// Build the adapter from broker configuration.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if credentials are missing or the HTTP
    /// client cannot be constructed.
    pub fn new(config: &BrokerConfig) -> Result<Self, ConfigError> {
        if config.api_key.is_empty() {
            return Err(ConfigError::MissingVar("BROKER_API_KEY"));
        }
        if config.api_secret.is_empty() {
            return Err(ConfigError::MissingVar("BROKER_API_SECRET"));
        }

        let client = Client::builder()
            .timeout(config.write_deadline)
            .build()
            .map_err(|_| ConfigError::InvalidValue {
                key: "BROKER_BASE_URL",
                value: config.base_url.clone(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            write_deadline: config.write_deadline,
            read_deadline: config.read_deadline,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Await a broker call under its deadline.
    async fn bounded<T>(
        deadline: Duration,
        fut: impl Future<Output = Result<T, BrokerError>>,
    ) -> Result<T, BrokerError> {
        match tokio::time::timeout(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Unavailable {
                message: format!("deadline of {}ms exceeded", deadline.as_millis()),
            }),
        }
    }

    /// Map a non-success HTTP response to a broker error.
    async fn error_from_response(path: &str, response: reqwest::Response) -> BrokerError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<BrokerErrorResponse> = serde_json::from_str(&body).ok();
        let code = parsed
            .as_ref()
            .and_then(|e| e.code.clone())
            .unwrap_or_else(|| status.as_u16().to_string());
        let message = parsed.map_or(body, |e| e.message);

        match status {
            StatusCode::NOT_FOUND => BrokerError::NotFound {
                order_id: path.to_string(),
            },
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BrokerError::Rejected {
                code: format!("{code}: {message}"),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BrokerError::Unavailable {
                message: format!("authentication failed ({status})"),
            },
            _ => BrokerError::Unavailable {
                message: format!("{status}: {message}"),
            },
        }
    }

    async fn send_get(&self, path: &str) -> Result<reqwest::Response, BrokerError> {
        self.client
            .get(self.url(path))
            .header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.api_secret)
            .send()
            .await
            .map_err(|e| BrokerError::Unavailable {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl BrokerAdapter for HttpBroker {
    async fn place(&self, intent: &OrderIntent) -> Result<PlaceAck, BrokerError> {
        let body = OrderRequest::from_intent(intent);

        tracing::info!(
            intent_id = %intent.intent_id,
            symbol = %intent.symbol,
            side = %intent.side,
            order_type = %intent.order_type,
            qty = %intent.qty,
            "submitting order to broker"
        );

        Self::bounded(self.write_deadline, async {
            let response = self
                .client
                .post(self.url("/v2/orders"))
                .header("APCA-API-KEY-ID", &self.api_key)
                .header("APCA-API-SECRET-KEY", &self.api_secret)
                .json(&body)
                .send()
                .await
                .map_err(|e| BrokerError::Unavailable {
                    message: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(Self::error_from_response("/v2/orders", response).await);
            }

            let order: OrderResponse =
                response
                    .json()
                    .await
                    .map_err(|e| BrokerError::Unavailable {
                        message: format!("malformed place response: {e}"),
                    })?;

            tracing::info!(
                intent_id = %intent.intent_id,
                broker_order_id = %order.id,
                status = %order.status,
                "order submitted"
            );

            Ok(order.to_place_ack())
        })
        .await
    }

    async fn cancel(&self, broker_order_id: &BrokerOrderId) -> Result<(), BrokerError> {
        let path = format!("/v2/orders/{}", broker_order_id.as_str());

        tracing::info!(broker_order_id = %broker_order_id, "canceling broker order");

        Self::bounded(self.write_deadline, async {
            let response = self
                .client
                .delete(self.url(&path))
                .header("APCA-API-KEY-ID", &self.api_key)
                .header("APCA-API-SECRET-KEY", &self.api_secret)
                .send()
                .await
                .map_err(|e| BrokerError::Unavailable {
                    message: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(Self::error_from_response(&path, response).await);
            }
            Ok(())
        })
        .await
    }

    async fn get_order(
        &self,
        broker_order_id: &BrokerOrderId,
    ) -> Result<BrokerOrderView, BrokerError> {
        let path = format!("/v2/orders/{}", broker_order_id.as_str());

        Self::bounded(self.read_deadline, async {
            let response = self.send_get(&path).await?;
            if !response.status().is_success() {
                return Err(Self::error_from_response(&path, response).await);
            }
            let order: OrderResponse =
                response
                    .json()
                    .await
                    .map_err(|e| BrokerError::Unavailable {
                        message: format!("malformed order response: {e}"),
                    })?;
            Ok(order.to_order_view())
        })
        .await
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        let path = format!("/v2/quotes/{symbol}/latest");

        Self::bounded(self.read_deadline, async {
            let response = self.send_get(&path).await?;
            if !response.status().is_success() {
                return Err(Self::error_from_response(&path, response).await);
            }
            let quote: LatestQuoteResponse =
                response
                    .json()
                    .await
                    .map_err(|e| BrokerError::Unavailable {
                        message: format!("malformed quote response: {e}"),
                    })?;
            Ok(quote.to_quote())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::NormalizedStatus;
    use crate::domain::{
        AssetClass, IntentContext, IntentId, OrderSide, OrderType, StrategyId, TenantId,
        TimeInForce, UserId,
    };
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_intent() -> OrderIntent {
        OrderIntent {
            intent_id: IntentId::new("i-1"),
            context: IntentContext {
                tenant_id: TenantId::new("t1"),
                user_id: UserId::new("u1"),
                strategy_id: StrategyId::new("s1"),
            },
            symbol: "AAPL".to_string(),
            side: OrderSide::Buy,
            qty: dec!(10),
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            asset_class: AssetClass::Equity,
            limit_price: None,
            metadata: serde_json::Map::new(),
        }
    }

    fn broker_for(server: &MockServer) -> HttpBroker {
        let config = BrokerConfig {
            base_url: server.uri(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            write_deadline: Duration::from_secs(5),
            read_deadline: Duration::from_secs(2),
        };
        HttpBroker::new(&config).unwrap()
    }

    fn order_body(status: &str, filled_qty: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "o1",
            "client_order_id": "i-1",
            "symbol": "AAPL",
            "qty": "10",
            "filled_qty": filled_qty,
            "filled_avg_price": "150.03",
            "status": status,
            "side": "buy",
        })
    }

    #[test]
    fn missing_credentials_is_config_error() {
        let config = BrokerConfig::default();
        assert!(HttpBroker::new(&config).is_err());
    }

    #[tokio::test]
    async fn place_success_normalizes_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(order_body("accepted", "0")))
            .mount(&server)
            .await;

        let ack = broker_for(&server).place(&test_intent()).await.unwrap();
        assert_eq!(ack.broker_order_id.as_str(), "o1");
        assert_eq!(ack.status_raw, "accepted");
        assert_eq!(ack.status_norm, NormalizedStatus::Accepted);
    }

    #[tokio::test]
    async fn place_rejection_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/orders"))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "code": "40310000",
                "message": "insufficient buying power",
            })))
            .mount(&server)
            .await;

        let err = broker_for(&server).place(&test_intent()).await.unwrap_err();
        assert!(matches!(err, BrokerError::Rejected { .. }));
    }

    #[tokio::test]
    async fn place_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/orders"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = broker_for(&server).place(&test_intent()).await.unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn get_order_parses_cumulative_fill() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orders/o1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(order_body("partially_filled", "4")),
            )
            .mount(&server)
            .await;

        let view = broker_for(&server)
            .get_order(&BrokerOrderId::new("o1"))
            .await
            .unwrap();
        assert_eq!(view.status_norm, NormalizedStatus::PartiallyFilled);
        assert_eq!(view.filled_qty, dec!(4));
        assert_eq!(view.avg_price, Some(dec!(150.03)));
    }

    #[tokio::test]
    async fn get_order_unknown_id_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orders/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = broker_for(&server)
            .get_order(&BrokerOrderId::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v2/orders/o1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        assert!(
            broker_for(&server)
                .cancel(&BrokerOrderId::new("o1"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn quote_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/quotes/AAPL/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "symbol": "AAPL",
                "bid_price": "150.00",
                "ask_price": "150.05",
                "timestamp": "2026-01-04T15:30:00Z",
            })))
            .mount(&server)
            .await;

        let quote = broker_for(&server).get_quote("AAPL").await.unwrap();
        assert_eq!(quote.bid, dec!(150.00));
        assert_eq!(quote.ask, dec!(150.05));
    }

    #[tokio::test]
    async fn deadline_miss_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/orders/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(order_body("accepted", "0"))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let config = BrokerConfig {
            base_url: server.uri(),
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
            write_deadline: Duration::from_secs(5),
            read_deadline: Duration::from_millis(50),
        };
        let broker = HttpBroker::new(&config).unwrap();

        let err = broker
            .get_order(&BrokerOrderId::new("slow"))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable { .. }));
    }
}
