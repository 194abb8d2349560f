//! HTTP gateway implementation
//!
//! Implements the TripGateway trait against the trip server's REST API with
//! bearer authentication.

use async_trait::async_trait;
use itinerary::{ItemId, ItemPatch, ItineraryItem, NewItineraryItem, OrderChange};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

use super::{GatewayError, TripGateway};
use crate::chat::ChatMessage;
use crate::config::ServerConfig;
use crate::trip::{Trip, TripId, User};

/// Body of the batch order endpoint
#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    items: &'a [OrderChange],
}

/// Trip server client
pub struct HttpGateway {
    config: ServerConfig,
    token: String,
    http: Client,
}

impl HttpGateway {
    /// Create a client for the given server with an explicit token
    pub fn new(config: ServerConfig, token: impl Into<String>) -> Result<Self, GatewayError> {
        debug!(base_url = %config.base_url, "new: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(GatewayError::Network)?;

        Ok(Self {
            config,
            token: token.into(),
            http,
        })
    }

    /// Create a client reading the token from the configured environment variable
    pub fn from_config(config: &ServerConfig) -> eyre::Result<Self> {
        let token = config.token()?;
        Ok(Self::new(config.clone(), token)?)
    }

    fn url(&self, path: &str) -> String {
        self.config.api_url(path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.token))
    }

    /// Send once; non-2xx answers become [`GatewayError::Http`]
    async fn send(&self, request: RequestBuilder) -> Result<Response, GatewayError> {
        let response = self.authorized(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "send: API error");
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// GET with retry on transient errors
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = self.url(path);
        debug!(%url, "get_json: called");

        let mut last_error = None;
        for attempt in 0..=self.config.fetch_retries {
            if attempt > 0 {
                let backoff = self.config.retry_backoff_ms(attempt);
                warn!(attempt, backoff_ms = backoff, %url, "get_json: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match self.send(self.http.get(url.clone())).await {
                Ok(response) => {
                    let body = response.text().await?;
                    return serde_json::from_str(&body).map_err(GatewayError::from);
                }
                Err(e) if e.is_retryable() && attempt < self.config.fetch_retries => {
                    debug!(attempt, error = %e, "get_json: retryable error");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| GatewayError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl TripGateway for HttpGateway {
    async fn fetch_trip(&self, trip_id: TripId) -> Result<Trip, GatewayError> {
        debug!(%trip_id, "fetch_trip: called");
        self.get_json(&format!("/trips/{}", trip_id)).await
    }

    async fn fetch_chats(&self, trip_id: TripId) -> Result<Vec<ChatMessage>, GatewayError> {
        debug!(%trip_id, "fetch_chats: called");
        self.get_json(&format!("/trips/{}/chats", trip_id)).await
    }

    async fn fetch_me(&self) -> Result<User, GatewayError> {
        debug!("fetch_me: called");
        self.get_json("/users/me").await
    }

    async fn submit_order(&self, trip_id: TripId, changes: &[OrderChange]) -> Result<(), GatewayError> {
        debug!(%trip_id, count = changes.len(), "submit_order: called");
        let url = self.url(&format!("/trips/{}/itinerary/order", trip_id));
        self.send(self.http.put(url).json(&OrderBody { items: changes }))
            .await?;
        Ok(())
    }

    async fn create_item(&self, trip_id: TripId, item: &NewItineraryItem) -> Result<ItineraryItem, GatewayError> {
        debug!(%trip_id, day = item.day, "create_item: called");
        let url = self.url(&format!("/trips/{}/itinerary-items/", trip_id));
        let response = self.send(self.http.post(url).json(item)).await?;
        Ok(response.json().await?)
    }

    async fn update_item(
        &self,
        trip_id: TripId,
        item_id: ItemId,
        patch: &ItemPatch,
    ) -> Result<ItineraryItem, GatewayError> {
        debug!(%trip_id, %item_id, "update_item: called");
        let url = self.url(&format!("/trips/{}/itinerary-items/{}", trip_id, item_id));
        let response = self.send(self.http.put(url).json(patch)).await?;
        Ok(response.json().await?)
    }

    async fn delete_item(&self, trip_id: TripId, item_id: ItemId) -> Result<(), GatewayError> {
        debug!(%trip_id, %item_id, "delete_item: called");
        let url = self.url(&format!("/trips/{}/itinerary-items/{}", trip_id, item_id));
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}
