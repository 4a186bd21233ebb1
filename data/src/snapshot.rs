//! Depth snapshot model and the external REST fetch seams.

use crate::error::DataError;
use arara_integration::de::{de_price, de_quantity};
use arara_integration::time::now_epoch_ms;
use arara_markets::{Instrument, Price, ProductType, Quantity};
use async_trait::async_trait;
use serde::Deserialize;

/// Point-in-time full book image used to bootstrap incremental replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<(Price, Quantity)>,
    pub asks: Vec<(Price, Quantity)>,
    /// Server output time of the snapshot, unix epoch milliseconds.
    pub message_output_time: u64,
}

/// External REST depth snapshot source.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    async fn get_depth_snapshot(
        &self,
        instrument: &Instrument,
        limit: u32,
    ) -> Result<DepthSnapshot, DataError>;
}

/// External rotating-token issuer for listen-key style private streams.
#[async_trait]
pub trait AuthTokenIssuer: Send + Sync {
    async fn create_listen_key(&self, product: ProductType) -> Result<String, DataError>;
}

/// Binance spot HTTP depth snapshot url.
pub const HTTP_DEPTH_SNAPSHOT_URL_SPOT: &str = "https://api.binance.com/api/v3/depth";

/// Binance USD-margined futures HTTP depth snapshot url.
pub const HTTP_DEPTH_SNAPSHOT_URL_FUTURES: &str = "https://fapi.binance.com/fapi/v1/depth";

#[derive(Debug, Deserialize)]
struct RawDepthLevel(
    #[serde(deserialize_with = "de_price")] Price,
    #[serde(deserialize_with = "de_quantity")] Quantity,
);

#[derive(Debug, Deserialize)]
struct RawDepthSnapshot {
    #[serde(alias = "lastUpdateId")]
    last_update_id: u64,
    /// Futures endpoints carry the event output time; spot does not.
    #[serde(alias = "E", default)]
    event_time: Option<u64>,
    bids: Vec<RawDepthLevel>,
    asks: Vec<RawDepthLevel>,
}

/// Default [`SnapshotFetcher`] over the venue REST depth endpoints.
#[derive(Debug, Default)]
pub struct HttpSnapshotFetcher {
    client: reqwest::Client,
}

impl HttpSnapshotFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn endpoint(product: ProductType) -> &'static str {
        match product {
            ProductType::Spot => HTTP_DEPTH_SNAPSHOT_URL_SPOT,
            ProductType::PerpetualFuture => HTTP_DEPTH_SNAPSHOT_URL_FUTURES,
        }
    }
}

#[async_trait]
impl SnapshotFetcher for HttpSnapshotFetcher {
    async fn get_depth_snapshot(
        &self,
        instrument: &Instrument,
        limit: u32,
    ) -> Result<DepthSnapshot, DataError> {
        let url = format!(
            "{}?symbol={}&limit={}",
            Self::endpoint(instrument.product),
            instrument.symbol,
            limit,
        );

        let raw = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(arara_integration::SocketError::Http)?
            .error_for_status()
            .map_err(arara_integration::SocketError::Http)?
            .json::<RawDepthSnapshot>()
            .await
            .map_err(arara_integration::SocketError::Http)?;

        Ok(DepthSnapshot {
            last_update_id: raw.last_update_id,
            bids: raw.bids.into_iter().map(|level| (level.0, level.1)).collect(),
            asks: raw.asks.into_iter().map(|level| (level.0, level.1)).collect(),
            message_output_time: raw.event_time.unwrap_or_else(now_epoch_ms),
        })
    }
}
