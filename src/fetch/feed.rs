use std::time::Duration;

use reqwest::Url;
use tracing::debug;

use super::auth::ApiKey;
use super::{BasicClient, FetchError, HttpClient, fetch_bytes};
use crate::gtfs_rt::FeedMessage;
use crate::parser::parse_feed;
use crate::vehicle::{VehicleRecord, records_from_feed};

/// The two feeds the agency publishes from one base endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FeedKind {
    VehiclePositions,
    TripUpdates,
}

impl FeedKind {
    fn path_tokens(self) -> [&'static str; 2] {
        match self {
            FeedKind::VehiclePositions => ["vehiclePositions", "VehiclePositions"],
            FeedKind::TripUpdates => ["tripUpdates", "TripUpdates"],
        }
    }

    fn other(self) -> FeedKind {
        match self {
            FeedKind::VehiclePositions => FeedKind::TripUpdates,
            FeedKind::TripUpdates => FeedKind::VehiclePositions,
        }
    }

    /// Derives this feed's URL from `base` by swapping the last occurrence of
    /// the other feed's token in the path for this one. Host and query are
    /// untouched; a path that names neither feed is returned as-is.
    pub fn endpoint(self, base: &Url) -> Url {
        let from = self.other().path_tokens();
        let to = self.path_tokens();

        let path = base.path();
        for (from, to) in from.iter().zip(to.iter()) {
            if let Some(at) = path.rfind(from) {
                let swapped = format!("{}{}{}", &path[..at], to, &path[at + from.len()..]);
                let mut url = base.clone();
                url.set_path(&swapped);
                return url;
            }
        }
        base.clone()
    }
}

/// Fetches and decodes one GTFS-RT endpoint.
pub struct RealtimeFeedClient<C> {
    client: C,
    endpoint: Url,
}

impl RealtimeFeedClient<ApiKey<BasicClient>> {
    /// Client sending `apiKey: <api_key>` with every request, bounded by `timeout`.
    pub fn with_api_key(endpoint: Url, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let basic = BasicClient::with_timeout(timeout)?;
        let client = ApiKey::header(basic, api_key)?;
        Ok(Self::new(client, endpoint))
    }
}

impl<C: HttpClient> RealtimeFeedClient<C> {
    pub fn new(client: C, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetches the endpoint once and decodes the full feed message.
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn fetch_feed(&self) -> Result<FeedMessage, FetchError> {
        let bytes = fetch_bytes(&self.client, &self.endpoint).await?;
        let feed = parse_feed(&bytes)?;
        debug!(entity_count = feed.entity.len(), "Feed parsed successfully");
        Ok(feed)
    }

    /// Fetches the endpoint once and normalizes it into vehicle records.
    ///
    /// Only entities carrying a position with both coordinates are kept.
    pub async fn fetch(&self) -> Result<Vec<VehicleRecord>, FetchError> {
        let feed = self.fetch_feed().await?;
        Ok(records_from_feed(&feed))
    }
}
