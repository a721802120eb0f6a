use async_trait::async_trait;
use chart_core::{AssetType, Candle, ChartRequest, MarketDataProvider, Timeframe, TrainerError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://api.polygon.io";
const DEFAULT_RATE_LIMIT: usize = 500;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// Slack added when waiting for a window slot to open
const SLOT_SLACK: Duration = Duration::from_millis(50);
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
/// Attempts made while Polygon keeps answering 429
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(15);

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }
            let Some(&oldest) = ts.front() else {
                ts.push_back(now);
                return;
            };

            // Wait until the oldest request falls out of the window
            let sleep_dur = (oldest + self.window).saturating_duration_since(now) + SLOT_SLACK;
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Polygon ticker for an asset: `X:BTCUSD` for crypto, `C:EURUSD` for forex
pub fn ticker_for(asset: &str, asset_type: AssetType) -> String {
    let symbol: String = asset
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_uppercase();

    match asset_type {
        AssetType::Stock => symbol,
        AssetType::Crypto if symbol.ends_with("USD") && symbol.len() > 3 => format!("X:{}", symbol),
        AssetType::Crypto => format!("X:{}USD", symbol),
        AssetType::Forex if symbol.len() == 3 => format!("C:{}USD", symbol),
        AssetType::Forex => format!("C:{}", symbol),
    }
}

/// Aggregate bar size as (multiplier, timespan)
pub fn aggregate_params(timeframe: Timeframe) -> (u32, &'static str) {
    match timeframe {
        Timeframe::Minute1 => (1, "minute"),
        Timeframe::Minute5 => (5, "minute"),
        Timeframe::Minute15 => (15, "minute"),
        Timeframe::Minute30 => (30, "minute"),
        Timeframe::Hour1 => (1, "hour"),
        Timeframe::Hour4 => (4, "hour"),
        Timeframe::Day1 => (1, "day"),
        Timeframe::Week1 => (1, "week"),
        Timeframe::Month1 => (1, "month"),
    }
}

/// How far back to fetch so a practice chart holds a few hundred candles
pub fn lookback(timeframe: Timeframe) -> ChronoDuration {
    match timeframe {
        Timeframe::Minute1 => ChronoDuration::days(1),
        Timeframe::Minute5 => ChronoDuration::days(3),
        Timeframe::Minute15 => ChronoDuration::days(7),
        Timeframe::Minute30 => ChronoDuration::days(14),
        Timeframe::Hour1 => ChronoDuration::days(30),
        Timeframe::Hour4 => ChronoDuration::days(90),
        Timeframe::Day1 => ChronoDuration::days(365),
        Timeframe::Week1 => ChronoDuration::days(3 * 365),
        Timeframe::Month1 => ChronoDuration::days(10 * 365),
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    retry_backoff: Duration,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Free tier users should set POLYGON_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(rate_limit, RATE_LIMIT_WINDOW),
            retry_backoff: RATE_LIMIT_BACKOFF,
        }
    }

    /// Point the client at another host (proxies, mocks)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Wait between 429 retries
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, TrainerError> {
        let request = builder.build().map_err(|e| TrainerError::Api(e.to_string()))?;

        for attempt in 1..=MAX_RATE_LIMIT_RETRIES {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| TrainerError::Api("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| TrainerError::DataUnavailable(e.to_string()))?;

            if response.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            tracing::warn!(
                "Polygon 429 rate limited, waiting {:.1}s (attempt {}/{})",
                self.retry_backoff.as_secs_f64(),
                attempt,
                MAX_RATE_LIMIT_RETRIES
            );
            if attempt < MAX_RATE_LIMIT_RETRIES {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }

        Err(TrainerError::DataUnavailable(format!(
            "Rate limited by Polygon after {} attempts",
            MAX_RATE_LIMIT_RETRIES
        )))
    }

    /// Get aggregate candles for a Polygon ticker
    pub async fn get_aggregates(
        &self,
        ticker: &str,
        multiplier: u32,
        timespan: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, TrainerError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            self.base_url,
            ticker,
            multiplier,
            timespan,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(TrainerError::Api(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| TrainerError::Api(e.to_string()))?;

        Ok(agg_response.into_candles())
    }
}

#[async_trait]
impl MarketDataProvider for PolygonClient {
    async fn fetch_chart(&self, request: &ChartRequest) -> Result<Vec<Candle>, TrainerError> {
        let ticker = ticker_for(&request.asset, request.asset_type);
        let (multiplier, timespan) = aggregate_params(request.timeframe);
        let to = Utc::now();
        let from = to - lookback(request.timeframe);

        let candles = self.get_aggregates(&ticker, multiplier, timespan, from, to).await?;
        tracing::debug!(ticker = %ticker, timeframe = %request.timeframe, candles = candles.len(), "Fetched aggregates");

        if candles.is_empty() {
            return Err(TrainerError::DataUnavailable(format!(
                "no {} candles for {}",
                request.timeframe, request.asset
            )));
        }
        Ok(candles)
    }
}

#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp (ms)
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
}

impl AggregateResponse {
    /// Candles in strictly increasing time order
    fn into_candles(self) -> Vec<Candle> {
        let mut candles: Vec<Candle> = self
            .results
            .into_iter()
            .map(|r| Candle {
                timestamp: r.t.div_euclid(1000),
                open: r.o,
                high: r.h,
                low: r.l,
                close: r.c,
            })
            .collect();
        candles.sort_by_key(|c| c.timestamp);
        candles.dedup_by_key(|c| c.timestamp);
        candles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_prefixes() {
        assert_eq!(ticker_for("aapl", AssetType::Stock), "AAPL");
        assert_eq!(ticker_for("btc", AssetType::Crypto), "X:BTCUSD");
        assert_eq!(ticker_for("ETHUSD", AssetType::Crypto), "X:ETHUSD");
        assert_eq!(ticker_for("eur/usd", AssetType::Forex), "C:EURUSD");
        assert_eq!(ticker_for("gbp", AssetType::Forex), "C:GBPUSD");
    }

    #[test]
    fn test_aggregate_params() {
        assert_eq!(aggregate_params(Timeframe::Hour4), (4, "hour"));
        assert_eq!(aggregate_params(Timeframe::Minute15), (15, "minute"));
        assert_eq!(aggregate_params(Timeframe::Month1), (1, "month"));
        assert!(lookback(Timeframe::Minute1) < lookback(Timeframe::Day1));
    }

    #[test]
    fn test_aggregate_response_to_candles() {
        let json = r#"{
            "ticker": "X:BTCUSD",
            "results": [
                {"t": 1700003600000, "o": 2.0, "h": 3.0, "l": 1.5, "c": 2.5, "v": 10.0},
                {"t": 1700000000000, "o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5, "v": 12.0},
                {"t": 1700003600000, "o": 2.0, "h": 3.0, "l": 1.5, "c": 2.5, "v": 10.0}
            ]
        }"#;
        let response: AggregateResponse = serde_json::from_str(json).unwrap();
        let candles = response.into_candles();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].timestamp, 1_700_000_000);
        assert_eq!(candles[1].high, 3.0);
        assert!(chart_core::validate_series(&candles).is_ok());
    }

    #[test]
    fn test_missing_results_is_empty() {
        let response: AggregateResponse = serde_json::from_str(r#"{"status": "OK"}"#).unwrap();
        assert!(response.into_candles().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_burst_within_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert_eq!(limiter.timestamps.lock().await.len(), 3);
    }

    #[tokio::test]
    async fn test_persistent_429_gives_up_after_max_retries() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicU32::new(0));
        let served = hits.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                served.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 429 Too Many Requests\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let client = PolygonClient::new("test-key".to_string())
            .with_base_url(format!("http://{}", addr))
            .with_retry_backoff(Duration::ZERO);
        let builder = client.client.get(format!("{}/v2/aggs", client.base_url));
        let err = client.send_request(builder).await.unwrap_err();

        assert!(matches!(err, TrainerError::DataUnavailable(_)));
        assert_eq!(hits.load(Ordering::SeqCst), MAX_RATE_LIMIT_RETRIES);
    }
}
