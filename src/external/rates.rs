//! Exchange-rate providers.

use super::{RateError, RateProvider};
use crate::domain::Currency;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed USD/IDR rate.
#[derive(Debug, Clone, Copy)]
pub struct StaticRates {
    pub usd_idr: f64,
}

impl StaticRates {
    pub fn new(usd_idr: f64) -> Self {
        Self { usd_idr }
    }

    pub fn rate(&self, from: Currency, to: Currency) -> f64 {
        match (from, to) {
            (Currency::Usd, Currency::Idr) => self.usd_idr,
            (Currency::Idr, Currency::Usd) => 1.0 / self.usd_idr,
            _ => 1.0,
        }
    }
}

#[async_trait]
impl RateProvider for StaticRates {
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<f64, RateError> {
        Ok(self.rate(from, to))
    }
}

#[derive(Debug, Deserialize)]
struct LatestRatesResponse {
    rates: HashMap<String, f64>,
}

/// Fetches `{base_url}/latest/{FROM}` (`{"rates": {"IDR": 15500.0, ...}}`),
/// falling back to a static rate when the service is unreachable.
#[derive(Debug, Clone)]
pub struct HttpRateProvider {
    client: Client,
    base_url: String,
    fallback: StaticRates,
    max_elapsed: Duration,
}

impl HttpRateProvider {
    pub fn new(base_url: String, fallback: StaticRates) -> Self {
        Self {
            client: Client::new(),
            base_url,
            fallback,
            max_elapsed: Duration::from_secs(10),
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn fetch(&self, from: Currency, to: Currency) -> Result<f64, RateError> {
        let url = format!("{}/latest/{}", self.base_url.trim_end_matches('/'), from);
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let body: LatestRatesResponse = retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(RateError::Unavailable(e.to_string())))?;

            let status = response.status();
            if status == 429 || status.is_server_error() {
                return Err(backoff::Error::transient(RateError::Unavailable(format!(
                    "HTTP {}",
                    status
                ))));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(RateError::Unavailable(format!(
                    "HTTP {}",
                    status
                ))));
            }

            response
                .json::<LatestRatesResponse>()
                .await
                .map_err(|e| backoff::Error::permanent(RateError::Unavailable(e.to_string())))
        })
        .await?;

        body.rates
            .get(to.as_str())
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or(RateError::Missing { from, to })
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    async fn get_rate(&self, from: Currency, to: Currency) -> Result<f64, RateError> {
        if from == to {
            return Ok(1.0);
        }
        match self.fetch(from, to).await {
            Ok(rate) => {
                debug!(%from, %to, rate, "fetched exchange rate");
                Ok(rate)
            }
            Err(e) => {
                let rate = self.fallback.rate(from, to);
                warn!(%from, %to, error = %e, fallback = rate, "using static fallback rate");
                Ok(rate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_rates() {
        let rates = StaticRates::new(16000.0);
        assert_eq!(rates.get_rate(Currency::Usd, Currency::Idr).await.unwrap(), 16000.0);
        assert_eq!(rates.get_rate(Currency::Idr, Currency::Idr).await.unwrap(), 1.0);
        let back = rates.get_rate(Currency::Idr, Currency::Usd).await.unwrap();
        assert!((back * 16000.0 - 1.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_http_provider_falls_back_when_unreachable() {
        let provider =
            HttpRateProvider::new("http://127.0.0.1:9".to_string(), StaticRates::new(15500.0))
                .with_max_elapsed(Duration::from_millis(50));
        let rate = provider.get_rate(Currency::Usd, Currency::Idr).await.unwrap();
        assert_eq!(rate, 15500.0);
    }

    #[test]
    fn test_parse_latest_response() {
        let body: LatestRatesResponse =
            serde_json::from_str(r#"{"base":"USD","rates":{"IDR":15650.5,"EUR":0.92}}"#).unwrap();
        assert_eq!(body.rates.get("IDR").copied(), Some(15650.5));
    }
}
