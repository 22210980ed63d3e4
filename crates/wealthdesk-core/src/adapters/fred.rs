use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{parse_number, validation_to_error, Upstream};
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HealthStatus, IndicatorRequest, SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::{EconomicIndicator, ProviderId, UtcDateTime};

const OBSERVATIONS_URL: &str = "https://api.stlouisfed.org/fred/series/observations";

/// FRED revisions can leave the newest rows empty (`"."`); look back a few rows.
const OBSERVATION_WINDOW: usize = 5;

/// Federal Reserve Economic Data: latest observation of a series.
#[derive(Clone)]
pub struct FredAdapter {
    upstream: Upstream,
}

impl Default for FredAdapter {
    fn default() -> Self {
        Self {
            upstream: Upstream::offline(ProviderId::Fred),
        }
    }
}

impl FredAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            upstream: Upstream::new(
                ProviderId::Fred,
                http_client,
                HttpAuth::QueryParam {
                    name: String::from("api_key"),
                    value: api_key.into(),
                },
            ),
        }
    }

    async fn fetch_real_indicator(&self, req: &IndicatorRequest) -> Result<EconomicIndicator, SourceError> {
        let url = format!(
            "{OBSERVATIONS_URL}?series_id={}&file_type=json&sort_order=desc&limit={OBSERVATION_WINDOW}",
            urlencoding::encode(&req.series_id)
        );
        let response: ObservationsResponse = self.upstream.get_json(&url).await?;

        let (date, value) = response
            .observations
            .iter()
            .find_map(|row| parse_number(&row.value).map(|value| (row.date.as_str(), value)))
            .ok_or_else(|| {
                SourceError::not_found(format!("fred has no recent observation for {}", req.series_id))
            })?;

        let observation_date = UtcDateTime::parse_date(date).map_err(validation_to_error)?;
        let indicator = EconomicIndicator::new(&req.series_id, value, observation_date, ProviderId::Fred)
            .map_err(validation_to_error)?;
        Ok(match response.units {
            Some(units) => indicator.with_units(units),
            None => indicator,
        })
    }

    fn mock_indicator(req: &IndicatorRequest) -> Result<EconomicIndicator, SourceError> {
        let (value, units, date) = match req.series_id.as_str() {
            "CPIAUCSL" => (313.2, "Index 1982-1984=100", "2024-05-01"),
            "CPILFESL" => (318.1, "Index 1982-1984=100", "2024-05-01"),
            "UNRATE" => (4.0, "Percent", "2024-05-01"),
            "GDP" => (28_269.2, "Billions of Dollars", "2024-01-01"),
            "FEDFUNDS" => (5.33, "Percent", "2024-05-01"),
            "GS10" => (4.48, "Percent", "2024-05-01"),
            "PCEPI" => (122.3, "Index 2017=100", "2024-04-01"),
            _ => {
                return Err(SourceError::not_found(format!(
                    "series {} is not available offline",
                    req.series_id
                )))
            }
        };
        let observation_date = UtcDateTime::parse_date(date).map_err(validation_to_error)?;
        EconomicIndicator::new(&req.series_id, value, observation_date, ProviderId::Fred)
            .map(|indicator| indicator.with_units(units))
            .map_err(validation_to_error)
    }
}

impl DataSource for FredAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Fred
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::Indicator)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(86_400)
    }

    fn indicator<'a>(&'a self, req: IndicatorRequest) -> SourceFuture<'a, EconomicIndicator> {
        Box::pin(async move {
            if self.upstream.is_live() {
                self.fetch_real_indicator(&req).await
            } else {
                Self::mock_indicator(&req)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    units: Option<String>,
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpFuture, HttpRequest, HttpResponse};

    struct CannedClient(String);

    impl HttpClient for CannedClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            assert!(request.url.contains("series_id=UNRATE"));
            assert!(request.url.ends_with("&api_key=fred-key"));
            let body = self.0.clone();
            Box::pin(async move { Ok(HttpResponse::ok_json(body)) })
        }
    }

    #[tokio::test]
    async fn skips_missing_observations() {
        let body = r#"{
            "units": "Percent",
            "observations": [
                {"date": "2024-06-01", "value": "."},
                {"date": "2024-05-01", "value": "4.0"},
                {"date": "2024-04-01", "value": "3.9"}
            ]
        }"#;
        let adapter = FredAdapter::with_http_client(Arc::new(CannedClient(body.to_owned())), "fred-key");

        let indicator = adapter
            .indicator(IndicatorRequest::new("unrate").expect("request"))
            .await
            .expect("indicator");

        assert_eq!(indicator.value, 4.0);
        assert_eq!(indicator.title, "Unemployment Rate");
        assert_eq!(indicator.units.as_deref(), Some("Percent"));
        assert_eq!(
            indicator.observation_date,
            UtcDateTime::parse_date("2024-05-01").expect("date")
        );
    }

    #[tokio::test]
    async fn offline_unknown_series_is_not_found() {
        let error = FredAdapter::default()
            .indicator(IndicatorRequest::new("NOPE").expect("request"))
            .await
            .expect_err("unknown series");

        assert_eq!(error.code(), "source.not_found");
    }

    #[tokio::test]
    async fn offline_default_series_are_served() {
        let adapter = FredAdapter::default();
        for series in ["CPIAUCSL", "UNRATE", "GDP", "FEDFUNDS", "GS10"] {
            let indicator = adapter
                .indicator(IndicatorRequest::new(series).expect("request"))
                .await
                .expect("indicator");
            assert_eq!(indicator.series_id, series);
        }
    }
}
