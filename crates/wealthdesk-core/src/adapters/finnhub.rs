use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::{validation_to_error, Upstream};
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HealthStatus, NewsBatch, NewsRequest, NewsScope,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::{NewsItem, ProviderId, Symbol, UtcDateTime};

const COMPANY_NEWS_URL: &str = "https://finnhub.io/api/v1/company-news";

/// Finnhub company news.
#[derive(Clone)]
pub struct FinnhubAdapter {
    upstream: Upstream,
}

impl Default for FinnhubAdapter {
    fn default() -> Self {
        Self {
            upstream: Upstream::offline(ProviderId::Finnhub),
        }
    }
}

impl FinnhubAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            upstream: Upstream::new(
                ProviderId::Finnhub,
                http_client,
                HttpAuth::Header {
                    name: String::from("X-Finnhub-Token"),
                    value: api_key.into(),
                },
            ),
        }
    }

    async fn fetch_real_news(&self, symbol: &Symbol, req: &NewsRequest) -> Result<NewsBatch, SourceError> {
        let url = format!(
            "{COMPANY_NEWS_URL}?symbol={}&from={}&to={}",
            urlencoding::encode(symbol.as_str()),
            req.from.format_date(),
            req.to.format_date()
        );
        let articles: Vec<Article> = self.upstream.get_json(&url).await?;

        let mut items = articles
            .into_iter()
            .filter_map(|article| normalize_article(symbol, article))
            .filter(|item| item.published_at >= req.from && item.published_at <= req.to)
            .collect::<Vec<_>>();
        items.sort_by(|left, right| right.published_at.cmp(&left.published_at));
        items.truncate(req.limit);
        Ok(NewsBatch { items })
    }

    fn mock_news(symbol: &Symbol, req: &NewsRequest) -> Result<NewsBatch, SourceError> {
        let headlines = [
            format!("{symbol} shares rally after earnings beat estimates"),
            format!("Analysts flag supply chain risk for {symbol}"),
            format!("{symbol} schedules annual shareholder meeting"),
        ];
        let items = headlines
            .into_iter()
            .enumerate()
            .take(req.limit)
            .map(|(index, headline)| {
                let hours = i64::try_from(index * 6 + 1).unwrap_or(i64::MAX);
                let published_at = req
                    .to
                    .checked_sub(time::Duration::hours(hours))
                    .unwrap_or(req.to)
                    .max(req.from);
                let url = format!(
                    "https://news.example.com/{}/{}",
                    symbol.as_str().to_ascii_lowercase(),
                    index + 1
                );
                NewsItem::new(headline, "Finnhub Wire", published_at, ProviderId::Finnhub)
                    .with_url(Some(url))
                    .with_symbols(vec![symbol.clone()])
            })
            .collect();
        Ok(NewsBatch { items })
    }
}

impl DataSource for FinnhubAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Finnhub
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::News)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(15 * 60)
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, NewsBatch> {
        Box::pin(async move {
            let NewsScope::Company { symbol } = &req.scope else {
                return Err(SourceError::invalid_request("finnhub serves company news only"));
            };
            if self.upstream.is_live() {
                self.fetch_real_news(symbol, &req).await
            } else {
                Self::mock_news(symbol, &req)
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Articles without a headline or a valid timestamp are dropped.
fn normalize_article(symbol: &Symbol, article: Article) -> Option<NewsItem> {
    if article.headline.trim().is_empty() {
        return None;
    }
    let published_at = UtcDateTime::from_unix_seconds(article.datetime)
        .map_err(validation_to_error)
        .ok()?;
    Some(
        NewsItem::new(article.headline.trim(), article.source, published_at, ProviderId::Finnhub)
            .with_summary(article.summary)
            .with_url(article.url)
            .with_symbols(vec![symbol.clone()]),
    )
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    source: String,
    summary: Option<String>,
    url: Option<String>,
    datetime: i64,
}
