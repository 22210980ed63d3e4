use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::Upstream;
use crate::data_source::{
    CapabilitySet, DataSource, Endpoint, HealthStatus, NewsBatch, NewsRequest, NewsScope,
    SourceError, SourceFuture,
};
use crate::http_client::{HttpAuth, HttpClient};
use crate::{NewsItem, ProviderId, Symbol, UtcDateTime};

const BASE_URL: &str = "https://newsapi.org/v2";
const MAX_PAGE_SIZE: usize = 100;

/// NewsAPI.org: market headlines by category and keyword search for companies.
#[derive(Clone)]
pub struct NewsApiAdapter {
    upstream: Upstream,
}

impl Default for NewsApiAdapter {
    fn default() -> Self {
        Self {
            upstream: Upstream::offline(ProviderId::Newsapi),
        }
    }
}

impl NewsApiAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>, api_key: impl Into<String>) -> Self {
        Self {
            upstream: Upstream::new(
                ProviderId::Newsapi,
                http_client,
                HttpAuth::Header {
                    name: String::from("X-Api-Key"),
                    value: api_key.into(),
                },
            ),
        }
    }

    async fn fetch_real_news(&self, req: &NewsRequest) -> Result<NewsBatch, SourceError> {
        let page_size = req.limit.min(MAX_PAGE_SIZE);
        let (url, symbols) = match &req.scope {
            NewsScope::Market { topic } => (
                format!(
                    "{BASE_URL}/top-headlines?category={}&language=en&pageSize={page_size}",
                    urlencoding::encode(topic)
                ),
                Vec::new(),
            ),
            NewsScope::Company { symbol } => (
                format!(
                    "{BASE_URL}/everything?q={}&from={}&to={}&language=en&sortBy=publishedAt&pageSize={page_size}",
                    urlencoding::encode(symbol.as_str()),
                    req.from.format_date(),
                    req.to.format_date()
                ),
                vec![symbol.clone()],
            ),
        };

        let response: ArticlesResponse = self.upstream.get_json(&url).await?;
        if response.status == "error" {
            let message = response.message.unwrap_or_default();
            return Err(match response.code.as_deref() {
                Some("rateLimited") => SourceError::rate_limited(format!("newsapi: {message}")),
                _ => SourceError::unavailable(format!("newsapi: {message}")),
            });
        }

        let mut items = response
            .articles
            .into_iter()
            .filter_map(|article| normalize_article(article, &symbols))
            .filter(|item| item.published_at >= req.from && item.published_at <= req.to)
            .collect::<Vec<_>>();
        items.sort_by(|left, right| right.published_at.cmp(&left.published_at));
        items.truncate(req.limit);
        Ok(NewsBatch { items })
    }

    fn mock_news(req: &NewsRequest) -> NewsBatch {
        let (headlines, symbols, slug): (Vec<String>, Vec<Symbol>, String) = match &req.scope {
            NewsScope::Market { topic } => (
                vec![
                    String::from("Stocks rally as inflation cools for a second month"),
                    String::from("Oil prices drop amid weak demand concern"),
                    String::from("Central bank holds rates steady ahead of data"),
                    String::from("Treasury yields rise after strong jobs report"),
                ],
                Vec::new(),
                topic.to_ascii_lowercase(),
            ),
            NewsScope::Company { symbol } => (
                vec![
                    format!("{symbol} outlook: growth expected to exceed guidance"),
                    format!("Investors weigh valuation worry around {symbol}"),
                ],
                vec![symbol.clone()],
                symbol.as_str().to_ascii_lowercase(),
            ),
        };

        let items = headlines
            .into_iter()
            .enumerate()
            .take(req.limit)
            .map(|(index, headline)| {
                let hours = i64::try_from(index * 4 + 2).unwrap_or(i64::MAX);
                let published_at = req
                    .to
                    .checked_sub(time::Duration::hours(hours))
                    .unwrap_or(req.to)
                    .max(req.from);
                NewsItem::new(headline, "NewsAPI Digest", published_at, ProviderId::Newsapi)
                    .with_url(Some(format!("https://newsapi.example.com/{slug}/{}", index + 1)))
                    .with_symbols(symbols.clone())
            })
            .collect();
        NewsBatch { items }
    }
}

impl DataSource for NewsApiAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Newsapi
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::none().with(Endpoint::News)
    }

    fn freshness(&self) -> Duration {
        Duration::from_secs(15 * 60)
    }

    fn news<'a>(&'a self, req: NewsRequest) -> SourceFuture<'a, NewsBatch> {
        Box::pin(async move {
            if self.upstream.is_live() {
                self.fetch_real_news(&req).await
            } else {
                Ok(Self::mock_news(&req))
            }
        })
    }

    fn health<'a>(&'a self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + 'a>> {
        Box::pin(async move { self.upstream.health() })
    }
}

/// Removed articles and unparseable timestamps are dropped.
fn normalize_article(article: Article, symbols: &[Symbol]) -> Option<NewsItem> {
    let headline = article.title?.trim().to_owned();
    if headline.is_empty() || headline == "[Removed]" {
        return None;
    }
    let published_at = UtcDateTime::parse(&article.published_at).ok()?;
    Some(
        NewsItem::new(headline, article.source.name.unwrap_or_default(), published_at, ProviderId::Newsapi)
            .with_summary(article.description)
            .with_url(article.url)
            .with_symbols(symbols.to_vec()),
    )
}

#[derive(Debug, Deserialize)]
struct ArticlesResponse {
    status: String,
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    #[serde(default)]
    source: ArticleSource,
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: String,
}

#[derive(Debug, Default, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}
