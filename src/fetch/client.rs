use anyhow::Context;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, Request, Response};

/// Executes HTTP requests for URL payload sources.
///
/// Implementors only provide [`HttpClient::execute`]. Decorators such as
/// [`super::ApiKey`] wrap another client and adjust the request before
/// delegating, so headers they set win over those passed to [`HttpClient::get`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;

    /// GETs `url` with `headers` attached.
    async fn get(&self, url: &str, headers: HeaderMap) -> anyhow::Result<Response> {
        let url = url
            .parse()
            .with_context(|| format!("invalid URL {url:?}"))?;
        let mut req = Request::new(Method::GET, url);
        req.headers_mut().extend(headers);
        Ok(self.execute(req).await?)
    }
}
