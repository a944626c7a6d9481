use futures::future::{FutureExt, LocalBoxFuture};
use timeline::{FetchError, HttpResponse, HttpTransport};

/// Blocking-free HTTP transport over reqwest. The API key, when present, is
/// sent as a bearer token.
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        ReqwestTransport {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, path_and_query: &str) -> LocalBoxFuture<'static, Result<HttpResponse, FetchError>> {
        let url = format!("{}{}", self.base_url, path_and_query);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        async move {
            log::debug!("GET {url}");
            let response = request
                .send()
                .await
                .map_err(|error| FetchError::Network(error.to_string()))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| FetchError::Network(error.to_string()))?;
            Ok(HttpResponse { status, body })
        }
        .boxed_local()
    }
}
