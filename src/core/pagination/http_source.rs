use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::core::config::{DownloadConfig, RetryConfig};
use crate::core::downloader::client::check_status;
use crate::core::error::LauncherResult;
use crate::core::retry::with_retry;

use super::fetcher::PageSource;

/// `{ "data": [...] }`
#[derive(Debug, Deserialize)]
struct PageEnvelope<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Paginated JSON endpoint taking `index` and `pageSize` query parameters.
pub struct HttpPageSource<T> {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
    download: DownloadConfig,
    retry: RetryConfig,
    _item: PhantomData<fn() -> T>,
}

impl<T> HttpPageSource<T> {
    /// `download` decides which statuses mean the listing does not exist.
    pub fn new(client: Client, url: impl Into<String>, download: &DownloadConfig, retry: RetryConfig) -> Self {
        Self {
            client,
            url: url.into(),
            headers: Vec::new(),
            download: download.clone(),
            retry,
            _item: PhantomData,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    async fn request(&self, index: usize, page_size: usize) -> LauncherResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut request = self.client.get(&self.url).query(&[
            ("index", index.to_string()),
            ("pageSize", page_size.to_string()),
        ]);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = check_status(&self.url, request.send().await?, &self.download)?;
        let envelope: PageEnvelope<T> = response.json().await?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl<T> PageSource for HttpPageSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    type Item = T;

    async fn fetch_page(&self, index: usize, page_size: usize) -> LauncherResult<Vec<T>> {
        with_retry("pagination", &self.retry, move || self.request(index, page_size)).await
    }
}
