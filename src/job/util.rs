use std::{num::NonZeroU32, sync::Arc};

use bytes::Bytes;
use governor::{
    Quota, RateLimiter, clock,
    middleware::NoOpMiddleware,
    state::{InMemoryState, NotKeyed},
};
use reqwest::IntoUrl;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Thin wrapper around `reqwest::Client` shared by all fetchers.
///
/// Deliberately carries no retry layer: a failed cycle is retried wholesale
/// at the job's next scheduled tick.
#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
    limiter: Option<Arc<RateLimiter<NotKeyed, InMemoryState, clock::DefaultClock, NoOpMiddleware>>>,
    bearer: Option<String>,
}

#[derive(Error, Debug)]
pub enum JsonDecodeError {
    #[error("Network error while decoding JSON {0}")]
    NetworkError(#[from] GetError),
    #[error("Decoding error while decoding JSON {0}")]
    DecodeError(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum GetError {
    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
}

pub enum RequestType {
    Get,
    Post(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl Client {
    pub fn new() -> Self {
        Client {
            client: reqwest::Client::new(),
            limiter: None,
            bearer: None,
        }
    }

    pub fn with_limit(mut self, requests_per_second: NonZeroU32) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(Quota::per_second(
            requests_per_second,
        ))));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub async fn get<U: IntoUrl>(&self, url: U) -> Result<Bytes, GetError> {
        self.send(url, RequestType::Get).await
    }

    pub async fn post<U: IntoUrl>(
        &self,
        url: U,
        body: serde_json::Value,
    ) -> Result<Bytes, GetError> {
        self.send(url, RequestType::Post(body)).await
    }

    pub async fn post_form<U: IntoUrl>(
        &self,
        url: U,
        form: Vec<(String, String)>,
    ) -> Result<Bytes, GetError> {
        self.send(url, RequestType::Form(form)).await
    }

    async fn send<U: IntoUrl>(&self, url: U, req_type: RequestType) -> Result<Bytes, GetError> {
        let url = url.into_url()?;

        match &self.limiter {
            None => (),
            Some(limiter) => limiter.until_ready().await,
        }

        let mut request = match req_type {
            RequestType::Get => self.client.get(url),
            RequestType::Post(ref body) => self.client.post(url).json(body),
            RequestType::Form(ref form) => self.client.post(url).form(form),
        };
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }

    pub async fn get_json<U: IntoUrl, T: DeserializeOwned>(
        &self,
        url: U,
    ) -> Result<T, JsonDecodeError> {
        let response = self.get(url).await?;
        serde_json::from_slice(&response).map_err(JsonDecodeError::DecodeError)
    }

    pub async fn post_json<U: IntoUrl, T: DeserializeOwned>(
        &self,
        url: U,
        body: serde_json::Value,
    ) -> Result<T, JsonDecodeError> {
        let response = self.post(url, body).await?;
        serde_json::from_slice(&response).map_err(JsonDecodeError::DecodeError)
    }

    pub async fn post_form_json<U: IntoUrl, T: DeserializeOwned>(
        &self,
        url: U,
        form: Vec<(String, String)>,
    ) -> Result<T, JsonDecodeError> {
        let response = self.post_form(url, form).await?;
        serde_json::from_slice(&response).map_err(JsonDecodeError::DecodeError)
    }
}
