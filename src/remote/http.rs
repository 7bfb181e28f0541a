//! JSON-over-HTTP gateway.
//!
//! Endpoints, relative to the configured base URL:
//! - `POST votes`, `GET votes?poll_id=&voter_kind=&voter_id=`
//! - `POST polls`, `GET polls/{id}`, `GET polls?limit=&order=created_at.desc`
//! - `PUT assets/{key}` with the raw image body, answering `{"url": ...}`

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::types::{AssetUpload, NewPoll, NewVote, RemotePoll, RemoteVote};
use super::{GatewayError, RemoteGateway};
use crate::store::Voter;

#[derive(Deserialize)]
struct UploadResponse {
  url: String,
}

/// Remote gateway backed by a REST API.
#[derive(Clone)]
pub struct HttpGateway {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
  timeout: Duration,
}

impl HttpGateway {
  pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
    // Url::join drops the last segment unless the base ends with a slash
    let normalized = if base_url.ends_with('/') {
      base_url.to_string()
    } else {
      format!("{}/", base_url)
    };
    let base =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid remote URL {}: {}", base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token,
      timeout,
    })
  }

  /// Host and port of the backend, for reachability probes.
  pub fn authority(&self) -> Option<(String, u16)> {
    let host = self.base.host_str()?.to_string();
    let port = self.base.port_or_known_default()?;
    Some((host, port))
  }

  fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| GatewayError::Network(format!("cannot use {} as a base URL", self.base)))?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let builder = self.client.request(method, url);
    match &self.token {
      Some(token) => builder.bearer_auth(token),
      None => builder,
    }
  }

  async fn send(&self, builder: RequestBuilder) -> Result<Response, GatewayError> {
    builder.send().await.map_err(|e| {
      if e.is_timeout() {
        GatewayError::Timeout(self.timeout)
      } else {
        GatewayError::Network(e.to_string())
      }
    })
  }
}

async fn check_status(response: Response) -> Result<Response, GatewayError> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }
  let body = response.text().await.unwrap_or_default();
  Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> GatewayError {
  let message = if body.is_empty() {
    status.canonical_reason().unwrap_or("unknown").to_string()
  } else {
    body
  };
  GatewayError::Server {
    status: status.as_u16(),
    message,
  }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
  response
    .json::<T>()
    .await
    .map_err(|e| GatewayError::Decode(e.to_string()))
}

#[async_trait]
impl RemoteGateway for HttpGateway {
  async fn insert_vote(&self, vote: &NewVote) -> Result<RemoteVote, GatewayError> {
    let url = self.endpoint(&["votes"])?;
    let response = self
      .send(self.request(Method::POST, url).json(vote))
      .await?;

    if response.status() == StatusCode::CONFLICT {
      return Err(GatewayError::Conflict {
        poll_id: vote.poll_id.clone(),
      });
    }
    decode(check_status(response).await?).await
  }

  async fn fetch_vote(
    &self,
    poll_id: &str,
    voter: &Voter,
  ) -> Result<Option<RemoteVote>, GatewayError> {
    let mut url = self.endpoint(&["votes"])?;
    url
      .query_pairs_mut()
      .append_pair("poll_id", poll_id)
      .append_pair("voter_kind", voter.kind())
      .append_pair("voter_id", voter.id());

    let response = self.send(self.request(Method::GET, url)).await?;
    let votes: Vec<RemoteVote> = decode(check_status(response).await?).await?;
    Ok(votes.into_iter().next())
  }

  async fn insert_poll(&self, poll: &NewPoll) -> Result<RemotePoll, GatewayError> {
    let url = self.endpoint(&["polls"])?;
    let response = self
      .send(self.request(Method::POST, url).json(poll))
      .await?;
    decode(check_status(response).await?).await
  }

  async fn fetch_poll(&self, id: &str) -> Result<Option<RemotePoll>, GatewayError> {
    let url = self.endpoint(&["polls", id])?;
    let response = self.send(self.request(Method::GET, url)).await?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    decode(check_status(response).await?).await.map(Some)
  }

  async fn fetch_recent_polls(&self, limit: usize) -> Result<Vec<RemotePoll>, GatewayError> {
    let mut url = self.endpoint(&["polls"])?;
    url
      .query_pairs_mut()
      .append_pair("limit", &limit.to_string())
      .append_pair("order", "created_at.desc");

    let response = self.send(self.request(Method::GET, url)).await?;
    decode(check_status(response).await?).await
  }

  async fn upload_asset(&self, asset: AssetUpload<'_>) -> Result<String, GatewayError> {
    let url = self.endpoint(&["assets", asset.key])?;
    debug!(key = asset.key, bytes = asset.data.len(), "uploading asset");

    let response = self
      .send(
        self
          .request(Method::PUT, url)
          .header(header::CONTENT_TYPE, asset.content_type)
          .body(asset.data.to_vec()),
      )
      .await?;

    let uploaded: UploadResponse = decode(check_status(response).await?).await?;
    Ok(uploaded.url)
  }
}
