//! Client for a remote policy record service.
//!
//! Speaks the same interface this server exposes under `/metadata`:
//! `POST {base}` with a JSON record body, `GET {base}/{fileId}` and
//! `DELETE {base}/{fileId}`, with 404 meaning "no such record".

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Serialize;

use super::store::{PolicyStore, PolicyStoreError};
use super::{PolicyFields, PolicyRecord};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertBody<'a> {
    file_id: &'a str,
    #[serde(flatten)]
    fields: &'a PolicyFields,
}

#[derive(Debug, Clone)]
pub struct RemotePolicyStore {
    client: Client,
    base: Url,
}

impl RemotePolicyStore {
    pub fn new(base_url: &str) -> Result<Self, PolicyStoreError> {
        let base = Url::parse(base_url)
            .map_err(|e| PolicyStoreError::Backend(format!("invalid metadata URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(PolicyStoreError::Backend(format!(
                "metadata URL {} cannot carry a path",
                base_url
            )));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    fn record_url(&self, file_id: &str) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in new()
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(file_id);
        }
        url
    }

    /// Decode a record response; 404 becomes `None`.
    async fn record_or_none(
        resp: reqwest::Response,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError> {
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => resp
                .json::<PolicyRecord>()
                .await
                .map(Some)
                .map_err(|e| PolicyStoreError::Backend(format!("bad record body: {}", e))),
            s => Err(PolicyStoreError::Remote {
                status: s.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

fn transport(e: reqwest::Error) -> PolicyStoreError {
    PolicyStoreError::Backend(format!("metadata service unreachable: {}", e))
}

#[async_trait]
impl PolicyStore for RemotePolicyStore {
    async fn upsert(
        &self,
        file_id: &str,
        fields: PolicyFields,
    ) -> Result<PolicyRecord, PolicyStoreError> {
        let resp = self
            .client
            .post(self.base.clone())
            .json(&UpsertBody {
                file_id,
                fields: &fields,
            })
            .send()
            .await
            .map_err(transport)?;

        Self::record_or_none(resp).await?.ok_or_else(|| PolicyStoreError::Remote {
            status: StatusCode::NOT_FOUND.as_u16(),
            body: format!("upsert of {} returned no record", file_id),
        })
    }

    async fn get_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError> {
        let resp = self
            .client
            .get(self.record_url(file_id))
            .send()
            .await
            .map_err(transport)?;
        Self::record_or_none(resp).await
    }

    async fn delete_by_file_id(
        &self,
        file_id: &str,
    ) -> Result<Option<PolicyRecord>, PolicyStoreError> {
        let resp = self
            .client
            .delete(self.record_url(file_id))
            .send()
            .await
            .map_err(transport)?;
        Self::record_or_none(resp).await
    }
}
