//! Sealed objects on an IPFS node, through its HTTP RPC API (`/api/v0`).
//!
//! Ciphertext and nonce are added as two separate blocks. Both CIDs travel in
//! the locator, `ipfs://<ciphertext-cid>?nonce=<nonce-cid>`, so the nonce can
//! never be orphaned.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use serde::Deserialize;

use super::{Locator, ObjectError, ObjectStore};
use crate::cipher::Sealed;

const SCHEME_PREFIX: &str = "ipfs://";
const NONCE_PARAM: &str = "?nonce=";

#[derive(Debug, Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct IpfsObjectStore {
    client: Client,
    api: Url,
}

impl IpfsObjectStore {
    /// `api_url` is the node's RPC root, e.g. `http://127.0.0.1:5001`.
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, ObjectError> {
        let api = Url::parse(api_url)
            .map_err(|e| ObjectError::Backend(format!("invalid IPFS API URL: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ObjectError::Backend(format!("IPFS client: {}", e)))?;
        Ok(Self { client, api })
    }

    fn endpoint(&self, command: &str) -> Result<Url, ObjectError> {
        self.api
            .join(&format!("api/v0/{}", command))
            .map_err(|e| ObjectError::Backend(format!("IPFS endpoint {}: {}", command, e)))
    }

    async fn add(&self, name: &str, bytes: Vec<u8>) -> Result<String, ObjectError> {
        let form = Form::new().part("file", Part::bytes(bytes).file_name(name.to_string()));
        let resp = self
            .client
            .post(self.endpoint("add")?)
            .query(&[("pin", "true"), ("cid-version", "1")])
            .multipart(form)
            .send()
            .await
            .map_err(|e| ObjectError::Backend(format!("IPFS add: {}", e)))?;

        if !resp.status().is_success() {
            return Err(api_failure("add", name, resp).await);
        }
        let added: AddResponse = resp
            .json()
            .await
            .map_err(|e| ObjectError::Backend(format!("IPFS add response: {}", e)))?;
        Ok(added.hash)
    }

    async fn cat(&self, cid: &str) -> Result<Vec<u8>, ObjectError> {
        let resp = self
            .client
            .post(self.endpoint("cat")?)
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(|e| ObjectError::Backend(format!("IPFS cat {}: {}", cid, e)))?;

        if !resp.status().is_success() {
            return Err(api_failure("cat", cid, resp).await);
        }
        resp.bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| ObjectError::Backend(format!("IPFS cat {} body: {}", cid, e)))
    }

    async fn unpin(&self, cid: &str) -> Result<(), ObjectError> {
        let resp = self
            .client
            .post(self.endpoint("pin/rm")?)
            .query(&[("arg", cid)])
            .send()
            .await
            .map_err(|e| ObjectError::Backend(format!("IPFS pin/rm {}: {}", cid, e)))?;

        if resp.status().is_success() {
            return Ok(());
        }
        match api_failure("pin/rm", cid, resp).await {
            // already unpinned or never stored
            ObjectError::NotFound(_) => Ok(()),
            other => Err(other),
        }
    }
}

/// Turn a non-2xx RPC reply into an error. The node answers 500 with a JSON
/// `Message` for most failures, so "not found" has to be read from the text.
async fn api_failure(command: &str, arg: &str, resp: reqwest::Response) -> ObjectError {
    let status = resp.status();
    let message = resp
        .json::<ApiError>()
        .await
        .map(|e| e.message)
        .unwrap_or_default();
    let lower = message.to_lowercase();

    if status == reqwest::StatusCode::NOT_FOUND
        || lower.contains("not found")
        || lower.contains("not pinned")
        || lower.contains("no link named")
    {
        ObjectError::NotFound(format!("{} ({})", arg, message))
    } else {
        ObjectError::Backend(format!("IPFS {} {} failed with {}: {}", command, arg, status, message))
    }
}

pub fn format_locator(data_cid: &str, nonce_cid: &str) -> Locator {
    Locator::new(format!("{}{}{}{}", SCHEME_PREFIX, data_cid, NONCE_PARAM, nonce_cid))
}

/// Split a locator into (ciphertext CID, nonce CID).
pub fn parse_locator(locator: &Locator) -> Result<(&str, &str), ObjectError> {
    locator
        .as_str()
        .strip_prefix(SCHEME_PREFIX)
        .and_then(|rest| rest.split_once(NONCE_PARAM))
        .filter(|(data, nonce)| !data.is_empty() && !nonce.is_empty())
        .ok_or_else(|| ObjectError::InvalidKey(format!("not an IPFS locator: {}", locator)))
}

#[async_trait]
impl ObjectStore for IpfsObjectStore {
    async fn put(&self, file_id: &str, sealed: &Sealed) -> Result<Locator, ObjectError> {
        if file_id.is_empty() {
            return Err(ObjectError::InvalidKey("empty file id".to_string()));
        }
        let nonce_cid = self.add(&format!("{}.iv", file_id), sealed.nonce.clone()).await?;
        let data_cid = self
            .add(&format!("{}.enc", file_id), sealed.ciphertext.clone())
            .await?;

        tracing::debug!("Added {} to IPFS as {} (nonce {})", file_id, data_cid, nonce_cid);
        Ok(format_locator(&data_cid, &nonce_cid))
    }

    async fn get(&self, locator: &Locator) -> Result<Sealed, ObjectError> {
        let (data_cid, nonce_cid) = parse_locator(locator)?;
        let ciphertext = self.cat(data_cid).await?;
        let nonce = self.cat(nonce_cid).await?;
        Ok(Sealed { nonce, ciphertext })
    }

    async fn delete(&self, locator: &Locator) -> Result<(), ObjectError> {
        let (data_cid, nonce_cid) = parse_locator(locator)?;
        self.unpin(data_cid).await?;
        self.unpin(nonce_cid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_carries_both_cids() {
        let loc = format_locator("bafydata", "bafynonce");
        assert_eq!(loc.as_str(), "ipfs://bafydata?nonce=bafynonce");
        assert_eq!(parse_locator(&loc).unwrap(), ("bafydata", "bafynonce"));
    }

    #[test]
    fn test_parse_rejects_incomplete_locators() {
        for raw in ["ipfs://bafydata", "ipfs://?nonce=x", "ipfs://x?nonce=", "/uploads/a.enc"] {
            assert!(parse_locator(&Locator::new(raw)).is_err(), "{} accepted", raw);
        }
    }

    #[test]
    fn test_endpoint_joins_api_root() {
        let store = IpfsObjectStore::new("http://127.0.0.1:5001", Duration::from_secs(5)).unwrap();
        assert_eq!(
            store.endpoint("pin/rm").unwrap().as_str(),
            "http://127.0.0.1:5001/api/v0/pin/rm"
        );
    }
}
