use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::{PersistenceBackend, validate_key};
use crate::error::{ConfigError, StoreError};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_PREFIX: &str = "little-chat/";
const DEFAULT_REGION: &str = "us-east-1";
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(10);

/// Connection settings of an S3-compatible bucket (AWS S3, Cloudflare R2,
/// MinIO, ...).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    /// Prepended to every key.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Custom endpoint, `None` for AWS S3. Buckets are addressed path-style
    /// on custom endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

fn default_region() -> String {
    DEFAULT_REGION.to_owned()
}

impl ObjectStoreConfig {
    /// Reads the settings through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// - `S3_BUCKET` (required)
    /// - `S3_PREFIX` (default: `little-chat/`)
    /// - `S3_ENDPOINT`
    /// - `S3_ACCESS_KEY`, `S3_SECRET_KEY`
    /// - `S3_REGION` or `AWS_REGION` (default: `us-east-1`)
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bucket =
            lookup("S3_BUCKET").ok_or(ConfigError::Missing("S3_BUCKET"))?;
        Ok(Self {
            bucket,
            prefix: lookup("S3_PREFIX").unwrap_or_else(default_prefix),
            endpoint: lookup("S3_ENDPOINT"),
            access_key: lookup("S3_ACCESS_KEY").unwrap_or_default(),
            secret_key: lookup("S3_SECRET_KEY").unwrap_or_default(),
            region: lookup("S3_REGION")
                .or_else(|| lookup("AWS_REGION"))
                .unwrap_or_else(default_region),
        })
    }

    fn object_url(&self, key: &str) -> Result<Url, StoreError> {
        let raw = match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}{}.json",
                endpoint.trim_end_matches('/'),
                self.bucket,
                self.prefix,
                key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}{}.json",
                self.bucket, self.region, self.prefix, key
            ),
        };
        Url::parse(&raw).map_err(|_| StoreError::InvalidKey(key.to_owned()))
    }
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreConfig")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

/// A store backed by JSON objects in an S3-compatible bucket.
///
/// Requests are signed with AWS Signature Version 4. Network errors,
/// throttling and server errors are retried with exponential backoff.
#[derive(Clone, Debug)]
pub struct ObjectStore {
    client: Client,
    config: ObjectStoreConfig,
}

impl ObjectStore {
    #[inline]
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, backoff::Error<StoreError>> {
        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let signed = sign_request(&self.config, &method, url, body, &amz_date);

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .header(HOST, signed.host)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &signed.payload_hash)
            .header(AUTHORIZATION, signed.authorization);
        if method == Method::PUT {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }

        let response = request
            .send()
            .await
            .map_err(|err| backoff::Error::transient(StoreError::Http(err)))?;
        let status = response.status();
        if method == Method::GET && status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|err| {
                    backoff::Error::transient(StoreError::Http(err))
                })?;
            return Ok(Some(bytes.to_vec()));
        }

        let body = response.text().await.unwrap_or_default();
        let err = StoreError::Remote {
            status: status.as_u16(),
            body,
        };
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            warn!("object store answered {status}, retrying");
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &Url,
        body: &[u8],
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(MAX_RETRY_ELAPSED))
            .build();
        backoff::future::retry(policy, || {
            self.send_once(method.clone(), url, body)
        })
        .await
    }
}

#[async_trait]
impl PersistenceBackend for ObjectStore {
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        validate_key(key)?;
        let url = self.config.object_url(key)?;
        let body = serde_json::to_vec(value).map_err(|source| {
            StoreError::Serialization {
                key: key.to_owned(),
                source,
            }
        })?;
        self.send(Method::PUT, &url, &body).await?;
        debug!("uploaded {key} to {url}");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        let url = self.config.object_url(key)?;
        let Some(bytes) = self.send(Method::GET, &url, &[]).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|source| {
            StoreError::Serialization {
                key: key.to_owned(),
                source,
            }
        })
    }
}

struct SignedHeaders {
    host: String,
    payload_hash: String,
    authorization: String,
}

/// Signs a request without query string with AWS Signature Version 4.
fn sign_request(
    config: &ObjectStoreConfig,
    method: &Method,
    url: &Url,
    body: &[u8],
    amz_date: &str,
) -> SignedHeaders {
    let host = match url.port() {
        Some(port) => format!("{}:{port}", url.host_str().unwrap_or_default()),
        None => url.host_str().unwrap_or_default().to_owned(),
    };
    let payload_hash = hex::encode(Sha256::digest(body));
    let date = &amz_date[..8];

    let canonical_request = format!(
        "{method}\n{}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\nhost;x-amz-content-sha256;x-amz-date\n{payload_hash}",
        url.path()
    );
    let credential_scope = format!("{date}/{}/s3/aws4_request", config.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", config.secret_key).as_bytes(),
        date.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, config.region.as_bytes());
    let k_service = hmac_sha256(&k_region, b"s3");
    let k_signing = hmac_sha256(&k_service, b"aws4_request");
    let signature =
        hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

    SignedHeaders {
        host,
        payload_hash,
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature={signature}",
            config.access_key
        ),
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
