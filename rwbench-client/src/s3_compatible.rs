use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use crate::common::{KeyStream, ObjectClient};
use crate::error::{ClientError, ClientResult};

/// Maximum number of single-object deletes in flight for one batch.
const DELETE_CONCURRENCY: usize = 32;

/// Connection settings for an [`S3Client`].
#[derive(Clone, Default)]
pub struct S3Config {
    /// The AWS region, for example `us-east-1`.
    pub region: String,
    /// Custom endpoint for S3-compatible services. Defaults to the regional AWS endpoint.
    pub endpoint: Option<String>,
    /// Address buckets by path instead of by virtual host.
    pub path_style: bool,
    /// Timeout applied to every request.
    pub request_timeout: Option<Duration>,
    /// Static access key. When unset, credentials are resolved from the environment.
    pub access_key: Option<String>,
    /// Static secret key.
    pub secret_key: Option<String>,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .field("request_timeout", &self.request_timeout)
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// A client for Amazon S3 and S3-compatible services.
///
/// Buckets are created on first use and cached, so all requests against one bucket share an
/// HTTP connection pool.
pub struct S3Client {
    region: Region,
    credentials: Credentials,
    path_style: bool,
    request_timeout: Option<Duration>,
    buckets: Mutex<HashMap<String, Box<Bucket>>>,
}

impl S3Client {
    /// Creates a new client, resolving credentials once up front.
    pub fn new(config: S3Config) -> ClientResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            config.session_token.as_deref(),
            None,
        )
        .map_err(|cause| ClientError::generic("failed to resolve credentials", cause))?;

        let region = Region::Custom {
            endpoint: resolve_endpoint(&config),
            region: config.region,
        };

        Ok(Self {
            region,
            credentials,
            path_style: config.path_style,
            request_timeout: config.request_timeout,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    fn bucket(&self, name: &str) -> ClientResult<Box<Bucket>> {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(bucket) = buckets.get(name) {
            return Ok(bucket.clone());
        }

        let bucket = self.new_bucket(name)?;
        buckets.insert(name.to_owned(), bucket.clone());
        Ok(bucket)
    }

    fn new_bucket(&self, name: &str) -> ClientResult<Box<Bucket>> {
        let mut bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|cause| ClientError::s3(format!("invalid bucket `{name}`"), cause))?;

        if self.path_style {
            bucket = bucket.with_path_style();
        }

        if let Some(request_timeout) = self.request_timeout {
            bucket = bucket
                .with_request_timeout(request_timeout)
                .map_err(|cause| ClientError::s3("failed to set request timeout", cause))?;
        }

        Ok(bucket)
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Client")
            .field("region", &self.region.to_string())
            .field("endpoint", &self.region.endpoint())
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}

fn resolve_endpoint(config: &S3Config) -> String {
    match config.endpoint {
        Some(ref endpoint) => endpoint.clone(),
        None => format!("https://s3.{}.amazonaws.com", config.region),
    }
}

fn is_not_found(error: &S3Error) -> bool {
    matches!(error, S3Error::HttpFailWithBody(404, _))
}

#[async_trait::async_trait]
impl ObjectClient for S3Client {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn list(&self, bucket: &str) -> KeyStream<'_> {
        let bucket = match self.bucket(bucket) {
            Ok(bucket) => bucket,
            Err(error) => return stream::once(async { Err(error) }).boxed(),
        };

        // The state is the continuation token of the next page, or `None` once the listing is
        // exhausted. The very first request is sent without a token.
        stream::try_unfold(Some(None), move |state: Option<Option<String>>| {
            let bucket = bucket.clone();
            async move {
                let Some(continuation_token) = state else {
                    return Ok(None);
                };

                tracing::trace!(bucket = %bucket.name(), "Listing page");
                let (page, _) = bucket
                    .list_page(String::new(), None, continuation_token, None, None)
                    .await
                    .map_err(|cause| ClientError::s3("failed to list objects", cause))?;

                let next = match page.next_continuation_token {
                    Some(token) if page.is_truncated => Some(Some(token)),
                    _ => None,
                };
                let keys: Vec<ClientResult<String>> =
                    page.contents.into_iter().map(|object| Ok(object.key)).collect();

                Ok(Some((stream::iter(keys), next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> ClientResult<Option<Bytes>> {
        let response = match self.bucket(bucket)?.get_object(key).await {
            Ok(response) => response,
            Err(error) if is_not_found(&error) => {
                tracing::trace!("Object not found");
                return Ok(None);
            }
            Err(cause) => return Err(ClientError::s3(format!("failed to get `{key}`"), cause)),
        };

        if response.status_code() == 404 {
            tracing::trace!("Object not found");
            return Ok(None);
        }

        Ok(Some(Bytes::from(response.to_vec())))
    }

    #[tracing::instrument(level = "trace", skip(self, value), fields(len = value.len()))]
    async fn put(&self, bucket: &str, key: &str, value: Bytes) -> ClientResult<()> {
        self.bucket(bucket)?
            .put_object(key, &value)
            .await
            .map_err(|cause| ClientError::s3(format!("failed to put `{key}`"), cause))?;
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self, keys), fields(count = keys.len()))]
    async fn delete_batch(&self, bucket: &str, keys: Vec<String>) -> ClientResult<()> {
        let bucket = self.bucket(bucket)?;
        stream::iter(keys)
            .map(|key| {
                let bucket = &bucket;
                async move {
                    match bucket.delete_object(&key).await {
                        Ok(_) => Ok(()),
                        Err(error) if is_not_found(&error) => Ok(()),
                        Err(cause) => Err(ClientError::s3(format!("failed to delete `{key}`"), cause)),
                    }
                }
            })
            .buffer_unordered(DELETE_CONCURRENCY)
            .try_collect()
            .await
    }
}
