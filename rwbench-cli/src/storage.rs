//! Construction of object store clients from configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use rwbench_client::{InMemoryClient, S3Client, S3Config, SharedClient};
use secrecy::ExposeSecret;

use crate::config::Storage;

/// Builds the object store client described by the configuration.
pub fn client(storage: &Storage) -> Result<SharedClient> {
    let client: SharedClient = match storage {
        Storage::S3 {
            region,
            endpoint,
            path_style,
            request_timeout,
            access_key,
            secret_key,
            session_token,
        } => {
            let config = S3Config {
                region: region.clone(),
                endpoint: endpoint.clone(),
                path_style: *path_style,
                request_timeout: *request_timeout,
                access_key: access_key.clone(),
                secret_key: secret_key
                    .as_ref()
                    .map(|secret| secret.expose_secret().as_str().to_owned()),
                session_token: session_token
                    .as_ref()
                    .map(|token| token.expose_secret().as_str().to_owned()),
            };
            Arc::new(S3Client::new(config).context("failed to create S3 client")?)
        }
        Storage::Memory { stale_rate } => Arc::new(InMemoryClient::with_stale_rate(*stale_rate)),
    };

    tracing::debug!(client = client.name(), "Created object store client");
    Ok(client)
}
