//! S3-compatible listing source backed by `ListObjectsV2`

use super::{ListingPage, ListingSource, RemoteEntry};
use crate::config::ContainerConfig;
use crate::error::{ListCacheError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};

const DEFAULT_REGION: &str = "us-east-1";

/// Lists a bucket ("container") through the S3 API.
#[derive(Clone, Debug)]
pub struct S3ListingSource {
    client: S3Client,
}

impl S3ListingSource {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }

    /// Build a client from a container's account name (access key id),
    /// account key (secret key), and optional region and endpoint.
    pub async fn from_config(config: &ContainerConfig) -> Result<Self> {
        if config.account_name.is_empty() || config.account_key.is_empty() {
            return Err(ListCacheError::Config(format!(
                "account_name and account_key are both required for container '{}'",
                config.name
            )));
        }

        let credentials = Credentials::new(
            config.account_name.clone(),
            config.account_key.clone(),
            None,
            None,
            "listcache",
        );
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self::new(S3Client::from_conf(builder.build())))
    }
}

fn to_chrono(ts: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(ts.secs(), ts.subsec_nanos())
}

#[async_trait]
impl ListingSource for S3ListingSource {
    async fn list_page(&self, container: &str, marker: Option<&str>) -> Result<ListingPage> {
        let resp = self
            .client
            .list_objects_v2()
            .bucket(container)
            .set_continuation_token(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| {
                ListCacheError::Remote(format!("ListObjectsV2 on '{}' failed: {}", container, e))
            })?;

        let mut entries = Vec::with_capacity(resp.contents().len());
        for object in resp.contents() {
            let Some(name) = object.key() else {
                continue;
            };
            let last_modified = object
                .last_modified()
                .and_then(to_chrono)
                .ok_or_else(|| {
                    ListCacheError::Remote(format!("object '{}' has no last-modified time", name))
                })?;
            entries.push(RemoteEntry::new(
                name,
                object.size().unwrap_or(0),
                last_modified,
            ));
        }

        let next_marker = if resp.is_truncated().unwrap_or(false) {
            resp.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListingPage {
            entries,
            next_marker,
        })
    }
}
