use std::time::Duration;

use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use serde::Serialize;

use crate::config::Config;
use crate::error::AppError;

/// S3 适配层：预签名直传 + 服务端落盘两条路径都走这里
#[derive(Clone)]
pub struct ObjectStorage {
    client: aws_sdk_s3::Client,
    bucket: String,
    region: String,
    public_url: Option<String>,
    presign_expire: Duration,
}

#[derive(Debug, Serialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: i64,
    pub last_modified_secs: Option<i64>,
}

impl ObjectStorage {
    pub async fn from_config(config: &Config) -> Self {
        let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new(config.s3_region.clone()));

        if let Some(ref endpoint) = config.s3_endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(config.s3_endpoint.is_some())
            .build();

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.s3_bucket.clone(),
            region: config.s3_region.clone(),
            public_url: config.s3_public_url.clone(),
            presign_expire: config.presign_expire(),
        }
    }

    /// 对象的公开访问地址（提交记录里存的就是它）
    pub fn object_url(&self, key: &str) -> String {
        match &self.public_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }

    pub async fn presign_put(&self, key: &str, content_type: &str) -> Result<String, AppError> {
        let presigned = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(PresigningConfig::expires_in(self.presign_expire)?)
            .await?;

        Ok(presigned.uri().to_string())
    }

    pub async fn presign_get(&self, key: &str) -> Result<String, AppError> {
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(PresigningConfig::expires_in(self.presign_expire)?)
            .await?;

        Ok(presigned.uri().to_string())
    }

    /// 服务端直接写入对象，返回公开地址
    pub async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await?;

        tracing::debug!("stored object {}", key);
        Ok(self.object_url(key))
    }

    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<ObjectMeta>, AppError> {
        let mut request = self.client.list_objects_v2().bucket(&self.bucket);
        if let Some(prefix) = prefix {
            request = request.prefix(prefix);
        }

        let response = request.send().await?;
        let objects = response
            .contents()
            .iter()
            .filter_map(|obj| {
                Some(ObjectMeta {
                    key: obj.key()?.to_string(),
                    size: obj.size().unwrap_or(0),
                    last_modified_secs: obj.last_modified().map(|t| t.secs()),
                })
            })
            .collect();

        Ok(objects)
    }
}
