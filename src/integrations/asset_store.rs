use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{error, info, instrument};

use crate::{entities::ImageAsset, errors::ServiceError};

/// An image received from a multipart form, already size and type checked
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<ImageAsset, ServiceError>;
    async fn destroy(&self, public_id: &str) -> Result<(), ServiceError>;
}

/// Cloudinary upload API client using signed requests
#[derive(Clone)]
pub struct CloudinaryClient {
    client: reqwest::Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Cloudinary signature: sorted `key=value` pairs joined by `&`, then the secret.
pub(crate) fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    hex::encode(Sha256::digest(format!("{}{}", joined, secret).as_bytes()))
}

impl CloudinaryClient {
    pub const DEFAULT_API_BASE: &'static str = "https://api.cloudinary.com/v1_1";

    pub fn new(
        api_base: impl Into<String>,
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        folder: impl Into<String>,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            folder: folder.into(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/{}/image/{}", self.api_base, self.cloud_name, action)
    }
}

#[async_trait]
impl AssetStore for CloudinaryClient {
    #[instrument(skip(self, image), fields(field = %image.field, bytes = image.data.len()))]
    async fn upload(&self, image: ImageUpload) -> Result<ImageAsset, ServiceError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("folder", &self.folder), ("timestamp", &timestamp)],
            &self.api_secret,
        );

        let part = reqwest::multipart::Part::bytes(image.data.to_vec())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.folder.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "image upload rejected");
            return Err(ServiceError::ExternalServiceError(format!(
                "image upload failed with HTTP {}",
                status
            )));
        }

        let uploaded: UploadResponse = response.json().await?;
        info!(public_id = %uploaded.public_id, "image uploaded");
        Ok(ImageAsset {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    #[instrument(skip(self))]
    async fn destroy(&self, public_id: &str) -> Result<(), ServiceError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", public_id), ("timestamp", &timestamp)],
            &self.api_secret,
        );

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&[
                ("public_id", public_id),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature_algorithm", "sha256"),
                ("signature", signature.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "image delete failed with HTTP {}",
                response.status()
            )));
        }

        let outcome: DestroyResponse = response.json().await?;
        // "not found" means the asset is already gone
        if outcome.result != "ok" && outcome.result != "not found" {
            return Err(ServiceError::ExternalServiceError(format!(
                "image delete returned {}",
                outcome.result
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{method, path},
        Mock, MockServer, ResponseTemplate,
    };

    #[test]
    fn signature_sorts_parameters() {
        let expected = "df9b2f813fa8533d068d6d2c746e814d339f366a56fbf07e525e6b6c51d6e82d";
        assert_eq!(
            sign_params(&[("timestamp", "1700000000"), ("folder", "storefront")], "abcd"),
            expected
        );
        assert_eq!(
            sign_params(&[("folder", "storefront"), ("timestamp", "1700000000")], "abcd"),
            expected
        );
    }

    fn client(base: String) -> CloudinaryClient {
        CloudinaryClient::new(base, "demo", "key", "secret", "storefront").unwrap()
    }

    #[tokio::test]
    async fn upload_returns_secure_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "secure_url": "https://res.cloudinary.com/demo/image/upload/v1/storefront/a.png",
                "public_id": "storefront/a",
                "format": "png"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let asset = client(server.uri())
            .upload(ImageUpload {
                field: "logo".into(),
                file_name: "a.png".into(),
                content_type: "image/png".into(),
                data: Bytes::from_static(b"\x89PNG"),
            })
            .await
            .unwrap();
        assert_eq!(asset.public_id, "storefront/a");
        assert!(asset.url.starts_with("https://"));
    }

    #[tokio::test]
    async fn destroy_tolerates_missing_asset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/demo/image/destroy"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": "not found" })))
            .mount(&server)
            .await;

        client(server.uri()).destroy("storefront/gone").await.unwrap();
    }
}
