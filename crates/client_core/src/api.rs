//! REST seam between the controller and the template/instance backend.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{InstanceId, InstanceStatus, TemplateId},
    protocol::{CreateInstanceRequest, Instance, Template},
};
use tracing::debug;
use url::Url;

use crate::error::ClientError;

#[async_trait]
pub trait TemplateApi: Send + Sync {
    async fn list_templates(&self) -> Result<Vec<Template>, ClientError>;
    async fn list_instances(&self, template_id: &TemplateId) -> Result<Vec<Instance>, ClientError>;
    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<Instance, ClientError>;
    async fn update_status(
        &self,
        instance_id: &InstanceId,
        status: &InstanceStatus,
    ) -> Result<Instance, ClientError>;
    async fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), ClientError>;
}

/// `TemplateApi` over HTTP, rooted at `<base_url>/api/v1`.
pub struct HttpTemplateApi {
    http: Client,
    api_root: Url,
}

impl HttpTemplateApi {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self::with_client(builder.build()?, base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self, ClientError> {
        let invalid = |reason: &str| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: reason.to_string(),
        };

        let mut api_root = Url::parse(base_url.trim()).map_err(|err| invalid(&err.to_string()))?;
        if !matches!(api_root.scheme(), "http" | "https") {
            return Err(invalid("scheme must be http or https"));
        }
        api_root.set_query(None);
        api_root.set_fragment(None);
        api_root
            .path_segments_mut()
            .map_err(|()| invalid("url cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "v1"]);

        Ok(Self { http, api_root })
    }

    pub fn api_root(&self) -> &Url {
        &self.api_root
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }
}

#[async_trait]
impl TemplateApi for HttpTemplateApi {
    async fn list_templates(&self) -> Result<Vec<Template>, ClientError> {
        let res = self.http.get(self.endpoint(&["templates"])).send().await?;
        read_json(res).await
    }

    async fn list_instances(&self, template_id: &TemplateId) -> Result<Vec<Instance>, ClientError> {
        let res = self
            .http
            .get(self.endpoint(&["instances"]))
            .query(&[("templateId", template_id.as_str())])
            .send()
            .await?;
        read_json(res).await
    }

    async fn create_instance(
        &self,
        request: &CreateInstanceRequest,
    ) -> Result<Instance, ClientError> {
        let res = self
            .http
            .post(self.endpoint(&["instances"]))
            .json(request)
            .send()
            .await?;
        read_json(res).await
    }

    async fn update_status(
        &self,
        instance_id: &InstanceId,
        status: &InstanceStatus,
    ) -> Result<Instance, ClientError> {
        // The body is the bare JSON string, e.g. "stopped".
        let res = self
            .http
            .post(self.endpoint(&["instances", instance_id.as_str()]))
            .json(status)
            .send()
            .await?;
        read_json(res).await
    }

    async fn delete_instance(&self, instance_id: &InstanceId) -> Result<(), ClientError> {
        let res = self
            .http
            .delete(self.endpoint(&["instances", instance_id.as_str()]))
            .send()
            .await?;
        ensure_success(res).await?;
        debug!(instance_id = %instance_id, "deleted instance");
        Ok(())
    }
}

async fn ensure_success(res: Response) -> Result<Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(ClientError::Status { status, body })
}

async fn read_json<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
    Ok(ensure_success(res).await?.json().await?)
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
