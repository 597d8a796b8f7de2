//! Remote registry client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::{MeshError, Result};
use crate::http::client::{error_from_response, ApiClient};
use crate::registry::discovery::Discovery;
use crate::registry::instance::{
    HeartbeatRequest, Instance, InstanceStatus, Lease, RegisterRequest, ServiceSummary,
};

/// Talks to a registry over its HTTP API.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    api: ApiClient,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(base_url, timeout)?,
        })
    }

    pub async fn register(&self, instance: &Instance) -> Result<Lease> {
        let url = self.api.url(&["instances", &instance.service_name, &instance.instance_id]);
        let body = RegisterRequest {
            host: instance.host.clone(),
            port: instance.port,
            status: Some(instance.status),
        };
        let response = self.api.http().post(url).json(&body).send().await?;
        match response.status() {
            s if s.is_success() => Ok(response.json().await?),
            StatusCode::CONFLICT => Err(MeshError::DuplicateInstance {
                service: instance.service_name.clone(),
                instance_id: instance.instance_id.clone(),
            }),
            _ => Err(error_from_response(response).await),
        }
    }

    pub async fn heartbeat(
        &self,
        service: &str,
        instance_id: &str,
        status: Option<InstanceStatus>,
    ) -> Result<()> {
        let url = self.api.url(&["instances", service, instance_id]);
        let response = self
            .api
            .http()
            .put(url)
            .json(&HeartbeatRequest { status })
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    pub async fn deregister(&self, service: &str, instance_id: &str) -> Result<()> {
        let url = self.api.url(&["instances", service, instance_id]);
        let response = self.api.http().delete(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    pub async fn lookup(&self, service: &str) -> Result<Vec<Instance>> {
        let url = self.api.url(&["instances", service]);
        let response = self.api.http().get(url).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(error_from_response(response).await)
        }
    }

    pub async fn services(&self) -> Result<Vec<ServiceSummary>> {
        let url = self.api.url(&["instances"]);
        let response = self.api.http().get(url).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(error_from_response(response).await)
        }
    }
}

#[async_trait]
impl Discovery for RegistryClient {
    async fn lookup(&self, service: &str) -> Result<Vec<Instance>> {
        RegistryClient::lookup(self, service).await
    }
}
