//! Service identity attached to every exported span.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "service.name")]
    pub service_name: String,
    #[serde(rename = "deployment.environment")]
    pub environment: String,
    #[serde(rename = "service.instance.id")]
    pub instance_id: String,
}

impl Resource {
    pub fn new(
        service_name: impl Into<String>,
        environment: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            environment: environment.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Without a configured instance id a random one is used, so restarts
    /// are distinguishable.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let instance_id = config
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::new(&config.name, &config.environment, instance_id)
    }
}
