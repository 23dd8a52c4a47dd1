//! Model registry store operations and their native implementation

use std::sync::Arc;

use super::StoreOptions;
use crate::config::ConfigBlob;
use crate::error::{BridgeError, Result};
use crate::interop::NativeLibrary;
use crate::protos::model_registry::*;
use crate::proxy::ServiceProxy;
use crate::service::ServiceKind;

/// Operations of a model registry store
pub trait ModelRegistryStore {
    /// Latest version of the model in each of `stages`, or in every stage when empty
    fn get_latest_versions(&self, _name: &str, _stages: &[String]) -> Result<Vec<ModelVersion>> {
        Err(BridgeError::Unsupported("get_latest_versions"))
    }

    fn create_registered_model(
        &self,
        _name: &str,
        _tags: &[RegisteredModelTag],
        _description: Option<&str>,
    ) -> Result<RegisteredModel> {
        Err(BridgeError::Unsupported("create_registered_model"))
    }
}

/// Model registry store served by the native model registry service
#[derive(Debug)]
pub struct NativeModelRegistryStore {
    proxy: ServiceProxy,
}

impl NativeModelRegistryStore {
    pub fn open(library: Arc<NativeLibrary>, store_uri: &str, options: &StoreOptions) -> Result<Self> {
        let config =
            ConfigBlob::model_registry(store_uri).with_log_level(options.log_level_name());
        let proxy = ServiceProxy::create(library, ServiceKind::ModelRegistry, &config)?;
        Ok(Self { proxy })
    }

    pub fn from_proxy(proxy: ServiceProxy) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &ServiceProxy {
        &self.proxy
    }
}

impl ModelRegistryStore for NativeModelRegistryStore {
    fn get_latest_versions(&self, name: &str, stages: &[String]) -> Result<Vec<ModelVersion>> {
        let response = self.proxy.call(&GetLatestVersions {
            name: Some(name.to_string()),
            stages: stages.to_vec(),
        })?;
        Ok(response.model_versions)
    }

    fn create_registered_model(
        &self,
        name: &str,
        tags: &[RegisteredModelTag],
        description: Option<&str>,
    ) -> Result<RegisteredModel> {
        let response = self.proxy.call(&CreateRegisteredModel {
            name: Some(name.to_string()),
            tags: tags.to_vec(),
            description: description.map(str::to_string),
        })?;
        response
            .registered_model
            .ok_or_else(|| BridgeError::Protocol("response is missing `registered_model`".into()))
    }
}
