//! Model registry service messages

use crate::service::ServiceKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ModelVersionStatus {
    PendingRegistration = 1,
    FailedRegistration = 2,
    Ready = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisteredModelTag {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModelVersionTag {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisteredModelAlias {
    #[prost(string, optional, tag = "1")]
    pub alias: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub version: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModelVersion {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub version: Option<String>,
    #[prost(int64, optional, tag = "3")]
    pub creation_timestamp: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub last_updated_timestamp: Option<i64>,
    #[prost(string, optional, tag = "5")]
    pub user_id: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub current_stage: Option<String>,
    #[prost(string, optional, tag = "7")]
    pub description: Option<String>,
    #[prost(string, optional, tag = "8")]
    pub source: Option<String>,
    #[prost(string, optional, tag = "9")]
    pub run_id: Option<String>,
    #[prost(enumeration = "ModelVersionStatus", optional, tag = "10")]
    pub status: Option<i32>,
    #[prost(string, optional, tag = "11")]
    pub status_message: Option<String>,
    #[prost(message, repeated, tag = "12")]
    pub tags: Vec<ModelVersionTag>,
    #[prost(string, optional, tag = "13")]
    pub run_link: Option<String>,
    #[prost(string, repeated, tag = "14")]
    pub aliases: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisteredModel {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(int64, optional, tag = "2")]
    pub creation_timestamp: Option<i64>,
    #[prost(int64, optional, tag = "3")]
    pub last_updated_timestamp: Option<i64>,
    #[prost(string, optional, tag = "4")]
    pub user_id: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub description: Option<String>,
    #[prost(message, repeated, tag = "6")]
    pub latest_versions: Vec<ModelVersion>,
    #[prost(message, repeated, tag = "7")]
    pub tags: Vec<RegisteredModelTag>,
    #[prost(message, repeated, tag = "8")]
    pub aliases: Vec<RegisteredModelAlias>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRegisteredModel {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub tags: Vec<RegisteredModelTag>,
    #[prost(string, optional, tag = "3")]
    pub description: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRegisteredModelResponse {
    #[prost(message, optional, tag = "1")]
    pub registered_model: Option<RegisteredModel>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetLatestVersions {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, repeated, tag = "2")]
    pub stages: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetLatestVersionsResponse {
    #[prost(message, repeated, tag = "1")]
    pub model_versions: Vec<ModelVersion>,
}

endpoints!(ServiceKind::ModelRegistry => {
    GetLatestVersions => GetLatestVersionsResponse,
    CreateRegisteredModel => CreateRegisteredModelResponse,
});
