//! Tracking service messages

use crate::service::ServiceKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RunStatus {
    Running = 1,
    Scheduled = 2,
    Finished = 3,
    Failed = 4,
    Killed = 5,
}

impl RunStatus {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Scheduled => "SCHEDULED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }

    /// Whether a run in this state will not change state again
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ViewType {
    ActiveOnly = 1,
    DeletedOnly = 2,
    All = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExperimentTag {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Experiment {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub artifact_location: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub lifecycle_stage: Option<String>,
    #[prost(int64, optional, tag = "5")]
    pub last_update_time: Option<i64>,
    #[prost(int64, optional, tag = "6")]
    pub creation_time: Option<i64>,
    #[prost(message, repeated, tag = "7")]
    pub tags: Vec<ExperimentTag>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metric {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(double, optional, tag = "2")]
    pub value: Option<f64>,
    #[prost(int64, optional, tag = "3")]
    pub timestamp: Option<i64>,
    #[prost(int64, optional, tag = "4")]
    pub step: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Param {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunTag {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunInfo {
    #[prost(string, optional, tag = "1")]
    pub run_uuid: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub experiment_id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub run_name: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub user_id: Option<String>,
    #[prost(enumeration = "RunStatus", optional, tag = "7")]
    pub status: Option<i32>,
    #[prost(int64, optional, tag = "8")]
    pub start_time: Option<i64>,
    #[prost(int64, optional, tag = "9")]
    pub end_time: Option<i64>,
    #[prost(string, optional, tag = "13")]
    pub artifact_uri: Option<String>,
    #[prost(string, optional, tag = "14")]
    pub lifecycle_stage: Option<String>,
    #[prost(string, optional, tag = "15")]
    pub run_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunData {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<Metric>,
    #[prost(message, repeated, tag = "2")]
    pub params: Vec<Param>,
    #[prost(message, repeated, tag = "3")]
    pub tags: Vec<RunTag>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputTag {
    #[prost(string, optional, tag = "1")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub value: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Dataset {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub digest: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub source_type: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub source: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub schema: Option<String>,
    #[prost(string, optional, tag = "6")]
    pub profile: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DatasetInput {
    #[prost(message, repeated, tag = "1")]
    pub tags: Vec<InputTag>,
    #[prost(message, optional, tag = "2")]
    pub dataset: Option<Dataset>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RunInputs {
    #[prost(message, repeated, tag = "1")]
    pub dataset_inputs: Vec<DatasetInput>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Run {
    #[prost(message, optional, tag = "1")]
    pub info: Option<RunInfo>,
    #[prost(message, optional, tag = "2")]
    pub data: Option<RunData>,
    #[prost(message, optional, tag = "3")]
    pub inputs: Option<RunInputs>,
}

// Experiments

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetExperiment {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetExperimentResponse {
    #[prost(message, optional, tag = "1")]
    pub experiment: Option<Experiment>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetExperimentByName {
    #[prost(string, optional, tag = "1")]
    pub experiment_name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetExperimentByNameResponse {
    #[prost(message, optional, tag = "1")]
    pub experiment: Option<Experiment>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateExperiment {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub artifact_location: Option<String>,
    #[prost(message, repeated, tag = "3")]
    pub tags: Vec<ExperimentTag>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateExperimentResponse {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchExperiments {
    #[prost(int64, optional, tag = "1")]
    pub max_results: Option<i64>,
    #[prost(string, optional, tag = "2")]
    pub page_token: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub filter: Option<String>,
    #[prost(string, repeated, tag = "4")]
    pub order_by: Vec<String>,
    #[prost(enumeration = "ViewType", optional, tag = "5")]
    pub view_type: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchExperimentsResponse {
    #[prost(message, repeated, tag = "1")]
    pub experiments: Vec<Experiment>,
    #[prost(string, optional, tag = "2")]
    pub next_page_token: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteExperiment {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RestoreExperiment {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateExperiment {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub new_name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetExperimentTag {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub value: Option<String>,
}

// Runs

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRun {
    #[prost(string, optional, tag = "1")]
    pub experiment_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub user_id: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub run_name: Option<String>,
    #[prost(int64, optional, tag = "7")]
    pub start_time: Option<i64>,
    #[prost(message, repeated, tag = "9")]
    pub tags: Vec<RunTag>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRunResponse {
    #[prost(message, optional, tag = "1")]
    pub run: Option<Run>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRun {
    #[prost(string, optional, tag = "1")]
    pub run_uuid: Option<String>,
    #[prost(enumeration = "RunStatus", optional, tag = "2")]
    pub status: Option<i32>,
    #[prost(int64, optional, tag = "3")]
    pub end_time: Option<i64>,
    #[prost(string, optional, tag = "4")]
    pub run_id: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub run_name: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateRunResponse {
    #[prost(message, optional, tag = "1")]
    pub run_info: Option<RunInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteRun {
    #[prost(string, optional, tag = "1")]
    pub run_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RestoreRun {
    #[prost(string, optional, tag = "1")]
    pub run_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRun {
    #[prost(string, optional, tag = "1")]
    pub run_uuid: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub run_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRunResponse {
    #[prost(message, optional, tag = "1")]
    pub run: Option<Run>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchRuns {
    #[prost(string, repeated, tag = "1")]
    pub experiment_ids: Vec<String>,
    #[prost(enumeration = "ViewType", optional, tag = "3")]
    pub run_view_type: Option<i32>,
    #[prost(string, optional, tag = "4")]
    pub filter: Option<String>,
    #[prost(int32, optional, tag = "5")]
    pub max_results: Option<i32>,
    #[prost(string, repeated, tag = "6")]
    pub order_by: Vec<String>,
    #[prost(string, optional, tag = "7")]
    pub page_token: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchRunsResponse {
    #[prost(message, repeated, tag = "1")]
    pub runs: Vec<Run>,
    #[prost(string, optional, tag = "2")]
    pub next_page_token: Option<String>,
}

// Run data

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogMetric {
    #[prost(string, optional, tag = "1")]
    pub run_uuid: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub key: Option<String>,
    #[prost(double, optional, tag = "3")]
    pub value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub timestamp: Option<i64>,
    #[prost(int64, optional, tag = "5")]
    pub step: Option<i64>,
    #[prost(string, optional, tag = "6")]
    pub run_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogParam {
    #[prost(string, optional, tag = "1")]
    pub run_uuid: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub value: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub run_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetTag {
    #[prost(string, optional, tag = "1")]
    pub run_uuid: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub key: Option<String>,
    #[prost(string, optional, tag = "3")]
    pub value: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub run_id: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeleteTag {
    #[prost(string, optional, tag = "1")]
    pub run_id: Option<String>,
    #[prost(string, optional, tag = "2")]
    pub key: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogBatch {
    #[prost(string, optional, tag = "1")]
    pub run_id: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub metrics: Vec<Metric>,
    #[prost(message, repeated, tag = "3")]
    pub params: Vec<Param>,
    #[prost(message, repeated, tag = "4")]
    pub tags: Vec<RunTag>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogInputs {
    #[prost(string, optional, tag = "1")]
    pub run_id: Option<String>,
    #[prost(message, repeated, tag = "2")]
    pub datasets: Vec<DatasetInput>,
}

empty_messages!(
    DeleteExperimentResponse,
    RestoreExperimentResponse,
    UpdateExperimentResponse,
    SetExperimentTagResponse,
    DeleteRunResponse,
    RestoreRunResponse,
    LogMetricResponse,
    LogParamResponse,
    SetTagResponse,
    DeleteTagResponse,
    LogBatchResponse,
    LogInputsResponse,
);

endpoints!(ServiceKind::Tracking => {
    GetExperimentByName => GetExperimentByNameResponse,
    CreateExperiment => CreateExperimentResponse,
    SearchExperiments => SearchExperimentsResponse,
    GetExperiment => GetExperimentResponse,
    DeleteExperiment => DeleteExperimentResponse,
    RestoreExperiment => RestoreExperimentResponse,
    UpdateExperiment => UpdateExperimentResponse,
    CreateRun => CreateRunResponse,
    UpdateRun => UpdateRunResponse,
    DeleteRun => DeleteRunResponse,
    RestoreRun => RestoreRunResponse,
    LogMetric => LogMetricResponse,
    LogParam => LogParamResponse,
    SetExperimentTag => SetExperimentTagResponse,
    SetTag => SetTagResponse,
    DeleteTag => DeleteTagResponse,
    GetRun => GetRunResponse,
    SearchRuns => SearchRunsResponse,
    LogBatch => LogBatchResponse,
    LogInputs => LogInputsResponse,
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::Endpoint;
    use prost::Message;

    #[test]
    fn test_endpoint_symbols() {
        assert_eq!(GetExperimentByName::symbol(), "TrackingServiceGetExperimentByName");
        assert_eq!(LogInputs::symbol(), "TrackingServiceLogInputs");
    }

    #[test]
    fn test_wire_tags() {
        let request = GetExperimentByName {
            experiment_name: Some("x".into()),
        };
        // field 1, length-delimited
        assert_eq!(request.encode_to_vec(), vec![0x0a, 0x01, b'x']);

        let info = RunInfo {
            run_id: Some("r".into()),
            status: Some(RunStatus::Finished as i32),
            ..Default::default()
        };
        // status is field 7 varint, run_id field 15 length-delimited
        assert_eq!(info.encode_to_vec(), vec![0x38, 0x03, 0x7a, 0x01, b'r']);
        assert_eq!(info.status(), RunStatus::Finished);
    }

    #[test]
    fn test_status_names() {
        assert_eq!(RunStatus::Killed.as_str_name(), "KILLED");
        assert!(RunStatus::Failed.is_terminated());
        assert!(!RunStatus::Running.is_terminated());
    }
}
