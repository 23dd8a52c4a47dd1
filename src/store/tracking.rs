//! Tracking store operations and their native implementation

use std::sync::Arc;

use tracing::debug;

use super::{resolve_uri_if_local, StoreOptions};
use crate::config::ConfigBlob;
use crate::error::{BridgeError, Result};
use crate::interop::NativeLibrary;
use crate::protos::tracking::*;
use crate::proxy::ServiceProxy;
use crate::service::ServiceKind;

/// One page of search results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page
    pub next_page_token: Option<String>,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, token: Option<String>) -> Self {
        Self {
            items,
            next_page_token: token.filter(|token| !token.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExperimentSearch {
    pub view_type: Option<ViewType>,
    pub max_results: Option<i64>,
    pub filter: Option<String>,
    pub order_by: Vec<String>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunSearch {
    pub experiment_ids: Vec<String>,
    pub filter: Option<String>,
    pub view_type: Option<ViewType>,
    pub max_results: Option<i32>,
    pub order_by: Vec<String>,
    pub page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewRun {
    pub experiment_id: String,
    pub user_id: Option<String>,
    pub start_time: Option<i64>,
    pub tags: Vec<RunTag>,
    pub run_name: Option<String>,
}

/// Operations of a tracking store
pub trait TrackingStore {
    fn get_experiment(&self, _experiment_id: &str) -> Result<Experiment> {
        Err(BridgeError::Unsupported("get_experiment"))
    }

    /// The experiment called `name`, or `None` when there is none
    fn get_experiment_by_name(&self, _name: &str) -> Result<Option<Experiment>> {
        Err(BridgeError::Unsupported("get_experiment_by_name"))
    }

    /// Create an experiment and return its id
    fn create_experiment(
        &self,
        _name: &str,
        _artifact_location: Option<&str>,
        _tags: &[ExperimentTag],
    ) -> Result<String> {
        Err(BridgeError::Unsupported("create_experiment"))
    }

    fn search_experiments(&self, _search: &ExperimentSearch) -> Result<Page<Experiment>> {
        Err(BridgeError::Unsupported("search_experiments"))
    }

    fn delete_experiment(&self, _experiment_id: &str) -> Result<()> {
        Err(BridgeError::Unsupported("delete_experiment"))
    }

    fn restore_experiment(&self, _experiment_id: &str) -> Result<()> {
        Err(BridgeError::Unsupported("restore_experiment"))
    }

    fn rename_experiment(&self, _experiment_id: &str, _new_name: &str) -> Result<()> {
        Err(BridgeError::Unsupported("rename_experiment"))
    }

    fn set_experiment_tag(&self, _experiment_id: &str, _tag: &ExperimentTag) -> Result<()> {
        Err(BridgeError::Unsupported("set_experiment_tag"))
    }

    fn create_run(&self, _run: &NewRun) -> Result<Run> {
        Err(BridgeError::Unsupported("create_run"))
    }

    fn get_run(&self, _run_id: &str) -> Result<Run> {
        Err(BridgeError::Unsupported("get_run"))
    }

    fn update_run_info(
        &self,
        _run_id: &str,
        _status: RunStatus,
        _end_time: Option<i64>,
        _run_name: Option<&str>,
    ) -> Result<RunInfo> {
        Err(BridgeError::Unsupported("update_run_info"))
    }

    fn delete_run(&self, _run_id: &str) -> Result<()> {
        Err(BridgeError::Unsupported("delete_run"))
    }

    fn restore_run(&self, _run_id: &str) -> Result<()> {
        Err(BridgeError::Unsupported("restore_run"))
    }

    fn search_runs(&self, _search: &RunSearch) -> Result<Page<Run>> {
        Err(BridgeError::Unsupported("search_runs"))
    }

    fn log_metric(&self, _run_id: &str, _metric: &Metric) -> Result<()> {
        Err(BridgeError::Unsupported("log_metric"))
    }

    fn log_param(&self, _run_id: &str, _param: &Param) -> Result<()> {
        Err(BridgeError::Unsupported("log_param"))
    }

    fn set_tag(&self, _run_id: &str, _tag: &RunTag) -> Result<()> {
        Err(BridgeError::Unsupported("set_tag"))
    }

    fn delete_tag(&self, _run_id: &str, _key: &str) -> Result<()> {
        Err(BridgeError::Unsupported("delete_tag"))
    }

    fn log_batch(
        &self,
        _run_id: &str,
        _metrics: &[Metric],
        _params: &[Param],
        _tags: &[RunTag],
    ) -> Result<()> {
        Err(BridgeError::Unsupported("log_batch"))
    }

    fn log_inputs(&self, _run_id: &str, _datasets: &[DatasetInput]) -> Result<()> {
        Err(BridgeError::Unsupported("log_inputs"))
    }
}

/// Tracking store served by the native tracking service
#[derive(Debug)]
pub struct NativeTrackingStore {
    proxy: ServiceProxy,
}

impl NativeTrackingStore {
    /// Create a tracking service for `store_uri`
    ///
    /// A local `default_artifact_root` is turned into a `file://` URI first.
    pub fn open(
        library: Arc<NativeLibrary>,
        store_uri: &str,
        default_artifact_root: Option<&str>,
        options: &StoreOptions,
    ) -> Result<Self> {
        let mut config = ConfigBlob::tracking(store_uri).with_log_level(options.log_level_name());
        if let Some(root) = default_artifact_root {
            config = config.with_default_artifact_root(resolve_uri_if_local(root)?);
        }

        let proxy = ServiceProxy::create(library, ServiceKind::Tracking, &config)?;
        debug!(store_uri, id = proxy.handle().id(), "Opened native tracking store");
        Ok(Self { proxy })
    }

    pub fn from_proxy(proxy: ServiceProxy) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &ServiceProxy {
        &self.proxy
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| BridgeError::Protocol(format!("response is missing `{}`", field)))
}

impl TrackingStore for NativeTrackingStore {
    fn get_experiment(&self, experiment_id: &str) -> Result<Experiment> {
        let response = self.proxy.call(&GetExperiment {
            experiment_id: Some(experiment_id.to_string()),
        })?;
        required(response.experiment, "experiment")
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>> {
        let request = GetExperimentByName {
            experiment_name: Some(name.to_string()),
        };
        match self.proxy.call(&request) {
            Ok(response) => required(response.experiment, "experiment").map(Some),
            Err(e) if e.is_resource_missing() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create_experiment(
        &self,
        name: &str,
        artifact_location: Option<&str>,
        tags: &[ExperimentTag],
    ) -> Result<String> {
        let response = self.proxy.call(&CreateExperiment {
            name: Some(name.to_string()),
            artifact_location: artifact_location.map(str::to_string),
            tags: tags.to_vec(),
        })?;
        required(response.experiment_id, "experiment_id")
    }

    fn search_experiments(&self, search: &ExperimentSearch) -> Result<Page<Experiment>> {
        let response = self.proxy.call(&SearchExperiments {
            max_results: search.max_results,
            page_token: search.page_token.clone(),
            filter: search.filter.clone(),
            order_by: search.order_by.clone(),
            view_type: search.view_type.map(|view| view as i32),
        })?;
        Ok(Page::new(response.experiments, response.next_page_token))
    }

    fn delete_experiment(&self, experiment_id: &str) -> Result<()> {
        self.proxy.call(&DeleteExperiment {
            experiment_id: Some(experiment_id.to_string()),
        })?;
        Ok(())
    }

    fn restore_experiment(&self, experiment_id: &str) -> Result<()> {
        self.proxy.call(&RestoreExperiment {
            experiment_id: Some(experiment_id.to_string()),
        })?;
        Ok(())
    }

    fn rename_experiment(&self, experiment_id: &str, new_name: &str) -> Result<()> {
        self.proxy.call(&UpdateExperiment {
            experiment_id: Some(experiment_id.to_string()),
            new_name: Some(new_name.to_string()),
        })?;
        Ok(())
    }

    fn set_experiment_tag(&self, experiment_id: &str, tag: &ExperimentTag) -> Result<()> {
        self.proxy.call(&SetExperimentTag {
            experiment_id: Some(experiment_id.to_string()),
            key: tag.key.clone(),
            value: tag.value.clone(),
        })?;
        Ok(())
    }

    fn create_run(&self, run: &NewRun) -> Result<Run> {
        let response = self.proxy.call(&CreateRun {
            experiment_id: Some(run.experiment_id.clone()),
            user_id: run.user_id.clone(),
            run_name: run.run_name.clone(),
            start_time: run.start_time,
            tags: run.tags.clone(),
        })?;
        required(response.run, "run")
    }

    fn get_run(&self, run_id: &str) -> Result<Run> {
        let response = self.proxy.call(&GetRun {
            run_uuid: Some(run_id.to_string()),
            run_id: Some(run_id.to_string()),
        })?;
        required(response.run, "run")
    }

    fn update_run_info(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
        run_name: Option<&str>,
    ) -> Result<RunInfo> {
        let response = self.proxy.call(&UpdateRun {
            run_uuid: Some(run_id.to_string()),
            status: Some(status as i32),
            end_time,
            run_id: Some(run_id.to_string()),
            run_name: run_name.map(str::to_string),
        })?;
        required(response.run_info, "run_info")
    }

    fn delete_run(&self, run_id: &str) -> Result<()> {
        self.proxy.call(&DeleteRun {
            run_id: Some(run_id.to_string()),
        })?;
        Ok(())
    }

    fn restore_run(&self, run_id: &str) -> Result<()> {
        self.proxy.call(&RestoreRun {
            run_id: Some(run_id.to_string()),
        })?;
        Ok(())
    }

    fn search_runs(&self, search: &RunSearch) -> Result<Page<Run>> {
        let response = self.proxy.call(&SearchRuns {
            experiment_ids: search.experiment_ids.clone(),
            run_view_type: search.view_type.map(|view| view as i32),
            filter: search.filter.clone(),
            max_results: search.max_results,
            order_by: search.order_by.clone(),
            page_token: search.page_token.clone(),
        })?;
        Ok(Page::new(response.runs, response.next_page_token))
    }

    fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<()> {
        self.proxy.call(&LogMetric {
            run_uuid: None,
            key: metric.key.clone(),
            value: metric.value,
            timestamp: metric.timestamp,
            step: metric.step,
            run_id: Some(run_id.to_string()),
        })?;
        Ok(())
    }

    fn log_param(&self, run_id: &str, param: &Param) -> Result<()> {
        self.proxy.call(&LogParam {
            run_uuid: None,
            key: param.key.clone(),
            value: param.value.clone(),
            run_id: Some(run_id.to_string()),
        })?;
        Ok(())
    }

    fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<()> {
        self.proxy.call(&SetTag {
            run_uuid: None,
            key: tag.key.clone(),
            value: tag.value.clone(),
            run_id: Some(run_id.to_string()),
        })?;
        Ok(())
    }

    fn delete_tag(&self, run_id: &str, key: &str) -> Result<()> {
        self.proxy.call(&DeleteTag {
            run_id: Some(run_id.to_string()),
            key: Some(key.to_string()),
        })?;
        Ok(())
    }

    fn log_batch(
        &self,
        run_id: &str,
        metrics: &[Metric],
        params: &[Param],
        tags: &[RunTag],
    ) -> Result<()> {
        self.proxy.call(&LogBatch {
            run_id: Some(run_id.to_string()),
            metrics: metrics.to_vec(),
            params: params.to_vec(),
            tags: tags.to_vec(),
        })?;
        Ok(())
    }

    fn log_inputs(&self, run_id: &str, datasets: &[DatasetInput]) -> Result<()> {
        self.proxy.call(&LogInputs {
            run_id: Some(run_id.to_string()),
            datasets: datasets.to_vec(),
        })?;
        Ok(())
    }
}
