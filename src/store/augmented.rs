//! A native store composed with a complete fallback store

use tracing::trace;

use super::model_registry::ModelRegistryStore;
use super::tracking::{ExperimentSearch, NewRun, Page, RunSearch, TrackingStore};
use super::StoreOptions;
use crate::error::{BridgeError, Result};
use crate::protos::model_registry::{ModelVersion, RegisteredModel, RegisteredModelTag};
use crate::protos::tracking::*;

/// Routes each operation to the native store, or to `fallback` when the native store is
/// disabled or does not support the operation
///
/// Errors other than [`BridgeError::Unsupported`] from the native store are returned as they
/// are; they are not retried against the fallback.
#[derive(Debug)]
pub struct AugmentedStore<N, F> {
    native: Option<N>,
    fallback: F,
}

impl<N, F> AugmentedStore<N, F> {
    pub fn new(native: N, fallback: F) -> Self {
        Self {
            native: Some(native),
            fallback,
        }
    }

    /// Only the fallback serves requests
    pub fn fallback_only(fallback: F) -> Self {
        Self {
            native: None,
            fallback,
        }
    }

    /// Build the native store only when `options` enable it
    pub fn with_options<B>(options: &StoreOptions, fallback: F, build_native: B) -> Result<Self>
    where
        B: FnOnce() -> Result<N>,
    {
        let native = if options.native_enabled {
            Some(build_native()?)
        } else {
            None
        };
        Ok(Self { native, fallback })
    }

    pub fn native(&self) -> Option<&N> {
        self.native.as_ref()
    }

    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    fn route<T>(
        &self,
        operation: &'static str,
        native: impl FnOnce(&N) -> Result<T>,
        fallback: impl FnOnce(&F) -> Result<T>,
    ) -> Result<T> {
        if let Some(store) = &self.native {
            match native(store) {
                Err(BridgeError::Unsupported(_)) => {
                    trace!(operation, "Native store does not support operation");
                }
                result => return result,
            }
        }
        fallback(&self.fallback)
    }
}

macro_rules! routed {
    ($($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*) => {
        $(
            fn $name(&self, $($arg: $ty),*) -> Result<$ret> {
                self.route(
                    stringify!($name),
                    |store| store.$name($($arg),*),
                    |store| store.$name($($arg),*),
                )
            }
        )*
    };
}

impl<N: TrackingStore, F: TrackingStore> TrackingStore for AugmentedStore<N, F> {
    routed! {
        get_experiment(experiment_id: &str) -> Experiment;
        get_experiment_by_name(name: &str) -> Option<Experiment>;
        create_experiment(name: &str, artifact_location: Option<&str>, tags: &[ExperimentTag]) -> String;
        search_experiments(search: &ExperimentSearch) -> Page<Experiment>;
        delete_experiment(experiment_id: &str) -> ();
        restore_experiment(experiment_id: &str) -> ();
        rename_experiment(experiment_id: &str, new_name: &str) -> ();
        set_experiment_tag(experiment_id: &str, tag: &ExperimentTag) -> ();
        create_run(run: &NewRun) -> Run;
        get_run(run_id: &str) -> Run;
        update_run_info(run_id: &str, status: RunStatus, end_time: Option<i64>, run_name: Option<&str>) -> RunInfo;
        delete_run(run_id: &str) -> ();
        restore_run(run_id: &str) -> ();
        search_runs(search: &RunSearch) -> Page<Run>;
        log_metric(run_id: &str, metric: &Metric) -> ();
        log_param(run_id: &str, param: &Param) -> ();
        set_tag(run_id: &str, tag: &RunTag) -> ();
        delete_tag(run_id: &str, key: &str) -> ();
        log_batch(run_id: &str, metrics: &[Metric], params: &[Param], tags: &[RunTag]) -> ();
        log_inputs(run_id: &str, datasets: &[DatasetInput]) -> ();
    }
}

impl<N: ModelRegistryStore, F: ModelRegistryStore> ModelRegistryStore for AugmentedStore<N, F> {
    routed! {
        get_latest_versions(name: &str, stages: &[String]) -> Vec<ModelVersion>;
        create_registered_model(name: &str, tags: &[RegisteredModelTag], description: Option<&str>) -> RegisteredModel;
    }
}
