//! In-process reference implementation of the native service library
//!
//! Exports the same C ABI as the real library, built on `mlflow_bridge::export`, and bound
//! through a parsed header exactly like a loaded library. Thread-local hooks record returned and
//! released buffers and let a test replace the next response with canned bytes.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::{c_int, c_void};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use prost::Message;

use mlflow_bridge::config::ConfigBlob;
use mlflow_bridge::error::{BridgeError, ErrorCode, Result};
use mlflow_bridge::export::{self, HandleRegistry};
use mlflow_bridge::interop::{BindingTable, Header, NativeLibrary};
use mlflow_bridge::protos::model_registry::*;
use mlflow_bridge::protos::tracking::*;

pub const HEADER: &str = r#"
/* Code generated by cmd/cgo; DO NOT EDIT. */
typedef long long GoInt64;

#ifdef __cplusplus
extern "C" {
#endif

extern GoInt64 LaunchServer(void* configData, int configSize);
extern GoInt64 LaunchServerAsync(void* configData, int configSize);
extern GoInt64 StopServer(GoInt64 serverHandle);
extern GoInt64 CreateTrackingService(void* configData, int configSize);
extern void DestroyTrackingService(GoInt64 id);
extern void* TrackingServiceGetExperimentByName(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceCreateExperiment(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceGetExperiment(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceCreateRun(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceGetRun(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceUpdateRun(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceLogMetric(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceLogBatch(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* TrackingServiceSearchRuns(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern GoInt64 CreateModelRegistryService(void* configData, int configSize);
extern void DestroyModelRegistryService(GoInt64 id);
extern void* ModelRegistryServiceCreateRegisteredModel(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void* ModelRegistryServiceGetLatestVersions(GoInt64 serviceID, void* requestData, int requestSize, int* responseSize);
extern void FreeResponse(void* ptr);

#ifdef __cplusplus
}
#endif
"#;

// Hooks

/// Replacement for the next endpoint response on this thread
pub enum Canned {
    Bytes(Vec<u8>),
    /// Null pointer reporting `len` bytes
    Null { len: c_int },
    /// Real allocation reporting a negative length
    NegativeLength,
}

thread_local! {
    static CANNED: RefCell<Option<Canned>> = RefCell::new(None);
    static RETURNED: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    static FREED: RefCell<Vec<usize>> = RefCell::new(Vec::new());
    static DESTROYED: RefCell<Vec<i64>> = RefCell::new(Vec::new());
    static STOPS: Cell<usize> = Cell::new(0);
}

pub fn set_canned(canned: Canned) {
    CANNED.with(|slot| *slot.borrow_mut() = Some(canned));
}

/// Addresses of non-null buffers handed out on this thread
pub fn returned() -> Vec<usize> {
    RETURNED.with(|r| r.borrow().clone())
}

/// Addresses released through `FreeResponse` on this thread
pub fn freed() -> Vec<usize> {
    FREED.with(|f| f.borrow().clone())
}

/// Ids passed to a destroy function on this thread
pub fn destroyed() -> Vec<i64> {
    DESTROYED.with(|d| d.borrow().clone())
}

pub fn stop_calls() -> usize {
    STOPS.with(Cell::get)
}

pub fn reset_hooks() {
    CANNED.with(|c| *c.borrow_mut() = None);
    RETURNED.with(|r| r.borrow_mut().clear());
    FREED.with(|f| f.borrow_mut().clear());
    DESTROYED.with(|d| d.borrow_mut().clear());
    STOPS.with(|s| s.set(0));
}

// Tracking service

pub struct RefTracking {
    store_uri: String,
    artifact_root: String,
    experiments: Mutex<Vec<Experiment>>,
    runs: Mutex<Vec<Run>>,
}

fn not_found(what: &str) -> BridgeError {
    BridgeError::domain(ErrorCode::ResourceDoesNotExist, what)
}

fn invalid(message: &str) -> BridgeError {
    BridgeError::domain(ErrorCode::InvalidParameterValue, message)
}

impl RefTracking {
    fn new(store_uri: String, artifact_root: Option<String>) -> Self {
        let default = Experiment {
            experiment_id: Some("0".into()),
            name: Some("Default".into()),
            artifact_location: Some(format!("{}/0", artifact_root.as_deref().unwrap_or("mlruns"))),
            lifecycle_stage: Some("active".into()),
            ..Default::default()
        };
        Self {
            store_uri,
            artifact_root: artifact_root.unwrap_or_else(|| "mlruns".into()),
            experiments: Mutex::new(vec![default]),
            runs: Mutex::new(Vec::new()),
        }
    }

    fn get_experiment_by_name(&self, request: GetExperimentByName) -> Result<GetExperimentByNameResponse> {
        let name = request.experiment_name();
        let experiment = self
            .experiments
            .lock()
            .iter()
            .find(|e| e.name() == name)
            .cloned()
            .ok_or_else(|| not_found(&format!("Could not find experiment with name '{}'", name)))?;
        Ok(GetExperimentByNameResponse {
            experiment: Some(experiment),
        })
    }

    fn create_experiment(&self, request: CreateExperiment) -> Result<CreateExperimentResponse> {
        if request.name().is_empty() {
            return Err(invalid("Missing value for required parameter 'name'"));
        }
        let mut experiments = self.experiments.lock();
        if experiments.iter().any(|e| e.name() == request.name()) {
            return Err(BridgeError::domain(
                ErrorCode::ResourceAlreadyExists,
                format!("Experiment '{}' already exists", request.name()),
            ));
        }

        let id = experiments.len().to_string();
        experiments.push(Experiment {
            experiment_id: Some(id.clone()),
            name: request.name.clone(),
            artifact_location: Some(
                request
                    .artifact_location
                    .clone()
                    .unwrap_or_else(|| format!("{}/{}", self.artifact_root, id)),
            ),
            lifecycle_stage: Some("active".into()),
            tags: request.tags,
            ..Default::default()
        });
        Ok(CreateExperimentResponse {
            experiment_id: Some(id),
        })
    }

    fn get_experiment(&self, request: GetExperiment) -> Result<GetExperimentResponse> {
        let experiment = self
            .experiments
            .lock()
            .iter()
            .find(|e| e.experiment_id() == request.experiment_id())
            .cloned()
            .ok_or_else(|| not_found("No Experiment with id"))?;
        Ok(GetExperimentResponse {
            experiment: Some(experiment),
        })
    }

    fn create_run(&self, request: CreateRun) -> Result<CreateRunResponse> {
        let artifact_location = {
            let experiments = self.experiments.lock();
            let experiment = experiments
                .iter()
                .find(|e| e.experiment_id() == request.experiment_id())
                .ok_or_else(|| not_found("No Experiment with id"))?;
            experiment.artifact_location().to_string()
        };

        let mut runs = self.runs.lock();
        let run_id = format!("run-{}", runs.len() + 1);
        let run = Run {
            info: Some(RunInfo {
                run_uuid: Some(run_id.clone()),
                run_id: Some(run_id.clone()),
                experiment_id: request.experiment_id.clone(),
                run_name: request.run_name.clone(),
                user_id: request.user_id.clone(),
                status: Some(RunStatus::Running as i32),
                start_time: request.start_time,
                artifact_uri: Some(format!("{}/{}/artifacts", artifact_location, run_id)),
                lifecycle_stage: Some("active".into()),
                ..Default::default()
            }),
            data: Some(RunData {
                tags: request.tags,
                ..Default::default()
            }),
            inputs: Some(RunInputs::default()),
        };
        runs.push(run.clone());
        Ok(CreateRunResponse { run: Some(run) })
    }

    fn with_run<T>(&self, run_id: &str, f: impl FnOnce(&mut Run) -> T) -> Result<T> {
        let mut runs = self.runs.lock();
        let run = runs
            .iter_mut()
            .find(|run| run.info.as_ref().map(|info| info.run_id()) == Some(run_id))
            .ok_or_else(|| not_found(&format!("Run with id={} not found", run_id)))?;
        Ok(f(run))
    }

    fn get_run(&self, request: GetRun) -> Result<GetRunResponse> {
        let run_id = request.run_id.as_deref().unwrap_or(request.run_uuid());
        let run = self.with_run(run_id, |run| run.clone())?;
        Ok(GetRunResponse { run: Some(run) })
    }

    fn update_run(&self, request: UpdateRun) -> Result<UpdateRunResponse> {
        let info = self.with_run(request.run_id(), |run| {
            let info = run.info.get_or_insert_with(Default::default);
            if request.status.is_some() {
                info.status = request.status;
            }
            if request.end_time.is_some() {
                info.end_time = request.end_time;
            }
            if request.run_name.is_some() {
                info.run_name = request.run_name.clone();
            }
            info.clone()
        })?;
        Ok(UpdateRunResponse {
            run_info: Some(info),
        })
    }

    fn log_metric(&self, request: LogMetric) -> Result<LogMetricResponse> {
        if request.key().is_empty() {
            return Err(invalid("Missing value for required parameter 'key'"));
        }
        self.with_run(request.run_id(), |run| {
            run.data.get_or_insert_with(Default::default).metrics.push(Metric {
                key: request.key.clone(),
                value: request.value,
                timestamp: request.timestamp,
                step: Some(request.step()),
            })
        })?;
        Ok(LogMetricResponse {})
    }

    fn log_batch(&self, request: LogBatch) -> Result<LogBatchResponse> {
        let LogBatch {
            run_id,
            metrics,
            params,
            tags,
        } = request;
        self.with_run(run_id.as_deref().unwrap_or(""), |run| {
            let data = run.data.get_or_insert_with(Default::default);
            data.metrics.extend(metrics);
            data.params.extend(params);
            data.tags.extend(tags);
        })?;
        Ok(LogBatchResponse {})
    }

    fn search_runs(&self, request: SearchRuns) -> Result<SearchRunsResponse> {
        let offset: usize = match request.page_token.as_deref() {
            None | Some("") => 0,
            Some(token) => token.parse().map_err(|_| invalid("Invalid page token"))?,
        };
        let limit = usize::try_from(request.max_results.unwrap_or(1000)).unwrap_or(0);

        let matching: Vec<Run> = self
            .runs
            .lock()
            .iter()
            .filter(|run| {
                let experiment = run.info.as_ref().map(|info| info.experiment_id()).unwrap_or("");
                request.experiment_ids.iter().any(|id| id == experiment)
            })
            .cloned()
            .collect();

        let page: Vec<Run> = matching.iter().skip(offset).take(limit).cloned().collect();
        let next = offset + page.len();
        Ok(SearchRunsResponse {
            runs: page,
            next_page_token: (next < matching.len()).then(|| next.to_string()),
        })
    }
}

// Model registry service

pub struct RefRegistry {
    models: Mutex<Vec<RegisteredModel>>,
}

impl RefRegistry {
    fn create_registered_model(&self, request: CreateRegisteredModel) -> Result<CreateRegisteredModelResponse> {
        let mut models = self.models.lock();
        if models.iter().any(|m| m.name() == request.name()) {
            return Err(BridgeError::domain(
                ErrorCode::ResourceAlreadyExists,
                format!("Registered Model (name={}) already exists.", request.name()),
            ));
        }
        let model = RegisteredModel {
            name: request.name,
            creation_timestamp: Some(1),
            last_updated_timestamp: Some(1),
            description: request.description,
            tags: request.tags,
            ..Default::default()
        };
        models.push(model.clone());
        Ok(CreateRegisteredModelResponse {
            registered_model: Some(model),
        })
    }

    fn get_latest_versions(&self, request: GetLatestVersions) -> Result<GetLatestVersionsResponse> {
        let models = self.models.lock();
        let model = models
            .iter()
            .find(|m| m.name() == request.name())
            .ok_or_else(|| not_found(&format!("Registered Model with name={} not found", request.name())))?;
        Ok(GetLatestVersionsResponse {
            model_versions: model
                .latest_versions
                .iter()
                .filter(|v| request.stages.is_empty() || request.stages.iter().any(|s| s == v.current_stage()))
                .cloned()
                .collect(),
        })
    }
}

static TRACKING: Lazy<HandleRegistry<RefTracking>> = Lazy::new(HandleRegistry::new);
static REGISTRY: Lazy<HandleRegistry<RefRegistry>> = Lazy::new(HandleRegistry::new);

unsafe fn serve<S, Req, Resp, F>(
    registry: &HandleRegistry<S>,
    id: i64,
    data: *const c_void,
    size: c_int,
    response_size: *mut c_int,
    handler: F,
) -> *mut c_void
where
    Req: Message + Default,
    Resp: Message,
    F: FnOnce(&S, Req) -> Result<Resp>,
{
    let ptr = match CANNED.with(|slot| slot.borrow_mut().take()) {
        Some(Canned::Bytes(bytes)) => export::write_bytes(&bytes, response_size),
        Some(Canned::Null { len }) => {
            *response_size = len;
            std::ptr::null_mut()
        }
        Some(Canned::NegativeLength) => {
            let ptr = export::write_bytes(b"junk", response_size);
            *response_size = -4;
            ptr
        }
        None => export::respond(data, size, response_size, |request: Req| {
            registry.with(id, |service| handler(service, request))
        }),
    };
    if !ptr.is_null() {
        RETURNED.with(|r| r.borrow_mut().push(ptr as usize));
    }
    ptr
}

macro_rules! endpoint_fns {
    ($registry:ident { $($symbol:ident => $method:path),* $(,)? }) => {
        $(
            extern "C" fn $symbol(
                id: i64,
                data: *const c_void,
                size: c_int,
                response_size: *mut c_int,
            ) -> *mut c_void {
                unsafe { serve(&$registry, id, data, size, response_size, $method) }
            }
        )*
    };
}

endpoint_fns!(TRACKING {
    tracking_get_experiment_by_name => RefTracking::get_experiment_by_name,
    tracking_create_experiment => RefTracking::create_experiment,
    tracking_get_experiment => RefTracking::get_experiment,
    tracking_create_run => RefTracking::create_run,
    tracking_get_run => RefTracking::get_run,
    tracking_update_run => RefTracking::update_run,
    tracking_log_metric => RefTracking::log_metric,
    tracking_log_batch => RefTracking::log_batch,
    tracking_search_runs => RefTracking::search_runs,
});

endpoint_fns!(REGISTRY {
    registry_create_registered_model => RefRegistry::create_registered_model,
    registry_get_latest_versions => RefRegistry::get_latest_versions,
});

extern "C" fn create_tracking(data: *const c_void, size: c_int) -> i64 {
    let config = unsafe { export::input_bytes(data, size) };
    TRACKING.create(config, |config| {
        let store_uri = config
            .tracking_store_uri
            .ok_or_else(|| BridgeError::Config("tracking_store_uri is required".into()))?;
        Ok(RefTracking::new(store_uri, config.default_artifact_root))
    })
}

extern "C" fn destroy_tracking(id: i64) {
    DESTROYED.with(|d| d.borrow_mut().push(id));
    TRACKING.destroy(id);
}

extern "C" fn create_registry(data: *const c_void, size: c_int) -> i64 {
    let config = unsafe { export::input_bytes(data, size) };
    REGISTRY.create(config, |config| {
        config
            .model_registry_store_uri
            .ok_or_else(|| BridgeError::Config("model_registry_store_uri is required".into()))?;
        Ok(RefRegistry {
            models: Mutex::new(Vec::new()),
        })
    })
}

extern "C" fn destroy_registry(id: i64) {
    DESTROYED.with(|d| d.borrow_mut().push(id));
    REGISTRY.destroy(id);
}

extern "C" fn free_response(ptr: *mut c_void) {
    FREED.with(|f| f.borrow_mut().push(ptr as usize));
    unsafe { export::free_response(ptr) };
}

// Server

/// Accepts connections on the configured address until stopped
pub struct FakeServer {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

static SERVERS: Lazy<HandleRegistry<FakeServer>> = Lazy::new(HandleRegistry::new);

extern "C" fn launch_server(data: *const c_void, size: c_int) -> i64 {
    let config = unsafe { export::input_bytes(data, size) };
    match ConfigBlob::from_bytes(config) {
        Ok(config) if config.address.is_some() => 0,
        _ => -1,
    }
}

extern "C" fn launch_server_async(data: *const c_void, size: c_int) -> i64 {
    let config = unsafe { export::input_bytes(data, size) };
    SERVERS.create(config, |config| {
        let address = config
            .address
            .ok_or_else(|| BridgeError::Config("address is required".into()))?;
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::spawn(move || {
            // not listening right away, like a server still initializing
            thread::sleep(Duration::from_millis(250));
            let listener = match TcpListener::bind(&address) {
                Ok(listener) => listener,
                Err(_) => return,
            };
            let _ = listener.set_nonblocking(true);
            while !flag.load(Ordering::SeqCst) {
                let _ = listener.accept();
                thread::sleep(Duration::from_millis(10));
            }
        });

        Ok(FakeServer {
            stop,
            thread: Some(thread),
        })
    })
}

pub extern "C" fn launch_fails(_data: *const c_void, _size: c_int) -> i64 {
    -3
}

extern "C" fn stop_server(id: i64) -> i64 {
    STOPS.with(|s| s.set(s.get() + 1));
    match SERVERS.destroy(id) {
        Some(_) => 0,
        None => 1,
    }
}

pub extern "C" fn stop_fails(_id: i64) -> i64 {
    STOPS.with(|s| s.set(s.get() + 1));
    7
}

fn symbols() -> HashMap<&'static str, *const ()> {
    HashMap::from([
        ("LaunchServer", launch_server as *const ()),
        ("LaunchServerAsync", launch_server_async as *const ()),
        ("StopServer", stop_server as *const ()),
        ("CreateTrackingService", create_tracking as *const ()),
        ("DestroyTrackingService", destroy_tracking as *const ()),
        ("TrackingServiceGetExperimentByName", tracking_get_experiment_by_name as *const ()),
        ("TrackingServiceCreateExperiment", tracking_create_experiment as *const ()),
        ("TrackingServiceGetExperiment", tracking_get_experiment as *const ()),
        ("TrackingServiceCreateRun", tracking_create_run as *const ()),
        ("TrackingServiceGetRun", tracking_get_run as *const ()),
        ("TrackingServiceUpdateRun", tracking_update_run as *const ()),
        ("TrackingServiceLogMetric", tracking_log_metric as *const ()),
        ("TrackingServiceLogBatch", tracking_log_batch as *const ()),
        ("TrackingServiceSearchRuns", tracking_search_runs as *const ()),
        ("CreateModelRegistryService", create_registry as *const ()),
        ("DestroyModelRegistryService", destroy_registry as *const ()),
        ("ModelRegistryServiceCreateRegisteredModel", registry_create_registered_model as *const ()),
        ("ModelRegistryServiceGetLatestVersions", registry_get_latest_versions as *const ()),
        ("FreeResponse", free_response as *const ()),
    ])
}

/// The reference library
pub fn library() -> Arc<NativeLibrary> {
    library_with(&[])
}

/// The reference library with some symbols bound to other functions
pub fn library_with(overrides: &[(&'static str, *const ())]) -> Arc<NativeLibrary> {
    let header = Header::parse(HEADER).expect("reference header parses");
    let mut symbols = symbols();
    symbols.extend(overrides.iter().copied());
    let bindings = BindingTable::from_header(&header, |name| symbols.get(name).copied())
        .expect("reference bindings");
    Arc::new(NativeLibrary::from_bindings(bindings))
}

/// A loopback address nothing listens on yet
pub fn free_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local address").to_string()
}
