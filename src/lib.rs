// Ambient
pub mod config;
pub mod error;
pub mod logging;

// Native library access
pub mod interop;
pub mod service;
pub mod proxy;
pub mod wire;

// Protocol and stores
pub mod protos;
pub mod store;

// Native side of the ABI
pub mod export;

// Front ends
pub mod server;
pub mod cli;

// Re-export commonly used items
pub use config::{ConfigBlob, Settings};
pub use error::{BridgeError, ErrorCode, Result};
pub use interop::{LibraryLocator, NativeLibrary};
pub use proxy::{Endpoint, ServiceProxy};
pub use server::{with_server, with_server_timeout, Server, ServerState};
pub use service::{ServiceHandle, ServiceKind};
pub use store::{
    AugmentedStore, ModelRegistryStore, NativeModelRegistryStore, NativeTrackingStore,
    StoreOptions, TrackingStore,
};
pub use cli::cli_main;
