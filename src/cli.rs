//! Command-line front end
//!
//! `mlflow-bridge server` accepts the tracking server's flags, translates them into a
//! configuration blob, and runs the native server in the foreground. Endpoints the native server
//! does not implement are forwarded to a delegate server it launches from `python_command`.

use std::net::TcpListener;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use crate::config::{parse_go_duration, ConfigBlob, ServerSettings, Settings};
use crate::error::{BridgeError, Result};
use crate::interop::{build_library, LibraryLocator, NativeLibrary};
use crate::logging;
use crate::server;
use crate::store::{is_local_uri, resolve_uri_if_local};

const DEFAULT_BACKEND_STORE: &str = "./mlruns";
const DEFAULT_ARTIFACTS_URI: &str = "mlflow-artifacts:/";
const DELEGATE_HOST: &str = "127.0.0.1";

#[derive(Parser, Debug)]
#[command(name = "mlflow-bridge", version)]
#[command(about = "MLflow tracking server on the native service library", long_about = None)]
pub struct Cli {
    /// Log level for this process (trace, debug, info, warning, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Write JSON logs to this directory instead of stderr
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Settings file; `mlflow-bridge.toml` is looked up from the current directory otherwise
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the tracking server
    Server(ServerArgs),
    /// Build the native library from a source tree
    BuildLib {
        /// Source directory containing `pkg/lib`
        src: PathBuf,
        /// Output directory for the library and its header
        out: PathBuf,
    },
    /// Print a settings file with every default spelled out
    DefaultConfig,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ServerArgs {
    /// URI of the tracking backend store
    #[arg(long)]
    pub backend_store_uri: Option<String>,

    /// URI of the model registry store; defaults to the backend store
    #[arg(long)]
    pub registry_store_uri: Option<String>,

    /// Root for artifacts of new experiments
    #[arg(long)]
    pub default_artifact_root: Option<String>,

    /// Proxy artifact requests through the server (the default)
    #[arg(long, overrides_with = "no_serve_artifacts")]
    pub serve_artifacts: bool,

    /// Do not proxy artifact requests
    #[arg(long, overrides_with = "serve_artifacts")]
    pub no_serve_artifacts: bool,

    /// Serve artifact requests only
    #[arg(long)]
    pub artifacts_only: bool,

    /// Destination of proxied artifacts
    #[arg(long)]
    pub artifacts_destination: Option<String>,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = 5000)]
    pub port: u16,

    #[arg(short, long)]
    pub workers: Option<u32>,

    #[arg(long)]
    pub static_prefix: Option<String>,

    #[arg(long)]
    pub gunicorn_opts: Option<String>,

    #[arg(long)]
    pub waitress_opts: Option<String>,

    #[arg(long)]
    pub expose_prometheus: Option<String>,

    #[arg(long)]
    pub app_name: Option<String>,

    #[arg(long)]
    pub dev: bool,

    /// Options for the native server: key=value[,key=value...]
    #[arg(long)]
    pub go_opts: Option<String>,

    /// Directory of the web UI's static files
    #[arg(long)]
    pub static_folder: Option<PathBuf>,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            backend_store_uri: None,
            registry_store_uri: None,
            default_artifact_root: None,
            serve_artifacts: false,
            no_serve_artifacts: false,
            artifacts_only: false,
            artifacts_destination: None,
            host: "127.0.0.1".to_string(),
            port: 5000,
            workers: None,
            static_prefix: None,
            gunicorn_opts: None,
            waitress_opts: None,
            expose_prometheus: None,
            app_name: None,
            dev: false,
            go_opts: None,
            static_folder: None,
        }
    }
}

impl ServerArgs {
    pub fn serves_artifacts(&self) -> bool {
        !self.no_serve_artifacts
    }

    pub fn backend_store(&self) -> &str {
        self.backend_store_uri.as_deref().unwrap_or(DEFAULT_BACKEND_STORE)
    }

    /// Command line of the delegate server, listening on `127.0.0.1:<delegate_port>`
    pub fn delegate_command(&self, program: &str, delegate_port: u16) -> Vec<String> {
        let port = delegate_port.to_string();
        let options: [(&str, Flag<'_>); 15] = [
            ("backend_store_uri", Flag::Value(Some(self.backend_store()))),
            ("registry_store_uri", Flag::Value(self.registry_store_uri.as_deref())),
            ("default_artifact_root", Flag::Value(self.default_artifact_root.as_deref())),
            ("serve_artifacts", Flag::Switch(self.serves_artifacts())),
            ("artifacts_only", Flag::Switch(self.artifacts_only)),
            ("artifacts_destination", Flag::Value(self.artifacts_destination.as_deref())),
            ("host", Flag::Value(Some(DELEGATE_HOST))),
            ("port", Flag::Value(Some(port.as_str()))),
            ("workers", Flag::Owned(self.workers.map(|w| w.to_string()))),
            ("static_prefix", Flag::Value(self.static_prefix.as_deref())),
            ("gunicorn_opts", Flag::Value(self.gunicorn_opts.as_deref())),
            ("waitress_opts", Flag::Value(self.waitress_opts.as_deref())),
            ("expose_prometheus", Flag::Value(self.expose_prometheus.as_deref())),
            ("app_name", Flag::Value(self.app_name.as_deref())),
            ("dev", Flag::Switch(self.dev)),
        ];

        let mut command = vec![program.to_string(), "server".to_string()];
        for (name, flag) in options {
            let option = format!("--{}", name.replace('_', "-"));
            match flag {
                Flag::Switch(true) => command.push(option),
                Flag::Switch(false) | Flag::Value(None) | Flag::Owned(None) => {}
                Flag::Value(Some(value)) => command.extend([option, value.to_string()]),
                Flag::Owned(Some(value)) => command.extend([option, value]),
            }
        }
        command
    }

    /// Configuration blob for the native server
    pub fn to_config(&self, settings: &ServerSettings, delegate_port: u16) -> Result<ConfigBlob> {
        let opts = GoOpts::from_settings(settings).apply(self.go_opts.as_deref().unwrap_or(""))?;
        let tracking_store = self.backend_store().to_string();

        let static_folder = self
            .static_folder
            .clone()
            .or_else(|| settings.static_folder.clone())
            .map(|dir| path_string(&dir))
            .transpose()?;

        Ok(ConfigBlob {
            address: Some(format!("{}:{}", self.host, self.port)),
            default_artifact_root: Some(resolve_default_artifact_root(
                self.serves_artifacts(),
                self.default_artifact_root.as_deref(),
                &tracking_store,
            )?),
            log_level: Some(opts.log_level),
            model_registry_store_uri: Some(
                self.registry_store_uri
                    .clone()
                    .unwrap_or_else(|| tracking_store.clone()),
            ),
            python_address: Some(
                opts.python_address
                    .unwrap_or_else(|| format!("{}:{}", DELEGATE_HOST, delegate_port)),
            ),
            python_command: opts
                .python_command
                .unwrap_or_else(|| self.delegate_command(&settings.python_program, delegate_port)),
            python_env: opts.python_env.unwrap_or_else(|| settings.python_env.clone()),
            shutdown_timeout: Some(opts.shutdown_timeout),
            static_folder,
            tracking_store_uri: Some(tracking_store),
            version: Some(
                settings
                    .version
                    .clone()
                    .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            ),
        })
    }
}

enum Flag<'a> {
    Switch(bool),
    Value(Option<&'a str>),
    Owned(Option<String>),
}

/// Options passed through `--go-opts`
#[derive(Debug, Clone, PartialEq)]
pub struct GoOpts {
    pub log_level: String,
    pub shutdown_timeout: std::time::Duration,
    pub python_address: Option<String>,
    pub python_command: Option<Vec<String>>,
    pub python_env: Option<Vec<String>>,
}

impl Default for GoOpts {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl GoOpts {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            log_level: settings.log_level.clone(),
            shutdown_timeout: parse_go_duration(&settings.shutdown_timeout)
                .unwrap_or(std::time::Duration::from_secs(60)),
            python_address: None,
            python_command: None,
            python_env: None,
        }
    }

    /// Parse `key=value[,key=value...]` with the defaults of [`GoOpts::default`]
    pub fn parse(input: &str) -> Result<Self> {
        Self::default().apply(input)
    }

    /// Override fields from `key=value[,key=value...]`
    pub fn apply(mut self, input: &str) -> Result<Self> {
        for option in input.split(',').map(str::trim).filter(|o| !o.is_empty()) {
            let (key, value) = option.split_once('=').ok_or_else(|| {
                BridgeError::Config(format!("go option '{}' is not of the form key=value", option))
            })?;

            match key.trim() {
                "log_level" => {
                    if logging::parse_level(value).is_none() {
                        return Err(BridgeError::Config(format!("unknown log level '{}'", value)));
                    }
                    self.log_level = value.to_string();
                }
                "shutdown_timeout" => {
                    self.shutdown_timeout = parse_go_duration(value)
                        .map_err(|e| BridgeError::Config(format!("shutdown_timeout: {}", e)))?;
                }
                "python_address" => self.python_address = Some(value.to_string()),
                "python_command" => self.python_command = Some(split_words(value)),
                "python_env" => {
                    let env = split_words(value);
                    if let Some(bad) = env.iter().find(|entry| !entry.contains('=')) {
                        return Err(BridgeError::Config(format!(
                            "python_env entry '{}' is not of the form KEY=VALUE",
                            bad
                        )));
                    }
                    self.python_env = Some(env);
                }
                other => {
                    return Err(BridgeError::Config(format!("unknown go option '{}'", other)));
                }
            }
        }
        Ok(self)
    }
}

fn split_words(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

/// Artifact root for new experiments
///
/// An explicit root wins. Otherwise artifacts go through the proxy when it is enabled, next to a
/// local backend store, or under `./mlruns`.
pub fn resolve_default_artifact_root(
    serve_artifacts: bool,
    default_artifact_root: Option<&str>,
    backend_store_uri: &str,
) -> Result<String> {
    match default_artifact_root {
        Some(root) if !root.is_empty() => Ok(root.to_string()),
        _ if serve_artifacts => Ok(DEFAULT_ARTIFACTS_URI.to_string()),
        _ if is_local_uri(backend_store_uri) => Ok(backend_store_uri.to_string()),
        _ => resolve_uri_if_local(DEFAULT_BACKEND_STORE),
    }
}

/// An ephemeral port on the loopback interface that was free a moment ago
pub fn safe_port() -> Result<u16> {
    let listener = TcpListener::bind((DELEGATE_HOST, 0))?;
    Ok(listener.local_addr()?.port())
}

fn path_string(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    absolute
        .to_str()
        .map(|text| text.replace('\\', "/"))
        .ok_or_else(|| BridgeError::Config(format!("path {} is not valid UTF-8", absolute.display())))
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load(path),
        None => Settings::discover(&std::env::current_dir()?),
    }
}

/// Run the command line
pub fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Server(args) => {
            let config = args.to_config(&settings.server, safe_port()?)?;
            debug!(?config, "Server configuration");

            let located = LibraryLocator::from_settings(&settings.library).locate_or_build()?;
            let library = NativeLibrary::open(&located.path)?;
            server::run_blocking(&library, &config)
        }
        Command::BuildLib { src, out } => {
            let path = build_library(&src, &out)?;
            info!(path = %path.display(), "Built native library");
            println!("{}", path.display());
            Ok(())
        }
        Command::DefaultConfig => {
            print!("{}", Settings::generate_default());
            Ok(())
        }
    }
}

/// Entry point for the CLI binary
pub fn cli_main() -> Result<()> {
    let cli = Cli::parse();

    let level = logging::parse_level(&cli.log_level).ok_or_else(|| {
        BridgeError::Config(format!("unknown log level '{}'", cli.log_level))
    })?;
    let _guard = match &cli.log_dir {
        Some(dir) => logging::init_file_logging(dir, level),
        None => logging::init_cli_logging(level),
    };

    run(cli)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn server_args(args: &[&str]) -> ServerArgs {
        let argv = ["mlflow-bridge", "server"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Server(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_go_opts_defaults() {
        let opts = GoOpts::parse("").unwrap();
        assert_eq!(opts.log_level, "INFO");
        assert_eq!(opts.shutdown_timeout, Duration::from_secs(60));
        assert_eq!(opts.python_command, None);
    }

    #[test]
    fn test_go_opts_values() {
        let opts = GoOpts::parse(
            "log_level=DEBUG,shutdown_timeout=5s,python_command=mlflow server --port 5001,python_env=A=1 B=2",
        )
        .unwrap();

        assert_eq!(opts.log_level, "DEBUG");
        assert_eq!(opts.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(
            opts.python_command,
            Some(vec!["mlflow".into(), "server".into(), "--port".into(), "5001".into()])
        );
        assert_eq!(opts.python_env, Some(vec!["A=1".into(), "B=2".into()]));
    }

    #[test]
    fn test_go_opts_errors() {
        assert!(matches!(GoOpts::parse("log_level"), Err(BridgeError::Config(_))));
        assert!(matches!(GoOpts::parse("colour=blue"), Err(BridgeError::Config(_))));
        assert!(matches!(GoOpts::parse("shutdown_timeout=soon"), Err(BridgeError::Config(_))));
        assert!(matches!(GoOpts::parse("python_env=NOVALUE"), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_delegate_command() {
        let args = server_args(&[
            "--backend-store-uri",
            "sqlite:///tmp/x.db",
            "--port",
            "6000",
            "--workers",
            "2",
            "--dev",
            "--go-opts",
            "log_level=DEBUG",
        ]);

        assert_eq!(
            args.delegate_command("mlflow", 41234),
            vec![
                "mlflow",
                "server",
                "--backend-store-uri",
                "sqlite:///tmp/x.db",
                "--serve-artifacts",
                "--host",
                "127.0.0.1",
                "--port",
                "41234",
                "--workers",
                "2",
                "--dev",
            ]
        );
    }

    #[test]
    fn test_no_serve_artifacts() {
        let args = server_args(&["--no-serve-artifacts"]);
        assert!(!args.serves_artifacts());
        assert!(!args.delegate_command("mlflow", 1).contains(&"--serve-artifacts".to_string()));

        let args = server_args(&["--no-serve-artifacts", "--serve-artifacts"]);
        assert!(args.serves_artifacts());
    }

    #[test]
    fn test_default_artifact_root() {
        assert_eq!(
            resolve_default_artifact_root(true, Some("s3://bucket"), "./mlruns").unwrap(),
            "s3://bucket"
        );
        assert_eq!(
            resolve_default_artifact_root(true, None, "sqlite:///x.db").unwrap(),
            "mlflow-artifacts:/"
        );
        assert_eq!(
            resolve_default_artifact_root(false, None, "./store").unwrap(),
            "./store"
        );

        let resolved = resolve_default_artifact_root(false, None, "sqlite:///x.db").unwrap();
        assert!(resolved.starts_with("file://") && resolved.ends_with("/mlruns"), "{}", resolved);
    }

    #[test]
    fn test_server_config() {
        let args = server_args(&[
            "--backend-store-uri",
            "sqlite:///tmp/x.db",
            "--host",
            "0.0.0.0",
            "--go-opts",
            "shutdown_timeout=30s",
        ]);
        let config = args.to_config(&ServerSettings::default(), 41234).unwrap();

        assert_eq!(config.address.as_deref(), Some("0.0.0.0:5000"));
        assert_eq!(config.tracking_store_uri.as_deref(), Some("sqlite:///tmp/x.db"));
        assert_eq!(config.model_registry_store_uri.as_deref(), Some("sqlite:///tmp/x.db"));
        assert_eq!(config.default_artifact_root.as_deref(), Some("mlflow-artifacts:/"));
        assert_eq!(config.python_address.as_deref(), Some("127.0.0.1:41234"));
        assert_eq!(config.shutdown_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.log_level.as_deref(), Some("INFO"));
        assert_eq!(&config.python_command[..2], &["mlflow".to_string(), "server".to_string()]);
        assert_eq!(config.version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_server_config_version_from_settings() {
        let settings = ServerSettings {
            version: Some("2.16.0".to_string()),
            ..ServerSettings::default()
        };
        let config = server_args(&[]).to_config(&settings, 41234).unwrap();
        assert_eq!(config.version.as_deref(), Some("2.16.0"));
    }

    #[test]
    fn test_safe_port_is_bindable() {
        let port = safe_port().unwrap();
        assert!(port > 0);
        assert!(TcpListener::bind((DELEGATE_HOST, port)).is_ok());
    }

    #[test]
    fn test_build_lib_args() {
        let cli = Cli::try_parse_from(["mlflow-bridge", "build-lib", "src", "out"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::BuildLib { ref src, ref out } if src == Path::new("src") && out == Path::new("out")
        ));
    }

    proptest! {
        #[test]
        fn prop_python_address_passes_through(host in "[a-z]{1,10}", port in 1u16..) {
            let opts = GoOpts::parse(&format!("python_address={}:{}", host, port)).unwrap();
            prop_assert_eq!(opts.python_address, Some(format!("{}:{}", host, port)));
        }

        #[test]
        fn prop_seconds_timeout(secs in 0u64..100_000) {
            let opts = GoOpts::parse(&format!("shutdown_timeout={}s", secs)).unwrap();
            prop_assert_eq!(opts.shutdown_timeout, Duration::from_secs(secs));
        }
    }
}
