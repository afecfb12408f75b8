use crate::config::{PluginConfig, DEFAULT_CDN_BASE, DEFAULT_REGISTRY};
use crate::model::PluginDescriptor;
use crate::registry::{
    CommandOutput, CommandRunner, HttpRegistryClient, ProcessRunner, RegistryClient,
};
use crate::task_queue::TaskQueue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

const MANIFEST_FILE: &str = "package.json";
const DESCRIPTOR_FILE: &str = "plugin.json";
const DEFAULT_REGISTRY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("`{command}` failed with exit code {code:?}: {output}")]
    TransientProcessFailure {
        command: String,
        code: Option<i32>,
        output: String,
    },
    #[error("failed to start {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("plugin path does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("malformed plugin metadata: {0}")]
    MalformedDescriptor(String),
    #[error("registry request failed: {0}")]
    Registry(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("package task queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Install,
    Uninstall,
    Update,
    Link,
    Unlink,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Update => "update",
            Self::Link => "link",
            Self::Unlink => "unlink",
        }
    }

    fn pins_latest(self) -> bool {
        matches!(self, Self::Install | Self::Update)
    }

    fn talks_to_registry(self) -> bool {
        matches!(self, Self::Install | Self::Update | Self::Uninstall)
    }
}

/// One queued package-manager invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallTask {
    pub kind: CommandKind,
    pub targets: Vec<String>,
    pub retries: u32,
}

/// Builds the argument list handed to the package-manager program.
pub fn command_args(kind: CommandKind, targets: &[String], registry: &str) -> Vec<String> {
    let mut args = vec![kind.as_str().to_string()];
    args.extend(targets.iter().map(|target| {
        if kind.pins_latest() {
            format!("{target}@latest")
        } else {
            target.clone()
        }
    }));
    if kind.talks_to_registry() {
        args.push("--color=always".to_string());
        args.push("--save".to_string());
        args.push(format!("--registry={registry}"));
    }
    args
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionComparator {
    /// Plain string ordering of the two identifiers. "9.0.0" sorts above "10.0.0".
    #[default]
    Lexicographic,
    /// Dot-separated numeric ordering.
    Numeric,
}

impl VersionComparator {
    pub fn is_newer(self, latest: &str, installed: &str) -> bool {
        match self {
            Self::Lexicographic => latest > installed,
            Self::Numeric => compare_numeric(latest, installed) == Ordering::Greater,
        }
    }
}

fn compare_numeric(left: &str, right: &str) -> Ordering {
    let mut left_parts = left.split(['.', '-', '+']);
    let mut right_parts = right.split(['.', '-', '+']);
    loop {
        match (left_parts.next(), right_parts.next()) {
            (None, None) => return Ordering::Equal,
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some(l), Some(r)) => {
                let ordering = match (l.parse::<u64>(), r.parse::<u64>()) {
                    (Ok(l), Ok(r)) => l.cmp(&r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

pub fn read_manifest(base_dir: &Path) -> Result<PackageManifest, PackageError> {
    let path = base_dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&path)?;
    serde_json::from_str(&raw)
        .map_err(|err| PackageError::MalformedDescriptor(format!("{}: {err}", path.display())))
}

/// Creates the install directory with an empty manifest when it is missing.
pub fn ensure_base_dir(base_dir: &Path) -> Result<(), PackageError> {
    let manifest = base_dir.join(MANIFEST_FILE);
    if manifest.exists() {
        return Ok(());
    }
    fs::create_dir_all(base_dir)?;
    let empty = serde_json::to_string_pretty(&PackageManifest::default())
        .map_err(|err| PackageError::MalformedDescriptor(err.to_string()))?;
    fs::write(manifest, empty)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallOptions {
    pub is_dev: bool,
}

impl InstallOptions {
    pub fn dev() -> Self {
        Self { is_dev: true }
    }
}

/// Result of a queued operation that has not necessarily run yet.
pub struct Pending<T> {
    receiver: Receiver<Result<T, PackageError>>,
}

impl<T> Pending<T> {
    pub fn wait(self) -> Result<T, PackageError> {
        self.receiver
            .recv()
            .unwrap_or(Err(PackageError::QueueClosed))
    }

    pub fn try_wait(&self) -> Option<Result<T, PackageError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(PackageError::QueueClosed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageManagerOptions {
    pub base_dir: PathBuf,
    pub registry: String,
    pub cdn_base: String,
    pub program: String,
    pub retries: u32,
    pub backoff: Duration,
    pub registry_timeout: Duration,
    pub comparator: VersionComparator,
}

impl PackageManagerOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            registry: DEFAULT_REGISTRY.to_string(),
            cdn_base: DEFAULT_CDN_BASE.to_string(),
            program: "npm".to_string(),
            retries: 3,
            backoff: Duration::ZERO,
            registry_timeout: DEFAULT_REGISTRY_TIMEOUT,
            comparator: VersionComparator::default(),
        }
    }
}

impl From<&PluginConfig> for PackageManagerOptions {
    fn from(cfg: &PluginConfig) -> Self {
        Self {
            base_dir: cfg.install_dir.clone(),
            registry: cfg.registry.clone(),
            cdn_base: cfg.cdn_base.clone(),
            program: cfg.program.clone(),
            retries: cfg.retries,
            backoff: cfg.retry_backoff(),
            registry_timeout: cfg.registry_timeout(),
            comparator: cfg.version_comparator,
        }
    }
}

struct Executor {
    runner: Arc<dyn CommandRunner>,
    program: String,
    cwd: PathBuf,
    registry: String,
    backoff: Duration,
}

impl Executor {
    fn execute(&self, task: &InstallTask) -> Result<CommandOutput, PackageError> {
        let args = command_args(task.kind, &task.targets, &self.registry);
        let command = format!("{} {}", self.program, args.join(" "));
        let mut attempt = 0;
        loop {
            let outcome = self
                .runner
                .run(&self.program, &args, &self.cwd)
                .map_err(|source| PackageError::ProcessSpawn {
                    program: self.program.clone(),
                    source,
                })?;
            if outcome.success() {
                log::info!("`{command}` finished");
                return Ok(outcome);
            }
            if attempt >= task.retries {
                return Err(PackageError::TransientProcessFailure {
                    command,
                    code: outcome.code,
                    output: outcome.output,
                });
            }
            attempt += 1;
            log::warn!(
                "`{command}` exited with {:?}, retry {attempt}/{}",
                outcome.code,
                task.retries
            );
            if !self.backoff.is_zero() {
                thread::sleep(self.backoff);
            }
        }
    }
}

/// Installs, removes and upgrades plugin packages through an external
/// package-manager program. Mutating commands are serialized on one queue.
pub struct PackageManager {
    base_dir: PathBuf,
    registry: String,
    cdn_base: String,
    retries: u32,
    comparator: VersionComparator,
    executor: Arc<Executor>,
    client: Arc<dyn RegistryClient>,
    latest_versions: Mutex<HashMap<String, String>>,
    queue: TaskQueue,
}

impl PackageManager {
    pub fn new(
        options: PackageManagerOptions,
        runner: Arc<dyn CommandRunner>,
        client: Arc<dyn RegistryClient>,
    ) -> Result<Self, PackageError> {
        ensure_base_dir(&options.base_dir)?;
        let registry = with_trailing_slash(&options.registry);
        let executor = Arc::new(Executor {
            runner,
            program: options.program.clone(),
            cwd: options.base_dir.clone(),
            registry: registry.clone(),
            backoff: options.backoff,
        });
        Ok(Self {
            base_dir: options.base_dir,
            registry,
            cdn_base: with_trailing_slash(&options.cdn_base),
            retries: options.retries,
            comparator: options.comparator,
            executor,
            client,
            latest_versions: Mutex::new(HashMap::new()),
            queue: TaskQueue::new("package-manager")?,
        })
    }

    /// Real process runner and HTTP registry client.
    pub fn with_defaults(options: PackageManagerOptions) -> Result<Self, PackageError> {
        let client = HttpRegistryClient::new(options.registry_timeout)?;
        Self::new(options, Arc::new(ProcessRunner), Arc::new(client))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn install_root(&self) -> PathBuf {
        self.base_dir.join("node_modules")
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn RegistryClient> {
        &self.client
    }

    pub fn install(&self, names: &[String], options: InstallOptions) -> Pending<()> {
        let kind = if options.is_dev {
            CommandKind::Link
        } else {
            CommandKind::Install
        };
        let (sender, receiver) = mpsc::channel();
        self.enqueue(kind, names, move |result| {
            let _ = sender.send(result.map(|_| ()));
        });
        Pending { receiver }
    }

    /// Queued; failures are logged, never returned.
    pub fn uninstall(&self, names: &[String], options: InstallOptions) {
        let kind = if options.is_dev {
            CommandKind::Unlink
        } else {
            CommandKind::Uninstall
        };
        self.enqueue(kind, names, log_failure);
    }

    /// Queued; failures are logged, never returned.
    pub fn update(&self, names: &[String]) {
        self.enqueue(CommandKind::Update, names, log_failure);
    }

    fn enqueue<F>(&self, kind: CommandKind, names: &[String], on_done: F)
    where
        F: FnOnce(Result<CommandOutput, PackageError>) + Send + 'static,
    {
        let task = InstallTask {
            kind,
            targets: names.to_vec(),
            retries: self.retries,
        };
        let executor = Arc::clone(&self.executor);
        log::info!("queueing {} {}", kind.as_str(), task.targets.join(" "));
        if let Err(err) = self.queue.add(move || on_done(executor.execute(&task))) {
            log::error!("could not queue {}: {err}", kind.as_str());
        }
    }

    /// Reinstalls `name` when the registry advertises a newer version.
    /// Returns whether an install was performed.
    pub fn upgrade(&self, name: &str) -> Result<bool, PackageError> {
        let manifest = read_manifest(&self.base_dir)?;
        let Some(recorded) = manifest.dependencies.get(name) else {
            return Ok(false);
        };
        let installed = recorded.trim_start_matches('^');
        let latest = self.latest_version(name)?;
        if !self.comparator.is_newer(&latest, installed) {
            return Ok(false);
        }
        log::info!("upgrading {name} from {installed} to {latest}");
        self.install(&[name.to_string()], InstallOptions::default())
            .wait()?;
        Ok(true)
    }

    fn latest_version(&self, name: &str) -> Result<String, PackageError> {
        let cached = self
            .latest_versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        if let Some(version) = cached {
            return Ok(version);
        }
        // The lock is not held across the registry round trip.
        let version = self.client.latest_version(&self.registry, name)?;
        self.latest_versions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), version.clone());
        Ok(version)
    }

    pub fn list(&self) -> Result<Vec<String>, PackageError> {
        Ok(read_manifest(&self.base_dir)?
            .dependencies
            .into_keys()
            .collect())
    }

    /// Reads `plugin.json` from `path_hint` or the installed package, falling
    /// back to the CDN copy.
    pub fn adapter_info(
        &self,
        name: &str,
        path_hint: Option<&Path>,
    ) -> Result<PluginDescriptor, PackageError> {
        let local = path_hint
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.install_root().join(name).join(DESCRIPTOR_FILE));
        let (origin, raw) = if local.is_file() {
            (local.display().to_string(), fs::read_to_string(&local)?)
        } else {
            let url = format!("{}{name}/{DESCRIPTOR_FILE}", self.cdn_base);
            let raw = self.client.fetch_text(&url)?;
            (url, raw)
        };
        serde_json::from_str(&raw)
            .map_err(|err| PackageError::MalformedDescriptor(format!("{origin}: {err}")))
    }

    pub fn download_file(&self, url: &str, dest: &Path) -> Result<(), PackageError> {
        let bytes = self.client.fetch_bytes(url)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, bytes)?;
        Ok(())
    }
}

fn log_failure(result: Result<CommandOutput, PackageError>) {
    if let Err(err) = result {
        log::error!("package command failed: {err}");
    }
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}
