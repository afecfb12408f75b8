use crate::package_manager::PackageError;
use serde_json::Value;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs the external package-manager program.
pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<CommandOutput>;
}

pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<CommandOutput> {
        let output = Command::new(program).args(args).current_dir(cwd).output()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            code: output.status.code(),
            output: text,
        })
    }
}

/// Network side of the package manager: registry metadata and CDN files.
pub trait RegistryClient: Send + Sync {
    fn latest_version(&self, registry: &str, name: &str) -> Result<String, PackageError>;
    fn fetch_text(&self, url: &str) -> Result<String, PackageError>;
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, PackageError>;
}

pub struct HttpRegistryClient {
    client: reqwest::blocking::Client,
}

impl HttpRegistryClient {
    pub fn new(timeout: Duration) -> Result<Self, PackageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hopper-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| PackageError::Registry(err.to_string()))?;
        Ok(Self { client })
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, PackageError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| PackageError::Registry(format!("GET {url}: {err}")))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(PackageError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(PackageError::Registry(format!("GET {url}: HTTP {status}")));
        }
        Ok(response)
    }
}

impl RegistryClient for HttpRegistryClient {
    fn latest_version(&self, registry: &str, name: &str) -> Result<String, PackageError> {
        let body = self.fetch_text(&format!("{registry}{name}"))?;
        parse_latest_version(name, &body)
    }

    fn fetch_text(&self, url: &str) -> Result<String, PackageError> {
        self.get(url)?
            .text()
            .map_err(|err| PackageError::Registry(format!("GET {url}: {err}")))
    }

    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, PackageError> {
        self.get(url)?
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|err| PackageError::Registry(format!("GET {url}: {err}")))
    }
}

/// Extracts `dist-tags.latest` from a registry package document.
pub fn parse_latest_version(name: &str, body: &str) -> Result<String, PackageError> {
    let document: Value = serde_json::from_str(body)
        .map_err(|err| PackageError::MalformedDescriptor(format!("{name}: {err}")))?;
    document
        .get("dist-tags")
        .and_then(|tags| tags.get("latest"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PackageError::MalformedDescriptor(format!("{name}: missing dist-tags.latest")))
}
