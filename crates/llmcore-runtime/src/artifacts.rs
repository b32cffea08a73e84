//! Artifact resolution and caching.
//!
//! Model graphs, graph configs and vocabularies are resolved to local files
//! on first use. Each artifact is looked for under
//! `<root>/<model>/<file_name>`; when absent it is fetched from an ordered
//! list of mirrors, written to a `.part` file and renamed into place, so an
//! interrupted download never leaves a usable-looking file behind.

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use tracing::{debug, info, warn};

use crate::error::ArtifactError;

/// What an artifact is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Model graph or weights file
    Graph,
    /// Architecture config accompanying a weights file
    GraphConfig,
    /// Vocabulary or tokenizer definition
    Vocabulary,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::GraphConfig => "graph-config",
            Self::Vocabulary => "vocabulary",
        }
    }
}

/// Identifies one artifact of one model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub model: String,
    pub kind: ArtifactKind,
}

impl ArtifactKey {
    pub fn new(model: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            model: model.into(),
            kind,
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.kind.as_str())
    }
}

/// Resolves artifact keys to local file paths, fetching them if needed.
///
/// Implementations must guard concurrent first use of a key so that only
/// one caller performs the fetch.
pub trait ArtifactProvider: Send + Sync {
    fn resolve(&self, key: &ArtifactKey) -> Result<PathBuf, ArtifactError>;
}

/// One place an artifact can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mirror {
    /// Plain HTTP(S) URL
    Url(String),
    /// File in a HuggingFace Hub model repository
    Hub { repo: String, file: String },
}

impl FromStr for Mirror {
    type Err = ArtifactError;

    /// Accepts `https://...`, `http://...` and `hf://<org>/<repo>/<path>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("hf://") {
            let mut parts = rest.splitn(3, '/');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(org), Some(repo), Some(file))
                    if !org.is_empty() && !repo.is_empty() && !file.is_empty() =>
                {
                    Ok(Self::Hub {
                        repo: format!("{org}/{repo}"),
                        file: file.to_string(),
                    })
                }
                _ => Err(ArtifactError::InvalidMirror(s.to_string())),
            }
        } else if s.starts_with("https://") || s.starts_with("http://") {
            Ok(Self::Url(s.to_string()))
        } else {
            Err(ArtifactError::InvalidMirror(s.to_string()))
        }
    }
}

impl fmt::Display for Mirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.write_str(url),
            Self::Hub { repo, file } => write!(f, "hf://{repo}/{file}"),
        }
    }
}

/// Where an artifact lives locally and where to fetch it from.
#[derive(Debug, Clone)]
pub struct ArtifactSpec {
    pub file_name: String,
    pub mirrors: Vec<Mirror>,
}

impl ArtifactSpec {
    /// Parse mirror strings from settings.
    pub fn parse(file_name: impl Into<String>, mirrors: &[String]) -> Result<Self, ArtifactError> {
        let mirrors = mirrors
            .iter()
            .map(|m| m.parse())
            .collect::<Result<Vec<Mirror>, _>>()?;
        Ok(Self {
            file_name: file_name.into(),
            mirrors,
        })
    }
}

/// Download behaviour shared by all mirrors.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Attempts per mirror
    pub retries: u32,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            retries: 3,
            timeout: Duration::from_secs(180),
            user_agent: format!("llmcore/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Artifact provider that downloads from registered mirrors into a cache root.
pub struct MirrorArtifactProvider {
    root: PathBuf,
    options: DownloadOptions,
    client: reqwest::blocking::Client,
    specs: HashMap<ArtifactKey, ArtifactSpec>,
    in_flight: Mutex<HashMap<ArtifactKey, Arc<Mutex<()>>>>,
}

impl MirrorArtifactProvider {
    pub fn new(root: impl Into<PathBuf>, options: DownloadOptions) -> Result<Self, ArtifactError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(|e| ArtifactError::Download {
                artifact: "<client>".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            root: root.into(),
            options,
            client,
            specs: HashMap::new(),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Provider rooted at the user cache directory.
    pub fn with_default_root(options: DownloadOptions) -> Result<Self, ArtifactError> {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("llmcore")
            .join("models");
        Self::new(root, options)
    }

    /// Register where `key` is stored and fetched from.
    pub fn register(&mut self, key: ArtifactKey, spec: ArtifactSpec) {
        self.specs.insert(key, spec);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArtifactKey> {
        self.specs.keys()
    }

    /// Local path for `key`, whether or not it is installed yet.
    pub fn path_for(&self, key: &ArtifactKey) -> Result<PathBuf, ArtifactError> {
        let spec = self.spec(key)?;
        Ok(self.root.join(&key.model).join(&spec.file_name))
    }

    pub fn is_installed(&self, key: &ArtifactKey) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn spec(&self, key: &ArtifactKey) -> Result<&ArtifactSpec, ArtifactError> {
        self.specs
            .get(key)
            .ok_or_else(|| ArtifactError::UnknownArtifact(key.to_string()))
    }

    fn key_lock(&self, key: &ArtifactKey) -> Arc<Mutex<()>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.entry(key.clone()).or_default().clone()
    }

    fn install(&self, key: &ArtifactKey, dest: &Path) -> Result<(), ArtifactError> {
        let spec = self.spec(key)?;
        if spec.mirrors.is_empty() {
            return Err(ArtifactError::Download {
                artifact: key.to_string(),
                reason: "no mirrors configured".to_string(),
            });
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let part = dest.with_file_name(format!("{}.part", spec.file_name));

        let mut last_error = String::new();
        for (i, mirror) in spec.mirrors.iter().enumerate() {
            info!(
                artifact = %key,
                mirror = %mirror,
                attempt = i + 1,
                of = spec.mirrors.len(),
                "Downloading"
            );
            match self.fetch_with_retry(mirror, &part) {
                Ok(()) => {
                    std::fs::rename(&part, dest)?;
                    info!(artifact = %key, path = %dest.display(), "Installed");
                    return Ok(());
                }
                Err(e) => {
                    warn!(artifact = %key, mirror = %mirror, error = %e, "Mirror failed");
                    let _ = std::fs::remove_file(&part);
                    last_error = e;
                }
            }
        }

        Err(ArtifactError::Download {
            artifact: key.to_string(),
            reason: last_error,
        })
    }

    fn fetch_with_retry(&self, mirror: &Mirror, part: &Path) -> Result<(), String> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.fetch(mirror, part) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempts >= self.options.retries.max(1) {
                        return Err(e);
                    }
                    match backoff.next_backoff() {
                        Some(duration) => {
                            debug!(
                                error = %e,
                                retry_in_ms = duration.as_millis(),
                                "Fetch failed, retrying"
                            );
                            std::thread::sleep(duration);
                        }
                        None => return Err(e),
                    }
                }
            }
        }
    }

    fn fetch(&self, mirror: &Mirror, part: &Path) -> Result<(), String> {
        match mirror {
            Mirror::Url(url) => {
                let mut response = self
                    .client
                    .get(url)
                    .send()
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| e.to_string())?;
                let mut file = File::create(part).map_err(|e| e.to_string())?;
                response.copy_to(&mut file).map_err(|e| e.to_string())?;
                file.sync_all().map_err(|e| e.to_string())
            }
            Mirror::Hub { repo, file } => {
                use hf_hub::api::sync::Api;

                let api = Api::new().map_err(|e| e.to_string())?;
                let source = api
                    .model(repo.clone())
                    .get(file)
                    .map_err(|e| format!("{}: {}", file, e))?;
                std::fs::copy(&source, part).map_err(|e| e.to_string())?;
                Ok(())
            }
        }
    }
}

impl ArtifactProvider for MirrorArtifactProvider {
    fn resolve(&self, key: &ArtifactKey) -> Result<PathBuf, ArtifactError> {
        let dest = self.path_for(key)?;
        if dest.is_file() {
            debug!(artifact = %key, path = %dest.display(), "Using cached artifact");
            return Ok(dest);
        }

        // First caller fetches; concurrent callers wait here, then find the file.
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if dest.is_file() {
            return Ok(dest);
        }

        self.install(key, &dest)?;
        Ok(dest)
    }
}

/// Artifact provider over files that are already on disk.
#[derive(Debug, Clone, Default)]
pub struct LocalArtifacts {
    paths: HashMap<ArtifactKey, PathBuf>,
}

impl LocalArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: ArtifactKey, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(key, path.into());
        self
    }
}

impl ArtifactProvider for LocalArtifacts {
    fn resolve(&self, key: &ArtifactKey) -> Result<PathBuf, ArtifactError> {
        let path = self
            .paths
            .get(key)
            .ok_or_else(|| ArtifactError::UnknownArtifact(key.to_string()))?;
        if !path.is_file() {
            return Err(ArtifactError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found at {}", key, path.display()),
            )));
        }
        Ok(path.clone())
    }
}
