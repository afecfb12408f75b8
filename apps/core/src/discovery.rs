use crate::cache::{CacheStats, LruCache};
use crate::config::AppsConfig;
use crate::model::LocalApp;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_ICON_CACHE_CAPACITY: usize = 100;
const ICON_EXTENSIONS: [&str; 4] = ["png", "svg", "xpm", "icns"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{provider} discovery failed: {message}")]
pub struct ProviderError {
    provider: &'static str,
    message: String,
}

impl ProviderError {
    pub fn new(provider: &'static str, message: impl Into<String>) -> Self {
        Self {
            provider,
            message: message.into(),
        }
    }
}

pub trait DiscoveryProvider {
    fn provider_name(&self) -> &'static str;
    fn discover(&mut self) -> Result<Vec<LocalApp>, ProviderError>;
}

/// Fixed application list, used when the host supplies its own.
pub struct StaticAppProvider {
    apps: Vec<LocalApp>,
}

impl StaticAppProvider {
    pub fn from_apps(apps: Vec<LocalApp>) -> Self {
        Self { apps }
    }
}

impl DiscoveryProvider for StaticAppProvider {
    fn provider_name(&self) -> &'static str {
        "static"
    }

    fn discover(&mut self) -> Result<Vec<LocalApp>, ProviderError> {
        Ok(self.apps.clone())
    }
}

/// Walks application directories for `.desktop` entries, `.app` bundles and
/// Windows shortcuts/executables.
pub struct FilesystemAppProvider {
    roots: Vec<PathBuf>,
    icon_roots: Vec<PathBuf>,
    max_depth: usize,
    icons: LruCache<String, Option<String>>,
}

impl FilesystemAppProvider {
    pub fn new(roots: Vec<PathBuf>, icon_roots: Vec<PathBuf>, max_depth: usize) -> Self {
        Self {
            roots,
            icon_roots,
            max_depth: max_depth.max(1),
            icons: LruCache::new(DEFAULT_ICON_CACHE_CAPACITY),
        }
    }

    pub fn from_config(cfg: &AppsConfig, icon_cache_capacity: usize) -> Self {
        let mut provider = Self::new(cfg.roots.clone(), cfg.icon_roots.clone(), cfg.max_depth);
        provider.icons = LruCache::new(icon_cache_capacity);
        provider
    }

    pub fn icon_stats(&self) -> CacheStats {
        self.icons.stats()
    }

    /// Maps an icon name or path to a file on disk. Misses are cached too.
    pub fn resolve_icon(&mut self, icon: &str) -> Option<String> {
        let key = icon.trim().to_string();
        if key.is_empty() {
            return None;
        }
        if let Some(cached) = self.icons.get(&key) {
            return cached.clone();
        }
        let resolved = self.lookup_icon(&key);
        self.icons.put(key, resolved.clone());
        resolved
    }

    fn lookup_icon(&self, icon: &str) -> Option<String> {
        let direct = Path::new(icon);
        if direct.is_absolute() {
            return direct.is_file().then(|| icon.to_string());
        }
        self.icon_roots.iter().find_map(|root| {
            WalkDir::new(root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .find(|entry| {
                    let path = entry.path();
                    path.file_stem().and_then(|stem| stem.to_str()) == Some(icon)
                        && path
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| ICON_EXTENSIONS.contains(&ext))
                })
                .map(|entry| entry.path().display().to_string())
        })
    }

    fn scan_root(&mut self, root: &Path, apps: &mut Vec<LocalApp>) {
        let walker = WalkDir::new(root)
            .max_depth(self.max_depth)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_bundle_interior(entry.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let path = entry.path();
            let app = match path.extension().and_then(|ext| ext.to_str()) {
                Some("desktop") if entry.file_type().is_file() => parse_desktop_file(path),
                Some("app") if entry.file_type().is_dir() => Some(bundle_app(path)),
                Some("lnk") | Some("exe") if entry.file_type().is_file() => {
                    Some(executable_app(path))
                }
                _ => None,
            };
            if let Some(mut app) = app {
                app.icon = app.icon.as_deref().and_then(|icon| self.resolve_icon(icon));
                apps.push(app);
            }
        }
    }
}

impl DiscoveryProvider for FilesystemAppProvider {
    fn provider_name(&self) -> &'static str {
        "filesystem"
    }

    fn discover(&mut self) -> Result<Vec<LocalApp>, ProviderError> {
        let mut apps = Vec::new();
        let roots = self.roots.clone();
        for root in roots.iter().filter(|root| root.is_dir()) {
            self.scan_root(root, &mut apps);
        }
        apps.sort_by(|left, right| left.name.to_lowercase().cmp(&right.name.to_lowercase()));
        apps.dedup_by(|left, right| left.name == right.name && left.command == right.command);
        log::info!("discovered {} local applications", apps.len());
        Ok(apps)
    }
}

// The root may itself be a bundle; only descend into bundles below it.
fn is_bundle_interior(path: &Path) -> bool {
    path.parent()
        .and_then(|parent| parent.extension())
        .is_some_and(|ext| ext == "app")
}

/// Parses the `[Desktop Entry]` group of a freedesktop launcher file.
pub fn parse_desktop_file(path: &Path) -> Option<LocalApp> {
    let raw = fs::read_to_string(path).ok()?;
    parse_desktop_entry(&raw, path)
}

pub fn parse_desktop_entry(raw: &str, path: &Path) -> Option<LocalApp> {
    let mut in_entry = false;
    let mut name = None;
    let mut exec = None;
    let mut icon = None;
    let mut comment = None;
    let mut keywords = Vec::new();

    for line in raw.lines().map(str::trim) {
        if line.starts_with('[') {
            in_entry = line == "[Desktop Entry]";
            continue;
        }
        if !in_entry || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Name" => name = Some(value.to_string()),
            "Exec" => exec = Some(value.to_string()),
            "Icon" => icon = Some(value.to_string()),
            "Comment" => comment = Some(value.to_string()),
            "Keywords" => {
                keywords = value
                    .split(';')
                    .map(str::trim)
                    .filter(|keyword| !keyword.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            "NoDisplay" | "Hidden" if value.eq_ignore_ascii_case("true") => return None,
            "Type" if value != "Application" => return None,
            _ => {}
        }
    }

    let name = name?;
    let mut argv = split_exec(&exec?);
    if argv.is_empty() {
        return None;
    }
    let command = argv.remove(0);
    let mut app = LocalApp::new(&name, &command);
    app.args = argv;
    app.icon = icon;
    app.description = comment.unwrap_or_else(|| path.display().to_string());
    let keywords: Vec<&str> = keywords.iter().map(String::as_str).collect();
    Some(app.with_keywords(&keywords))
}

// Splits an Exec line, honouring double quotes and dropping %-field codes.
fn split_exec(exec: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = exec.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => quoted = !quoted,
            '\\' if quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args.retain(|arg| !(arg.len() == 2 && arg.starts_with('%')));
    args
}

fn bundle_app(path: &Path) -> LocalApp {
    let name = file_stem(path);
    let mut app = LocalApp::new(&name, "open");
    app.args = vec!["-a".to_string(), path.display().to_string()];
    app.description = path.display().to_string();
    app
}

fn executable_app(path: &Path) -> LocalApp {
    LocalApp::new(&file_stem(path), &path.display().to_string())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
