use crate::cache::TtlCache;
use crate::matcher::is_abbreviation_candidate;
use crate::model::{Cmd, CmdType, Feature, PluginDescriptor};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_PLUGIN_CACHE_TTL: Duration = Duration::from_secs(10);

/// Anything that can produce the current installed-plugin list.
pub trait PluginSource {
    fn load_plugins(&self) -> Vec<PluginDescriptor>;
}

impl<F> PluginSource for F
where
    F: Fn() -> Vec<PluginDescriptor>,
{
    fn load_plugins(&self) -> Vec<PluginDescriptor> {
        self()
    }
}

/// One searchable (plugin, feature, cmd) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub plugin: Arc<PluginDescriptor>,
    pub feature_index: usize,
    pub cmd_index: usize,
    pub cmd_label: String,
    pub cmd_type: Option<CmdType>,
}

impl IndexEntry {
    pub fn feature(&self) -> &Feature {
        &self.plugin.features[self.feature_index]
    }

    pub fn cmd(&self) -> &Cmd {
        &self.feature().cmds[self.cmd_index]
    }

    /// Entries whose match outcome is not monotone in the query prefix.
    pub fn is_volatile(&self) -> bool {
        matches!(self.cmd_type, Some(CmdType::Regex) | Some(CmdType::Over))
            || is_abbreviation_candidate(&self.cmd_label)
    }
}

pub struct PluginIndex {
    source: Box<dyn PluginSource>,
    plugins: TtlCache<Vec<Arc<PluginDescriptor>>>,
    entries: Vec<IndexEntry>,
    patterns: Vec<Option<Regex>>,
    volatile: Vec<usize>,
    built: bool,
}

impl PluginIndex {
    pub fn new(source: Box<dyn PluginSource>, ttl: Duration) -> Self {
        Self {
            source,
            plugins: TtlCache::new(ttl),
            entries: Vec::new(),
            patterns: Vec::new(),
            volatile: Vec::new(),
            built: false,
        }
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Flattens every plugin's features and cmds. No-op once built.
    pub fn build(&mut self) {
        if self.built {
            return;
        }
        let source = &self.source;
        let plugins = self
            .plugins
            .get_or_load(|| source.load_plugins().into_iter().map(Arc::new).collect())
            .clone();

        self.entries.clear();
        self.patterns.clear();
        self.volatile.clear();
        for plugin in plugins {
            for (feature_index, feature) in plugin.features.iter().enumerate() {
                for (cmd_index, cmd) in feature.cmds.iter().enumerate() {
                    let entry = IndexEntry {
                        plugin: Arc::clone(&plugin),
                        feature_index,
                        cmd_index,
                        cmd_label: cmd.label().to_string(),
                        cmd_type: cmd.cmd_type(),
                    };
                    let pattern = cmd.regex_source().and_then(|source| {
                        compile_cmd_pattern(source)
                            .map_err(|err| {
                                log::warn!(
                                    "ignoring regex cmd of plugin {}: {err}",
                                    plugin.name
                                )
                            })
                            .ok()
                    });
                    if entry.is_volatile() {
                        self.volatile.push(self.entries.len());
                    }
                    self.entries.push(entry);
                    self.patterns.push(pattern);
                }
            }
        }
        self.built = true;
        log::info!("plugin index built with {} entries", self.entries.len());
    }

    /// Drops the cached plugin list and the flattened entries, then rebuilds.
    pub fn rebuild(&mut self) {
        self.plugins.invalidate();
        self.built = false;
        self.build();
    }

    pub fn entries(&mut self) -> &[IndexEntry] {
        self.build();
        &self.entries
    }

    pub fn entry(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    pub fn pattern(&self, position: usize) -> Option<&Regex> {
        self.patterns.get(position).and_then(Option::as_ref)
    }

    pub fn volatile_positions(&self) -> &[usize] {
        &self.volatile
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compiles a `/pattern/flags` trigger. Text without delimiters is used as is.
pub fn compile_cmd_pattern(source: &str) -> Result<Regex, regex::Error> {
    let (pattern, flags) = match source.strip_prefix('/') {
        Some(rest) => match rest.rfind('/') {
            Some(end) => (&rest[..end], &rest[end + 1..]),
            None => (source, ""),
        },
        None => (source, ""),
    };
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .build()
}
