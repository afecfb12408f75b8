use crate::cache::CacheStats;
use crate::matcher::{
    is_abbreviation_candidate, LabelMatch, MatchKind, Matcher, Span, DEFAULT_MATCH_CACHE_CAPACITY,
};
use crate::model::{
    normalize_for_search, Cmd, CmdType, FeaturePayload, LocalApp, PluginDescriptor, PluginType,
};
use crate::plugin_index::{PluginIndex, PluginSource, DEFAULT_PLUGIN_CACHE_TTL};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const EXACT_WEIGHT: i64 = 10_000;
const ABBREVIATION_WEIGHT: i64 = 8_000;
const PREFIX_WEIGHT: i64 = 6_000;
const SUBSTRING_WEIGHT: i64 = 4_000;
const REGEX_WEIGHT: i64 = 1_000;
const OVER_WEIGHT: i64 = 0;

/// Where a result came from; also the tie-breaker when weights are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptionSource {
    Entry(usize),
    App(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginLaunch {
    pub plugin: Arc<PluginDescriptor>,
    pub feature_code: String,
    pub cmd: Cmd,
    pub ext: Option<FeaturePayload>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionTarget {
    OpenPlugin(PluginLaunch),
    LaunchApp(LocalApp),
}

/// Receiver of a chosen search result.
pub trait ActionDispatcher {
    type Error;

    fn open_plugin(&mut self, launch: &PluginLaunch) -> Result<(), Self::Error>;
    fn launch_app(&mut self, app: &LocalApp) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionOption {
    pub name: String,
    pub value: String,
    pub icon: Option<String>,
    pub description: String,
    pub plugin_type: PluginType,
    pub weight: i64,
    pub spans: Vec<Span>,
    pub source: OptionSource,
    pub action: ActionTarget,
}

impl ActionOption {
    pub fn invoke<D>(&self, dispatcher: &mut D) -> Result<(), D::Error>
    where
        D: ActionDispatcher + ?Sized,
    {
        match &self.action {
            ActionTarget::OpenPlugin(launch) => dispatcher.open_plugin(launch),
            ActionTarget::LaunchApp(app) => dispatcher.launch_app(app),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub match_cache_capacity: usize,
    pub plugin_cache_ttl: Duration,
    pub incremental: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            match_cache_capacity: DEFAULT_MATCH_CACHE_CAPACITY,
            plugin_cache_ttl: DEFAULT_PLUGIN_CACHE_TTL,
            incremental: true,
        }
    }
}

struct LastSearch {
    query: String,
    strict: bool,
    results: Vec<ActionOption>,
}

pub struct SearchEngine {
    index: PluginIndex,
    matcher: Matcher,
    apps: Vec<LocalApp>,
    volatile_apps: Vec<usize>,
    incremental: bool,
    last: Option<LastSearch>,
}

impl SearchEngine {
    pub fn new(source: Box<dyn PluginSource>, options: SearchOptions) -> Self {
        Self {
            index: PluginIndex::new(source, options.plugin_cache_ttl),
            matcher: Matcher::new(options.match_cache_capacity),
            apps: Vec::new(),
            volatile_apps: Vec::new(),
            incremental: options.incremental,
            last: None,
        }
    }

    pub fn build_index(&mut self) {
        self.index.build();
    }

    pub fn rebuild_index(&mut self) {
        self.last = None;
        self.index.rebuild();
    }

    pub fn index_len(&mut self) -> usize {
        self.index.entries().len()
    }

    pub fn set_apps(&mut self, apps: Vec<LocalApp>) {
        self.volatile_apps = apps
            .iter()
            .enumerate()
            .filter(|(_, app)| {
                app.search_terms()
                    .into_iter()
                    .any(is_abbreviation_candidate)
            })
            .map(|(position, _)| position)
            .collect();
        self.apps = apps;
        self.last = None;
    }

    pub fn apps(&self) -> &[LocalApp] {
        &self.apps
    }

    pub fn matcher_stats(&self) -> CacheStats {
        self.matcher.stats()
    }

    /// Resolves `value` into ranked actions. `strict` disables regex and
    /// wildcard triggers.
    pub fn get_options_from_query(&mut self, value: &str, strict: bool) -> Vec<ActionOption> {
        if value.trim().is_empty() {
            self.last = None;
            return Vec::new();
        }
        self.index.build();

        let mut options = match self.incremental_candidates(value, strict) {
            Some(options) => options,
            None => self.full_scan(value, strict),
        };
        options.sort_by(|left, right| {
            right
                .weight
                .cmp(&left.weight)
                .then(left.source.cmp(&right.source))
        });

        self.last = Some(LastSearch {
            query: value.to_string(),
            strict,
            results: options.clone(),
        });
        options
    }

    fn full_scan(&mut self, value: &str, strict: bool) -> Vec<ActionOption> {
        let sources: Vec<OptionSource> = (0..self.index.len())
            .map(OptionSource::Entry)
            .chain((0..self.apps.len()).map(OptionSource::App))
            .collect();
        sources
            .into_iter()
            .filter_map(|source| self.evaluate(source, value, strict))
            .collect()
    }

    // Phonetic matches survive prefix extension only when the shorter query
    // matched, so prior results are re-checked and every entry that can
    // newly appear (regex, wildcard, initials) is scanned again.
    fn incremental_candidates(&mut self, value: &str, strict: bool) -> Option<Vec<ActionOption>> {
        if !self.incremental {
            return None;
        }
        let last = self.last.as_ref()?;
        if last.strict != strict
            || last.results.is_empty()
            || last.query.len() >= value.len()
            || !value.starts_with(&last.query)
        {
            return None;
        }

        let mut sources: Vec<OptionSource> =
            last.results.iter().map(|option| option.source).collect();
        sources.extend(
            self.index
                .volatile_positions()
                .iter()
                .copied()
                .map(OptionSource::Entry),
        );
        sources.extend(self.volatile_apps.iter().copied().map(OptionSource::App));

        let mut seen = HashSet::new();
        let options = sources
            .into_iter()
            .filter(|source| seen.insert(*source))
            .filter_map(|source| self.evaluate(source, value, strict))
            .collect();
        Some(options)
    }

    fn evaluate(&mut self, source: OptionSource, value: &str, strict: bool) -> Option<ActionOption> {
        match source {
            OptionSource::Entry(position) => self.evaluate_entry(position, value, strict),
            OptionSource::App(position) => self.evaluate_app(position, value),
        }
    }

    fn evaluate_entry(&mut self, position: usize, value: &str, strict: bool) -> Option<ActionOption> {
        let entry = self.index.entry(position)?;
        let (weight, spans) = match (entry.cmd(), entry.cmd_type) {
            (Cmd::Label(label), _) => {
                let found = self.matcher.matches(label, value)?;
                (text_weight(label, value, &found), found.spans)
            }
            (_, Some(CmdType::Regex)) if !strict => {
                let pattern = self.index.pattern(position)?;
                if !pattern.is_match(value) {
                    return None;
                }
                (REGEX_WEIGHT, Vec::new())
            }
            (_, Some(CmdType::Over)) if !strict => (OVER_WEIGHT, Vec::new()),
            _ => return None,
        };

        let feature = entry.feature();
        let ext = entry.cmd_type.map(|kind| FeaturePayload {
            code: feature.code.clone(),
            kind,
            payload: Value::String(value.to_string()),
        });
        let plugin = &entry.plugin;
        Some(ActionOption {
            name: entry.cmd_label.clone(),
            value: plugin.name.clone(),
            icon: plugin
                .logo_path
                .clone()
                .or_else(|| Some(plugin.logo.clone()).filter(|logo| !logo.is_empty())),
            description: feature.explain.clone(),
            plugin_type: plugin.plugin_type,
            weight,
            spans,
            source: OptionSource::Entry(position),
            action: ActionTarget::OpenPlugin(PluginLaunch {
                plugin: Arc::clone(plugin),
                feature_code: feature.code.clone(),
                cmd: entry.cmd().clone(),
                ext,
            }),
        })
    }

    fn evaluate_app(&mut self, position: usize, value: &str) -> Option<ActionOption> {
        let app = self.apps.get(position)?;
        let (keyword, found) = app
            .search_terms()
            .into_iter()
            .find_map(|keyword| self.matcher.matches(keyword, value).map(|found| (keyword, found)))?;

        Some(ActionOption {
            name: keyword.to_string(),
            value: "app".to_string(),
            icon: app.icon.clone(),
            description: app.description.clone(),
            plugin_type: PluginType::App,
            weight: text_weight(keyword, value, &found),
            spans: found.spans,
            source: OptionSource::App(position),
            action: ActionTarget::LaunchApp(app.clone()),
        })
    }
}

/// Exact labels first, then initials, then matches anchored at the label
/// start; shorter labels and earlier hits win within a tier.
fn text_weight(label: &str, query: &str, found: &LabelMatch) -> i64 {
    let label_len = label.chars().count() as i64;
    let query_len = query.chars().filter(|c| !c.is_whitespace()).count() as i64;
    let start = found.start() as i64;

    let tier = if normalize_for_search(label) == normalize_for_search(query) {
        EXACT_WEIGHT
    } else {
        match found.kind {
            MatchKind::Abbreviation => ABBREVIATION_WEIGHT,
            MatchKind::Phonetic if start == 0 => PREFIX_WEIGHT,
            MatchKind::Phonetic => SUBSTRING_WEIGHT,
        }
    };
    tier - (label_len - query_len).max(0) - start
}
