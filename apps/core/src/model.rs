use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Built-in settings plugin; it ships with the launcher and is never upgraded.
pub const SYSTEM_PLUGIN_NAME: &str = "hopper-system-feature";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    #[default]
    Ui,
    System,
    App,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CmdType {
    Text,
    Img,
    File,
    Files,
    Regex,
    Over,
}

impl CmdType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Img => "img",
            Self::File => "file",
            Self::Files => "files",
            Self::Regex => "regex",
            Self::Over => "over",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredCmd {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CmdType>,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,
}

/// A trigger declared by a feature: either a bare label or a typed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cmd {
    Label(String),
    Structured(StructuredCmd),
}

impl Cmd {
    pub fn label(&self) -> &str {
        match self {
            Self::Label(label) => label,
            Self::Structured(cmd) => &cmd.label,
        }
    }

    pub fn cmd_type(&self) -> Option<CmdType> {
        match self {
            Self::Label(_) => None,
            Self::Structured(cmd) => cmd.kind,
        }
    }

    /// Source text of a regex trigger, e.g. `/^\d+$/i`.
    pub fn regex_source(&self) -> Option<&str> {
        match self {
            Self::Structured(StructuredCmd {
                kind: Some(CmdType::Regex),
                pattern: Some(Value::String(source)),
                ..
            }) => Some(source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Feature {
    pub code: String,
    pub explain: String,
    pub cmds: Vec<Cmd>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSetting {
    pub height: Option<u32>,
    #[serde(rename = "autoDetach")]
    pub auto_detach: bool,
}

/// Payload handed to a plugin when one of its features is entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePayload {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: CmdType,
    pub payload: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub name: String,
    pub plugin_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
    pub version: String,
    pub description: String,
    #[serde(deserialize_with = "author_name")]
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preload: Option<String>,
    pub logo: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_path: Option<String>,
    pub platform: Vec<String>,
    pub plugin_type: PluginType,
    pub features: Vec<Feature>,
    #[serde(rename = "isDev")]
    pub dev_mode: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub development: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tpl_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_setting: Option<PluginSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext: Option<FeaturePayload>,
}

// npm writes `author` either as "Name <mail>" or as `{ "name": .., "email": .. }`.
fn author_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Author {
        Plain(String),
        Person {
            #[serde(default)]
            name: String,
        },
    }

    Ok(match Option::<Author>::deserialize(deserializer)? {
        Some(Author::Plain(name)) | Some(Author::Person { name }) => name,
        None => String::new(),
    })
}

impl PluginDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Package name the plugin was installed under.
    pub fn origin(&self) -> &str {
        self.origin_name
            .as_deref()
            .filter(|origin| !origin.trim().is_empty())
            .unwrap_or(&self.name)
    }

    pub fn display_name(&self) -> &str {
        if self.plugin_name.trim().is_empty() {
            &self.name
        } else {
            &self.plugin_name
        }
    }

    pub fn supports_platform(&self, os: &str) -> bool {
        if self.platform.is_empty() {
            return true;
        }
        let current = platform_alias(os);
        self.platform
            .iter()
            .any(|declared| platform_alias(declared) == current)
    }

    pub fn command_count(&self) -> usize {
        self.features.iter().map(|feature| feature.cmds.len()).sum()
    }
}

fn platform_alias(value: &str) -> &str {
    match value.trim() {
        "win32" | "windows" => "windows",
        "darwin" | "macos" => "macos",
        other => other,
    }
}

/// An installed desktop application offered next to plugin commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalApp {
    pub name: String,
    pub keywords: Vec<String>,
    pub icon: Option<String>,
    pub description: String,
    pub command: String,
    pub args: Vec<String>,
}

impl LocalApp {
    pub fn new(name: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            keywords: vec![name.to_string()],
            description: command.to_string(),
            command: command.to_string(),
            ..Default::default()
        }
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        for keyword in keywords {
            if !self.keywords.iter().any(|existing| existing == keyword) {
                self.keywords.push((*keyword).to_string());
            }
        }
        self
    }

    /// Keywords tried in order when matching; falls back to the display name.
    pub fn search_terms(&self) -> Vec<&str> {
        if self.keywords.is_empty() {
            vec![self.name.as_str()]
        } else {
            self.keywords.iter().map(String::as_str).collect()
        }
    }
}

pub fn normalize_for_search(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Cmd, CmdType, PluginDescriptor, PluginType};

    #[test]
    fn parses_mixed_cmd_shapes() {
        let raw = r#"{
            "name": "calc",
            "pluginType": "ui",
            "features": [{
                "code": "calc",
                "explain": "Calculator",
                "cmds": ["calc", {"label": "Math", "type": "regex", "match": "/^\\d+[+*/-]\\d+$/"}]
            }]
        }"#;
        let plugin: PluginDescriptor = serde_json::from_str(raw).unwrap();

        assert_eq!(plugin.plugin_type, PluginType::Ui);
        assert_eq!(plugin.command_count(), 2);
        let cmds = &plugin.features[0].cmds;
        assert!(matches!(&cmds[0], Cmd::Label(label) if label == "calc"));
        assert_eq!(cmds[1].cmd_type(), Some(CmdType::Regex));
        assert_eq!(cmds[1].regex_source(), Some("/^\\d+[+*/-]\\d+$/"));
    }

    #[test]
    fn platform_aliases_match_runtime_names() {
        let mut plugin = PluginDescriptor::new("p");
        assert!(plugin.supports_platform("linux"));

        plugin.platform = vec!["win32".to_string(), "darwin".to_string()];
        assert!(plugin.supports_platform("windows"));
        assert!(plugin.supports_platform("macos"));
        assert!(!plugin.supports_platform("linux"));
    }

    #[test]
    fn origin_falls_back_to_name() {
        let mut plugin = PluginDescriptor::new("hopper-translate");
        assert_eq!(plugin.origin(), "hopper-translate");
        plugin.origin_name = Some("hopper-translate-pkg".to_string());
        assert_eq!(plugin.origin(), "hopper-translate-pkg");
    }

    #[test]
    fn author_accepts_npm_person_object() {
        let plugin: PluginDescriptor =
            serde_json::from_str(r#"{"name":"p","author":{"name":"someone","email":"a@b"}}"#)
                .unwrap();
        assert_eq!(plugin.author, "someone");

        let plugin: PluginDescriptor = serde_json::from_str(r#"{"author":"solo"}"#).unwrap();
        assert_eq!(plugin.author, "solo");
    }
}
