use serde::{Deserialize, Serialize};

/// Operations a detached plugin window sends over its control channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DetachRequest {
    Minimize,
    Maximize,
    Close,
    Pin,
    Unpin,
    EndFullScreen,
    InputChange { text: String },
}

impl DetachRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Minimize => "minimize",
            Self::Maximize => "maximize",
            Self::Close => "close",
            Self::Pin => "pin",
            Self::Unpin => "unpin",
            Self::EndFullScreen => "endFullScreen",
            Self::InputChange { .. } => "inputChange",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum KeyEventKind {
    KeyDown,
    KeyUp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyInput {
    #[serde(rename = "type")]
    pub kind: KeyEventKind,
    pub key: String,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub control: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
}

impl KeyInput {
    pub fn key_down(key: &str) -> Self {
        Self {
            kind: KeyEventKind::KeyDown,
            key: key.to_string(),
            meta: false,
            control: false,
            shift: false,
            alt: false,
        }
    }

    pub fn has_modifier(&self) -> bool {
        self.meta || self.control || self.shift || self.alt
    }
}
