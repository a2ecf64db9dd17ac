//! Ordered, key-unique option set and its rendering into an argument list

use crate::utils::paths::normalize_separators;
use std::fmt;
use std::path::Path;

/// Flag every output-path entry renders under
pub const OUTPUT_FLAG: &str = "--output";

/// Output categories that each carry their own output template.
///
/// They all render as `--output "<category>:<template>"`, but only the most
/// recently set one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    Temp,
    Chapter,
    Thumbnail,
    Subtitle,
}

impl OutputTarget {
    /// Category tag placed in front of the template
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Chapter => "chapter",
            Self::Thumbnail => "thumbnail",
            Self::Subtitle => "subtitle",
        }
    }

    /// Real flag this entry is written as
    pub fn flag(&self) -> &'static str {
        OUTPUT_FLAG
    }
}

/// Key of an option entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKey {
    /// Rendered verbatim
    Flag(&'static str),
    /// Rendered as [`OUTPUT_FLAG`]
    Output(OutputTarget),
}

impl OptionKey {
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Flag(name) => name,
            Self::Output(target) => target.flag(),
        }
    }
}

/// Value of an option entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Flag only
    None,
    /// Written as-is
    Bare(String),
    /// Wrapped in double quotes
    Quoted(String),
    /// Separators normalized to `/`, optional `prefix:` tag, then quoted
    Path { prefix: Option<String>, path: String },
}

impl OptionValue {
    pub fn bare(value: impl Into<String>) -> Self {
        Self::Bare(value.into())
    }

    pub fn quoted(value: impl Into<String>) -> Self {
        Self::Quoted(value.into())
    }

    pub fn path(path: impl AsRef<Path>) -> Self {
        Self::Path {
            prefix: None,
            path: path.as_ref().to_string_lossy().to_string(),
        }
    }

    pub fn prefixed_path(prefix: impl Into<String>, path: impl AsRef<Path>) -> Self {
        Self::Path {
            prefix: Some(prefix.into()),
            path: path.as_ref().to_string_lossy().to_string(),
        }
    }

    /// Unquoted text handed to the process as a single argv entry
    pub fn raw(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Bare(v) | Self::Quoted(v) => Some(v.clone()),
            Self::Path { prefix, path } => {
                let path = normalize_separators(path);
                Some(match prefix {
                    Some(prefix) => format!("{}:{}", prefix, path),
                    None => path,
                })
            }
        }
    }

    /// Token as it appears in the single-string command line
    pub fn rendered(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Bare(v) => Some(v.clone()),
            Self::Quoted(_) | Self::Path { .. } => self.raw().map(|v| quote(&v)),
        }
    }

    /// The unprefixed path, for path values
    pub fn as_path(&self) -> Option<&str> {
        match self {
            Self::Path { path, .. } => Some(path),
            _ => None,
        }
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    pub key: OptionKey,
    pub value: OptionValue,
}

/// Insertion-ordered options with last-write-wins semantics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    entries: Vec<OptionEntry>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a plain flag; an existing entry keeps its position and takes the new value
    pub fn set(&mut self, flag: &'static str, value: OptionValue) {
        let key = OptionKey::Flag(flag);
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(OptionEntry { key, value }),
        }
    }

    pub fn set_flag(&mut self, flag: &'static str) {
        self.set(flag, OptionValue::None);
    }

    /// Set a categorised output template, replacing whichever category was set before
    pub fn set_output_target(&mut self, target: OutputTarget, value: OptionValue) {
        self.entries
            .retain(|e| !matches!(e.key, OptionKey::Output(_)));
        self.entries.push(OptionEntry {
            key: OptionKey::Output(target),
            value,
        });
    }

    pub fn remove(&mut self, flag: &str) {
        self.entries
            .retain(|e| !matches!(e.key, OptionKey::Flag(name) if name == flag));
    }

    pub fn get(&self, flag: &str) -> Option<&OptionValue> {
        self.entries.iter().find_map(|e| match e.key {
            OptionKey::Flag(name) if name == flag => Some(&e.value),
            _ => None,
        })
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.get(flag).is_some()
    }

    /// The categorised output template currently set, if any
    pub fn output_target(&self) -> Option<(OutputTarget, &OptionValue)> {
        self.entries.iter().find_map(|e| match e.key {
            OptionKey::Output(target) => Some((target, &e.value)),
            _ => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render in insertion order, with the quoted URL as the last token
    pub fn render(&self, url: &str) -> CommandLine {
        let mut arguments = Vec::with_capacity(self.entries.len() * 2 + 1);

        for entry in &self.entries {
            let flag = entry.key.flag();
            arguments.push(Argument {
                display: flag.to_string(),
                raw: flag.to_string(),
            });

            if let (Some(display), Some(raw)) = (entry.value.rendered(), entry.value.raw()) {
                arguments.push(Argument { display, raw });
            }
        }

        arguments.push(Argument {
            display: quote(url),
            raw: url.to_string(),
        });

        CommandLine { arguments }
    }
}

/// One rendered token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Quoted form used in the single-string command line
    pub display: String,
    /// Unquoted form passed as one argv entry
    pub raw: String,
}

/// Immutable result of rendering an [`OptionSet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    arguments: Vec<Argument>,
}

impl CommandLine {
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(|a| a.display.as_str())
    }

    pub fn argv(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(|a| a.raw.as_str())
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = self.tokens().collect::<Vec<_>>().join(" ");
        f.write_str(&line)
    }
}
