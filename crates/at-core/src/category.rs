//! Activity categories and the rule-based categorizer.
//!
//! # Matching policy
//!
//! All matching is case-insensitive substring matching.
//!
//! 1. An app id matching an entry of the ignore list is [`CategoryLabel::Ignored`].
//!    An exact match is tried before a substring match.
//! 2. Every rule is tried against the app id, in configuration order.
//! 3. Only when no rule matched the app id are the rules tried again, in the same
//!    order, against the window title using their title keywords.
//! 4. Anything else is [`CategoryLabel::Uncategorized`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::observation::Observation;

/// Reserved label for observations that match no rule.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Reserved label for ignored applications. Never stored.
pub const IGNORED: &str = "Ignored";

/// The category a session is recorded under.
///
/// Narrower than [`CategoryLabel`]: an ignored observation never becomes a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// A user-configured category.
    Named(String),
    /// No rule matched.
    Uncategorized,
}

impl Category {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Uncategorized => UNCATEGORIZED,
        }
    }

    /// Parses a stored category name, mapping the reserved name back to
    /// [`Category::Uncategorized`].
    pub fn from_stored(value: &str) -> Self {
        if value == UNCATEGORIZED {
            Self::Uncategorized
        } else {
            Self::Named(value.to_string())
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from_stored(&value))
    }
}

/// Result of classifying one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryLabel {
    Named(String),
    Uncategorized,
    /// The app is on the ignore list; the tick records no activity.
    Ignored,
}

impl CategoryLabel {
    /// Converts to a session category, or `None` for ignored apps.
    pub fn into_category(self) -> Option<Category> {
        match self {
            Self::Named(name) => Some(Category::Named(name)),
            Self::Uncategorized => Some(Category::Uncategorized),
            Self::Ignored => None,
        }
    }
}

impl fmt::Display for CategoryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Uncategorized => f.write_str(UNCATEGORIZED),
            Self::Ignored => f.write_str(IGNORED),
        }
    }
}

/// A user-configured category and the keywords that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category name shown in reports.
    pub name: String,
    /// Keywords matched against the app id.
    #[serde(default)]
    pub apps: Vec<String>,
    /// Keywords matched against the window title.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub titles: Vec<String>,
}

impl CategoryRule {
    pub fn new<I, S>(name: impl Into<String>, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            apps: apps.into_iter().map(Into::into).collect(),
            titles: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.titles = titles.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    apps: Vec<String>,
    titles: Vec<String>,
}

/// Lowercases keywords and drops blank ones, so a stray `""` can never match everything.
fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .filter(|keyword| !keyword.is_empty())
        .collect()
}

/// Maps observations to category labels. Pure and total.
#[derive(Debug, Clone)]
pub struct Categorizer {
    ignored: Vec<String>,
    rules: Vec<CompiledRule>,
}

impl Categorizer {
    pub fn new(rules: &[CategoryRule], ignored_apps: &[String]) -> Self {
        Self {
            ignored: normalize_keywords(ignored_apps),
            rules: rules
                .iter()
                .map(|rule| CompiledRule {
                    name: rule.name.clone(),
                    apps: normalize_keywords(&rule.apps),
                    titles: normalize_keywords(&rule.titles),
                })
                .collect(),
        }
    }

    pub fn classify(&self, observation: &Observation) -> CategoryLabel {
        let app = observation.app_id.to_lowercase();
        if self.is_ignored(&app) {
            return CategoryLabel::Ignored;
        }

        let by_app = self
            .rules
            .iter()
            .find(|rule| rule.apps.iter().any(|keyword| app.contains(keyword.as_str())));
        if let Some(rule) = by_app {
            return CategoryLabel::Named(rule.name.clone());
        }

        let title = observation.window_title.to_lowercase();
        if !title.is_empty() {
            let by_title = self.rules.iter().find(|rule| {
                rule.titles
                    .iter()
                    .any(|keyword| title.contains(keyword.as_str()))
            });
            if let Some(rule) = by_title {
                return CategoryLabel::Named(rule.name.clone());
            }
        }

        CategoryLabel::Uncategorized
    }

    fn is_ignored(&self, app: &str) -> bool {
        self.ignored.iter().any(|entry| entry == app)
            || self
                .ignored
                .iter()
                .any(|entry| app.contains(entry.as_str()))
    }
}
