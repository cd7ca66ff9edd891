//! Ticket classification into required skill tags.

use deskline_core::{Ticket, ValidationError};
use regex::Regex;
use std::collections::BTreeSet;

/// Supplies the skill tags an owner of `ticket` must have at least one of.
pub trait Classifier: Send + Sync {
    fn required_tags(&self, ticket: &Ticket) -> BTreeSet<String>;
}

/// A regex over subject and body that yields a tag when it matches.
#[derive(Debug, Clone)]
pub struct TagRule {
    pub pattern: Regex,
    pub tag: String,
}

impl TagRule {
    /// Compile a case-insensitive rule.
    pub fn new(pattern: &str, tag: impl Into<String>) -> Result<Self, ValidationError> {
        let pattern = Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
            ValidationError::InvalidValue {
                field: "pattern".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            pattern,
            tag: normalize(&tag.into()),
        })
    }
}

/// Keyword-based classifier.
///
/// Tags come from three places, in order: the ticket's category (verbatim,
/// lower-cased), every rule whose pattern matches the subject or body, and
/// finally the default tag if neither produced anything.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier {
    rules: Vec<TagRule>,
    default_tag: Option<String>,
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: TagRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_default_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = normalize(&tag.into());
        self.default_tag = (!tag.is_empty()).then_some(tag);
        self
    }

    /// Rules for common helpdesk areas.
    pub fn standard(default_tag: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self::new()
            .with_rule(TagRule::new(
                r"\b(printers?|scanners?|monitors?|laptops?|keyboards?)\b",
                "hardware",
            )?)
            .with_rule(TagRule::new(r"\b(vpn|wi-?fi|network|dns|proxy)\b", "network")?)
            .with_rule(TagRule::new(r"\b(invoices?|refunds?|billing|payments?)\b", "billing")?)
            .with_rule(TagRule::new(
                r"\b(passwords?|login|2fa|mfa|sso|locked out)\b",
                "access",
            )?)
            .with_default_tag(default_tag))
    }
}

impl Classifier for KeywordClassifier {
    fn required_tags(&self, ticket: &Ticket) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();

        if let Some(category) = ticket.category.as_deref() {
            let category = normalize(category);
            if !category.is_empty() {
                tags.insert(category);
            }
        }

        for rule in &self.rules {
            if rule.pattern.is_match(&ticket.subject) || rule.pattern.is_match(&ticket.body) {
                tags.insert(rule.tag.clone());
            }
        }

        if tags.is_empty() {
            if let Some(default) = &self.default_tag {
                tags.insert(default.clone());
            }
        }

        tags
    }
}

fn normalize(tag: &str) -> String {
    tag.trim().to_lowercase()
}
