//! Correlation of free-text validation diagnostics with harvested entities.
//!
//! The validator emits one line per finding. By convention each line embeds
//! the entity class as `classname='Dataset'`, the entity URI somewhere in the
//! text, and a severity marker (`validation_error` / `validation_warning`).
//! Messages are parsed into [`Diagnostic`]s once and matched per entity.

use serde::Deserialize;
use std::collections::HashMap;

use crate::model::ValidationRecord;

pub const CATALOG_CLASS: &str = "Catalog";
pub const DATASET_CLASS: &str = "Dataset";

const CLASS_TAG: &str = "classname='";
const ERROR_MARKER: &str = "validation_error";
const WARNING_MARKER: &str = "validation_warning";

/// Characters that may close a sentence or quote right after a URI.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ':', ';', '!', '?', ')', ']', '\'', '"'];

/// How an entity URI is matched inside message text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UriMatching {
    /// Plain containment; a URI matches inside any longer URI it prefixes.
    #[default]
    Substring,
    /// The URI must not run on into a longer URI, so `http://x/1` does not
    /// match inside `http://x/10`. Trailing punctuation such as `http://x/1:`
    /// or `http://x/1.` at the end of a sentence still matches.
    Bounded,
}

/// A validation message with its embedded tags extracted.
///
/// A message may carry several class tags and both severity markers; each
/// is honoured independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic<'a> {
    pub text: &'a str,
    pub classes: Vec<&'a str>,
    pub is_error: bool,
    pub is_warning: bool,
}

impl<'a> Diagnostic<'a> {
    pub fn parse(text: &'a str) -> Self {
        let classes = text
            .match_indices(CLASS_TAG)
            .filter_map(|(start, _)| {
                let rest = &text[start + CLASS_TAG.len()..];
                rest.find('\'').map(|end| &rest[..end])
            })
            .collect();

        Self {
            text,
            classes,
            is_error: text.contains(ERROR_MARKER),
            is_warning: text.contains(WARNING_MARKER),
        }
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.contains(&class)
    }
}

/// Validation records for one catalog and its datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub catalog: ValidationRecord,

    /// Keyed by dataset URI; only datasets with at least one message appear
    pub datasets: HashMap<String, ValidationRecord>,
}

impl Correlation {
    pub fn for_dataset(&self, uri: &str) -> Option<&ValidationRecord> {
        self.datasets.get(uri)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationCorrelator {
    uri_matching: UriMatching,
}

impl ValidationCorrelator {
    pub fn new(uri_matching: UriMatching) -> Self {
        Self { uri_matching }
    }

    pub fn correlate<'u, I>(&self, messages: &[String], catalog_uri: &str, dataset_uris: I) -> Correlation
    where
        I: IntoIterator<Item = &'u str>,
    {
        let diagnostics: Vec<Diagnostic<'_>> =
            messages.iter().map(|m| Diagnostic::parse(m)).collect();

        let catalog = record(
            catalog_uri,
            CATALOG_CLASS,
            diagnostics.iter().filter(|d| d.has_class(CATALOG_CLASS)),
        );

        let datasets = dataset_uris
            .into_iter()
            .filter_map(|uri| {
                self.dataset_record(uri, &diagnostics)
                    .map(|record| (uri.to_string(), record))
            })
            .collect();

        Correlation { catalog, datasets }
    }

    /// Record for one dataset, or `None` when no message concerns it.
    pub fn dataset_record(&self, uri: &str, diagnostics: &[Diagnostic<'_>]) -> Option<ValidationRecord> {
        let record = record(
            uri,
            DATASET_CLASS,
            diagnostics
                .iter()
                .filter(|d| d.has_class(DATASET_CLASS) && self.mentions(d.text, uri)),
        );
        (!record.messages.is_empty()).then_some(record)
    }

    fn mentions(&self, text: &str, uri: &str) -> bool {
        if uri.is_empty() {
            return false;
        }
        match self.uri_matching {
            UriMatching::Substring => text.contains(uri),
            UriMatching::Bounded => text.match_indices(uri).any(|(at, _)| {
                text[at + uri.len()..]
                    .trim_start_matches(TRAILING_PUNCTUATION)
                    .chars()
                    .next()
                    .map_or(true, |next| !continues_uri(next))
            }),
        }
    }
}

fn continues_uri(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-._~/?#%=&+:@".contains(c)
}

fn record<'d, 't: 'd, I>(uri: &str, class: &str, diagnostics: I) -> ValidationRecord
where
    I: IntoIterator<Item = &'d Diagnostic<'t>>,
{
    let mut record = ValidationRecord {
        entity_uri: uri.to_string(),
        entity_class: class.to_string(),
        ..ValidationRecord::default()
    };
    for diagnostic in diagnostics {
        if diagnostic.is_error {
            record.error_count += 1;
        }
        if diagnostic.is_warning {
            record.warning_count += 1;
        }
        record.messages.push(diagnostic.text.to_string());
    }
    record
}
