//! Stylesheet sinks.
//!
//! The pipeline hands every compiled style block to an [`StyleSink`] and
//! never reads it back.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Receiver of generated stylesheets. `scope_id` is set only for scoped blocks.
pub trait StyleSink: Send + Sync {
    fn add_style(&self, css: &str, scope_id: Option<&str>);
}

impl<F> StyleSink for F
where
    F: Fn(&str, Option<&str>) + Send + Sync,
{
    fn add_style(&self, css: &str, scope_id: Option<&str>) {
        self(css, scope_id)
    }
}

/// One delivered stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleEntry {
    pub css: String,
    pub scope_id: Option<String>,
}

/// In-memory sink recording stylesheets in delivery order.
#[derive(Debug, Clone, Default)]
pub struct StyleBuffer {
    entries: Arc<Mutex<Vec<StyleEntry>>>,
}

impl StyleBuffer {
    /// Create a new empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StyleEntry> {
        self.entries.lock().clone()
    }

    /// All delivered CSS joined in delivery order.
    pub fn stitch(&self) -> String {
        self.entries
            .lock()
            .iter()
            .map(|entry| entry.css.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing was delivered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every recorded stylesheet.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl StyleSink for StyleBuffer {
    fn add_style(&self, css: &str, scope_id: Option<&str>) {
        self.entries.lock().push(StyleEntry {
            css: css.to_string(),
            scope_id: scope_id.map(str::to_string),
        });
    }
}
