//! Per-request user context
//!
//! Carries the caller's locale and localizer into validation and formatting
//! calls, and collects validation messages and the last failure message so a
//! rendering layer can report them without unwinding.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Translates message keys and localized column values
pub trait Localizer: Send + Sync {
    /// Localized text for `key`, if a translation exists
    fn localize(&self, locale: Option<&str>, key: &str) -> Option<String>;
}

/// In-memory localizer keyed by (locale, key)
#[derive(Debug, Clone, Default)]
pub struct MapLocalizer {
    entries: HashMap<(String, String), String>,
}

impl MapLocalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) {
        self.entries.insert((locale.into(), key.into()), text.into());
    }

    pub fn with(
        mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.insert(locale, key, text);
        self
    }
}

impl Localizer for MapLocalizer {
    fn localize(&self, locale: Option<&str>, key: &str) -> Option<String> {
        let locale = locale?;
        self.entries
            .get(&(locale.to_string(), key.to_string()))
            .cloned()
    }
}

/// A validation failure for one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMessage {
    pub column: String,
    pub message: String,
}

/// Explicit request context passed to validating and localizing calls
#[derive(Default)]
pub struct UserContext {
    locale: Option<String>,
    localizer: Option<Arc<dyn Localizer>>,
    validation: Mutex<Vec<ValidationMessage>>,
    last_error: Mutex<Option<String>>,
}

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn with_localizer(mut self, localizer: Arc<dyn Localizer>) -> Self {
        self.localizer = Some(localizer);
        self
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Localized text for `key`, or the key itself when no translation exists
    pub fn localize(&self, key: &str) -> String {
        self.localizer
            .as_ref()
            .and_then(|l| l.localize(self.locale.as_deref(), key))
            .unwrap_or_else(|| key.to_string())
    }

    /// Record a validation failure; the message goes through the localizer
    pub fn add_validation_error(&self, column: impl Into<String>, message: &str) {
        let message = self.localize(message);
        self.validation.lock().push(ValidationMessage {
            column: column.into(),
            message,
        });
    }

    pub fn validation_errors(&self) -> Vec<ValidationMessage> {
        self.validation.lock().clone()
    }

    /// Messages recorded for one column
    pub fn errors_for(&self, column: &str) -> Vec<String> {
        self.validation
            .lock()
            .iter()
            .filter(|m| m.column == column)
            .map(|m| m.message.clone())
            .collect()
    }

    pub fn has_validation_errors(&self) -> bool {
        !self.validation.lock().is_empty()
    }

    pub fn clear_validation_errors(&self) {
        self.validation.lock().clear();
    }

    pub fn set_error(&self, message: impl Into<String>) {
        *self.last_error.lock() = Some(message.into());
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn take_error(&self) -> Option<String> {
        self.last_error.lock().take()
    }
}
