//! Input shape checks. Every violation is collected and reported at once.

use crate::error::{AppError, AppResult};

pub const THEME_MAX_CHARS: usize = 500;
pub const MESSAGE_MAX_CHARS: usize = 4000;
pub const NAME_MAX_CHARS: usize = 100;
pub const FEEDBACK_MAX_CHARS: usize = 2000;

/// Collects violations and turns them into one `ValidationFailed`.
#[derive(Debug, Default)]
pub struct Validator {
    violations: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require 1..=max characters after trimming.
    pub fn text(mut self, field: &str, value: &str, max: usize) -> Self {
        let len = value.trim().chars().count();
        if len == 0 {
            self.violations.push(format!("{} is required", field));
        } else if len > max {
            self.violations
                .push(format!("{} must be at most {} characters", field, max));
        }
        self
    }

    /// Allow absence, but cap the length when present.
    pub fn optional_text(mut self, field: &str, value: Option<&str>, max: usize) -> Self {
        if let Some(value) = value {
            if value.trim().chars().count() > max {
                self.violations
                    .push(format!("{} must be at most {} characters", field, max));
            }
        }
        self
    }

    pub fn finish(self) -> AppResult<()> {
        if self.violations.is_empty() {
            return Ok(());
        }
        Err(AppError::ValidationFailed {
            message: self.violations.join("; "),
        })
    }
}

/// Trimmed text, or `None` when blank.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
