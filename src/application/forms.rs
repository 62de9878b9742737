//! Dashboard form validation.
//!
//! Stricter than the cache's own checks: the form reports every field
//! problem at once so the editor can show them next to the inputs.

use std::fmt;

use serde::Serialize;

use crate::domain::posts::PostDraft;

const TITLE_MIN_CHARS: usize = 3;
const BODY_MIN_CHARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors {
    pub errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&'static str> {
        self.errors
            .iter()
            .find(|error| error.field == field)
            .map(|error| error.message)
    }

    fn push(&mut self, field: &'static str, message: &'static str) {
        self.errors.push(FieldError { field, message });
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Title and content as typed into the post editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostForm {
    pub title: String,
    pub body: String,
}

impl PostForm {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();

        if self.title.trim().is_empty() {
            errors.push("title", "Title is required");
        } else if self.title.chars().count() < TITLE_MIN_CHARS {
            errors.push("title", "Title must be at least 3 characters");
        }

        if self.body.trim().is_empty() {
            errors.push("body", "Content is required");
        } else if self.body.chars().count() < BODY_MIN_CHARS {
            errors.push("body", "Content must be at least 10 characters");
        }

        errors
    }

    /// Validate and convert into a draft for the cache.
    pub fn into_draft(self, user_id: Option<i64>) -> Result<PostDraft, FormErrors> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(PostDraft {
            title: self.title,
            body: self.body,
            user_id,
        })
    }
}
