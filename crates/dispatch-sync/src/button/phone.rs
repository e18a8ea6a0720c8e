//! Phone number entry that can never hold an invalid prefix.
//!
//! Accepted values are progressive prefixes of `+7XXXXXXXXXX` (12 characters) or
//! `8XXXXXXXXXX` (11 characters), plus the empty string and a bare `+`. An edit that
//! would leave anything else is rejected and the input keeps its last valid value.

use thiserror::Error;

const PLUS_SEVEN_LEN: usize = 12;
const EIGHT_LEN: usize = 11;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("not a valid phone prefix: {0:?}")]
    InvalidPhone(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneInput {
    value: String,
}

impl PhoneInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Replaces the whole value, as a text field edit does.
    pub fn set(&mut self, candidate: &str) -> Result<(), ValidationError> {
        if !is_valid_prefix(candidate) {
            return Err(ValidationError::InvalidPhone(candidate.to_string()));
        }
        self.value = candidate.to_string();
        Ok(())
    }

    /// Appends one typed character.
    pub fn push(&mut self, ch: char) -> Result<(), ValidationError> {
        let mut candidate = self.value.clone();
        candidate.push(ch);
        self.set(&candidate)
    }

    pub fn is_complete(&self) -> bool {
        let digits_after = |prefix: &str| {
            self.value
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit()))
        };
        (self.value.len() == PLUS_SEVEN_LEN && digits_after("+7"))
            || (self.value.len() == EIGHT_LEN && digits_after("8"))
    }
}

fn is_valid_prefix(s: &str) -> bool {
    let digits = |rest: &str, max: usize| rest.len() <= max && rest.chars().all(|c| c.is_ascii_digit());

    if s.is_empty() || s == "+" {
        return true;
    }
    if let Some(rest) = s.strip_prefix("+7") {
        return digits(rest, PLUS_SEVEN_LEN - 2);
    }
    if let Some(rest) = s.strip_prefix('8') {
        return digits(rest, EIGHT_LEN - 1);
    }
    false
}
