use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_SEAT_NAME_LEN: usize = 16;
pub const MAX_HOLDER_CODE_LEN: usize = 128;

/// Normalised seat identifier: trimmed, upper case, `[A-Z0-9-]{1,16}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SeatName(String);

impl SeatName {
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CoreError::ValidationError("seat name is empty".to_string()));
        }
        if trimmed.len() > MAX_SEAT_NAME_LEN {
            return Err(CoreError::ValidationError(format!(
                "seat name '{}' is longer than {} characters",
                trimmed, MAX_SEAT_NAME_LEN
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(CoreError::ValidationError(format!(
                "seat name '{}' contains invalid character '{}'",
                trimmed, bad
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SeatName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        SeatName::parse(&value)
    }
}

impl From<SeatName> for String {
    fn from(value: SeatName) -> Self {
        value.0
    }
}

pub fn validate_holder_code(code: &str) -> CoreResult<()> {
    if code.trim().is_empty() {
        return Err(CoreError::ValidationError("holder code is empty".to_string()));
    }
    if code.len() > MAX_HOLDER_CODE_LEN {
        return Err(CoreError::ValidationError(format!(
            "holder code is longer than {} characters",
            MAX_HOLDER_CODE_LEN
        )));
    }
    Ok(())
}
