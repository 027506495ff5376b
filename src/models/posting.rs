//! Posting input and verdict structures.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::LocationInfo;

/// A scraped job posting submitted for dedup.
///
/// Only `id` is required; every other field defaults to an empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostingInput {
    /// Caller-assigned id, unique within the index namespace
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub company: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Free-text location as scraped
    #[serde(default, alias = "location")]
    pub raw_location: String,
}

impl PostingInput {
    /// Create a posting with the given id and empty text fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn location(mut self, raw_location: impl Into<String>) -> Self {
        self.raw_location = raw_location.into();
        self
    }

    /// Reject postings without an id before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::validation("posting is missing its id"));
        }
        Ok(())
    }
}

/// Outcome of running one posting through the duplicate resolver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub is_duplicate: bool,

    /// Id of the canonical posting this one duplicates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hamming_distance: Option<u32>,

    /// Hex-encoded 64-bit fingerprint of the submitted posting
    pub fingerprint: String,

    /// Whether the posting was written to the index (absent for duplicates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationInfo>,
}

impl Verdict {
    pub fn duplicate(
        duplicate_of: impl Into<String>,
        distance: u32,
        fingerprint: impl Into<String>,
        location: LocationInfo,
    ) -> Self {
        Self {
            is_duplicate: true,
            duplicate_of: Some(duplicate_of.into()),
            hamming_distance: Some(distance),
            fingerprint: fingerprint.into(),
            indexed: None,
            location: Some(location),
        }
    }

    pub fn unique(fingerprint: impl Into<String>, indexed: bool, location: LocationInfo) -> Self {
        Self {
            is_duplicate: false,
            duplicate_of: None,
            hamming_distance: None,
            fingerprint: fingerprint.into(),
            indexed: Some(indexed),
            location: Some(location),
        }
    }
}

/// Per-posting entry in a batch result list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,

    /// Error message when the posting failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobResult {
    pub fn ok(id: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            id: id.into(),
            verdict: Some(verdict),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl ToString) -> Self {
        Self {
            id: id.into(),
            verdict: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate counters for one batch call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    pub duplicates: usize,
    pub indexed: usize,
    pub errors: usize,
}

/// Return value of a completed batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<JobResult>,
    pub stats: BatchStats,
}

/// Split of ids into already-indexed and unseen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExistenceCheck {
    pub existing: Vec<String>,
    pub new: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_default_to_empty() {
        let posting: PostingInput = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(posting.id, "abc");
        assert_eq!(posting.company, "");
        assert_eq!(posting.raw_location, "");
    }

    #[test]
    fn test_location_alias_is_accepted() {
        let posting: PostingInput =
            serde_json::from_str(r#"{"id": "abc", "location": "Chicago, IL"}"#).unwrap();
        assert_eq!(posting.raw_location, "Chicago, IL");
    }

    #[test]
    fn test_validate_rejects_blank_id() {
        assert!(PostingInput::new("  ").validate().is_err());
        assert!(PostingInput::new("job-1").validate().is_ok());
    }

    #[test]
    fn test_duplicate_verdict_serializes_camel_case() {
        let verdict = Verdict::duplicate("job-1", 3, "00ff", LocationInfo::remote());
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["isDuplicate"], true);
        assert_eq!(json["duplicateOf"], "job-1");
        assert_eq!(json["hammingDistance"], 3);
        assert!(json.get("indexed").is_none());
    }
}
