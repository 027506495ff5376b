//! Namespaced key builders.

use chrono::NaiveDate;

/// Builds every key an index instance reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    prefix: String,
}

impl Keys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Root of the namespace; every key below starts with it.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn fingerprint(&self, id: &str) -> String {
        format!("{}fp:{}", self.prefix, id)
    }

    pub fn fingerprint_prefix(&self) -> String {
        format!("{}fp:", self.prefix)
    }

    pub fn location(&self, id: &str) -> String {
        format!("{}loc:{}", self.prefix, id)
    }

    pub fn band(&self, band_key: &str) -> String {
        format!("{}band:{}", self.prefix, band_key)
    }

    pub fn band_prefix(&self) -> String {
        format!("{}band:", self.prefix)
    }

    pub fn geo(&self, normalized_location: &str) -> String {
        format!("{}geo:{}", self.prefix, normalized_location)
    }

    pub fn geo_prefix(&self) -> String {
        format!("{}geo:", self.prefix)
    }

    pub fn daily_metrics(&self, date: NaiveDate) -> String {
        format!("{}metrics:{}", self.prefix, date.format("%Y-%m-%d"))
    }

    /// Posting id of a fingerprint key, if it is one.
    pub fn id_from_fingerprint<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&self.prefix)?.strip_prefix("fp:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_share_the_prefix() {
        let keys = Keys::new("jobdedup:");
        assert_eq!(keys.fingerprint("a1"), "jobdedup:fp:a1");
        assert_eq!(keys.location("a1"), "jobdedup:loc:a1");
        assert_eq!(keys.band("0:beef"), "jobdedup:band:0:beef");
        assert_eq!(keys.geo("chicago, il"), "jobdedup:geo:chicago, il");
        let date = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        assert_eq!(keys.daily_metrics(date), "jobdedup:metrics:2026-10-15");
    }

    #[test]
    fn test_id_round_trips_through_fingerprint_key() {
        let keys = Keys::new("ns:");
        assert_eq!(keys.id_from_fingerprint(&keys.fingerprint("x:y")), Some("x:y"));
        assert_eq!(keys.id_from_fingerprint("ns:loc:x"), None);
        assert_eq!(keys.id_from_fingerprint("other:fp:x"), None);
    }
}
