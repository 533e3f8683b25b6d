use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// Static description of a behavior, used to pick one for a page.
#[derive(Debug, Clone)]
pub struct BehaviorMetadata {
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// Revision timestamp, RFC 3339 or naive `YYYY-MM-DDTHH:MM:SS` (UTC).
    pub updated: &'static str,
    match_pattern: Regex,
}

impl BehaviorMetadata {
    /// Fails only if `pattern` is not a valid regex.
    pub fn new(
        name: &'static str,
        display_name: &'static str,
        pattern: &str,
        description: &'static str,
        updated: &'static str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            display_name,
            description,
            updated,
            match_pattern: Regex::new(pattern)?,
        })
    }

    pub fn matches(&self, url: &str) -> bool {
        self.match_pattern.is_match(url)
    }

    pub fn pattern(&self) -> &str {
        self.match_pattern.as_str()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        parse_updated(self.updated)
    }
}

fn parse_updated(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}
