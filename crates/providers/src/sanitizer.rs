//! Response post-processing.
//!
//! Drops every line that contains a blocked marketing marker, then trims the
//! rejoined text. Pure and idempotent: no kept line can contain a marker, and
//! trimming only shortens kept lines.

/// Strips promotional lines from a winning answer.
#[derive(Debug, Clone, Default)]
pub struct ResponseSanitizer {
    markers: Vec<String>,
}

impl ResponseSanitizer {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn sanitize(&self, raw: &str) -> String {
        raw.split('\n')
            .filter(|line| !self.is_blocked(line))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    fn is_blocked(&self, line: &str) -> bool {
        self.markers.iter().any(|m| line.contains(m.as_str()))
    }
}
