use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

/// Zone the digest heading and subject are stamped in.
pub const DIGEST_TIME_ZONE: Tz = chrono_tz::America::New_York;

/// Summaries for one source, in the order they were produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DigestSection {
    pub source: String,
    pub summaries: Vec<String>,
}

/// Summaries grouped by source. Sources keep the order in which they were
/// first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigestSections {
    sections: Vec<DigestSection>,
}

impl DigestSections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: impl Into<String>, summary: impl Into<String>) {
        let source = source.into();
        match self.sections.iter_mut().find(|s| s.source == source) {
            Some(section) => section.summaries.push(summary.into()),
            None => self.sections.push(DigestSection {
                source,
                summaries: vec![summary.into()],
            }),
        }
    }

    /// Number of distinct sources.
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn total_summaries(&self) -> usize {
        self.sections.iter().map(|s| s.summaries.len()).sum()
    }

    pub fn get(&self, source: &str) -> Option<&DigestSection> {
        self.sections.iter().find(|s| s.source == source)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DigestSection> {
        self.sections.iter()
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for DigestSections {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut sections = Self::new();
        for (source, summary) in iter {
            sections.push(source, summary);
        }
        sections
    }
}

/// Timestamp shown in the digest heading and the email subject, in US
/// Eastern time with its abbreviation (`October 14, 2025 9:05 AM EDT`).
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&DIGEST_TIME_ZONE)
        .format("%B %d, %Y %-I:%M %p %Z")
        .to_string()
}

pub fn digest_subject(now: DateTime<Utc>) -> String {
    format!("🧠 Daily Vibe Coding Digest – {}", format_timestamp(now))
}

/// Render the digest as `(html, markdown)`.
pub fn format_digest(sections: &DigestSections, now: DateTime<Utc>) -> (String, String) {
    let stamp = format_timestamp(now);
    let mut html = format!("<h2>🧠 Vibe Coding Digest – {}</h2>", stamp);
    let mut md = format!("## 🧠 Vibe Coding Digest – {}\n", stamp);

    for section in sections.iter() {
        html.push_str(&format!("<h3>{}</h3><ul>", section.source));
        md.push_str(&format!("\n### {}\n", section.source));
        for summary in &section.summaries {
            html.push_str(&format!("<li>{}</li>", summary));
            md.push_str(&format!("- {}\n", summary));
        }
        html.push_str("</ul>");
    }

    debug!(
        "Formatted digest: {} sources, {} summaries",
        sections.len(),
        sections.total_summaries()
    );
    (html, md)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 13, 5, 0).unwrap()
    }

    #[test]
    fn sections_keep_first_seen_order() {
        let sections: DigestSections = vec![
            ("B", "b1"),
            ("A", "a1"),
            ("B", "b2"),
        ]
        .into_iter()
        .collect();

        let order: Vec<&str> = sections.iter().map(|s| s.source.as_str()).collect();
        assert_eq!(order, vec!["B", "A"]);
        assert_eq!(sections.get("B").unwrap().summaries, vec!["b1", "b2"]);
        assert_eq!(sections.total_summaries(), 3);
    }

    #[test]
    fn digest_contains_headings_and_every_summary() {
        let sections: DigestSections = vec![("Source A", "Summary A1"), ("Source A", "Summary A2"), ("Source B", "Summary B1")]
            .into_iter()
            .collect();

        let (html, md) = format_digest(&sections, at());

        assert!(html.starts_with("<h2>🧠 Vibe Coding Digest – October 14, 2025 9:05 AM EDT</h2>"));
        assert!(html.contains("<h3>Source A</h3><ul><li>Summary A1</li><li>Summary A2</li></ul>"));
        assert!(html.contains("<h3>Source B</h3><ul><li>Summary B1</li></ul>"));

        assert!(md.starts_with("## 🧠 Vibe Coding Digest – October 14, 2025 9:05 AM EDT\n"));
        assert!(md.contains("\n### Source A\n- Summary A1\n- Summary A2\n"));
        assert!(md.contains("\n### Source B\n- Summary B1\n"));
    }

    #[test]
    fn empty_digest_is_just_the_heading() {
        let (html, md) = format_digest(&DigestSections::new(), at());
        assert_eq!(html, "<h2>🧠 Vibe Coding Digest – October 14, 2025 9:05 AM EDT</h2>");
        assert_eq!(md, "## 🧠 Vibe Coding Digest – October 14, 2025 9:05 AM EDT\n");
    }

    #[test]
    fn late_evening_eastern_keeps_the_local_date() {
        let late = Utc.with_ymd_and_hms(2025, 10, 16, 3, 30, 0).unwrap();
        assert_eq!(
            digest_subject(late),
            "🧠 Daily Vibe Coding Digest – October 15, 2025 11:30 PM EDT"
        );
    }

    #[test]
    fn winter_runs_are_stamped_est() {
        let winter = Utc.with_ymd_and_hms(2025, 1, 6, 17, 0, 0).unwrap();
        assert_eq!(format_timestamp(winter), "January 06, 2025 12:00 PM EST");
    }

    #[test]
    fn subject_line() {
        assert_eq!(
            digest_subject(at()),
            "🧠 Daily Vibe Coding Digest – October 14, 2025 9:05 AM EDT"
        );
    }
}
