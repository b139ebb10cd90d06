//! PII scrubbing for the shared partition.
//!
//! Rule-based redaction over a fixed, configured rule set, which
//! makes scrubbing deterministic: the same text and rules always
//! produce the same redacted output. Only ever applied to the
//! derivative copy; the private record keeps its raw text.

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::PiiRule;

pub struct PiiScrubber {
    rules: Vec<(String, Regex)>,
}

impl PiiScrubber {
    /// Compile the rule set. Invalid patterns fail construction
    /// loudly rather than silently weakening redaction.
    pub fn new(rules: &[PiiRule]) -> Result<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let re = Regex::new(&rule.pattern)
                .with_context(|| format!("invalid PII pattern for rule '{}'", rule.name))?;
            compiled.push((rule.name.clone(), re));
        }
        Ok(Self { rules: compiled })
    }

    /// Redact every match of every rule, in rule order.
    pub fn scrub(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (name, re) in &self.rules {
            let marker = format!("[REDACTED:{name}]");
            out = re.replace_all(&out, marker.as_str()).into_owned();
        }
        out
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scrubber() -> PiiScrubber {
        let rules = vec![
            PiiRule {
                name: "email".into(),
                pattern: r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}".into(),
            },
            PiiRule {
                name: "ssn".into(),
                pattern: r"\b\d{3}-\d{2}-\d{4}\b".into(),
            },
        ];
        PiiScrubber::new(&rules).unwrap()
    }

    #[test]
    fn redacts_all_occurrences() {
        let s = scrubber();
        let out = s.scrub("mail a@b.com and c@d.org, ssn 123-45-6789");
        assert!(!out.contains("a@b.com"));
        assert!(!out.contains("c@d.org"));
        assert!(!out.contains("123-45-6789"));
        assert_eq!(out.matches("[REDACTED:email]").count(), 2);
        assert_eq!(out.matches("[REDACTED:ssn]").count(), 1);
    }

    #[test]
    fn deterministic_for_fixed_rules() {
        let s = scrubber();
        let text = "contact admin@corp.example or 987-65-4321";
        assert_eq!(s.scrub(text), s.scrub(text));
    }

    #[test]
    fn clean_text_passes_through() {
        let s = scrubber();
        assert_eq!(s.scrub("nothing sensitive here"), "nothing sensitive here");
    }

    #[test]
    fn invalid_pattern_fails_construction() {
        let bad = vec![PiiRule {
            name: "broken".into(),
            pattern: "([unclosed".into(),
        }];
        assert!(PiiScrubber::new(&bad).is_err());
    }
}
