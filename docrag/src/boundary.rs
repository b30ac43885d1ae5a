//! Heading detection for unlabeled prose.
//!
//! A [`BoundaryDetector`] scans text and reports `(position, heading)`
//! candidates. [`DetectorChain`] runs an ordered list of detectors, merges
//! their candidates by position and collapses candidates that sit too close
//! to the previously accepted one. New heading styles are added by pushing
//! another detector onto the chain.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::error::{RagError, Result};

/// A heading-like position in a text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    /// Byte offset of the start of the heading line.
    pub position: usize,
    /// The heading text, trimmed.
    pub heading: String,
    /// Name of the detector that produced the candidate.
    pub detector: &'static str,
}

/// Something that can find heading candidates in a text.
pub trait BoundaryDetector: Send + Sync {
    /// Short name recorded on every [`Boundary`] this detector produces.
    fn name(&self) -> &'static str;

    /// Return candidates in any order. Positions must be char boundaries of `text`.
    fn detect(&self, text: &str) -> Vec<Boundary>;
}

static NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\d+[ \t]+[A-Z][a-z]+(?:[ \t]+[A-Za-z]+)*)")
        .expect("numbered heading pattern is valid")
});

static UPPERCASE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([A-Z][A-Z \t]*[A-Z])[ \t\r]*$").expect("uppercase heading pattern is valid")
});

/// Default section vocabulary. Prefix-style entries take the rest of the
/// line; fixed names must stand alone on their line (optionally with a colon).
const DEFAULT_SECTION_PATTERNS: &[&str] = &[
    r"^(About[ \t]+[^\n]+)",
    r"^(What is[ \t]+[^\n]+\?)",
    r"^(How is[ \t]+[^\n]+\?)",
];

/// Stand-alone section names recognised by default.
pub const DEFAULT_SECTION_NAMES: &[&str] =
    &["Signs and symptoms", "Risk factors", "Diagnosis", "Treatment", "Key points"];

fn section_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).multi_line(true).build()
}

fn section_names_regex(names: &[&str]) -> std::result::Result<Regex, regex::Error> {
    let alternatives = names.iter().map(|n| regex::escape(n)).collect::<Vec<_>>().join("|");
    section_regex(&format!(r"^({alternatives})[ \t]*:?[ \t\r]*$"))
}

static DEFAULT_SECTION_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    let mut regexes: Vec<Regex> = DEFAULT_SECTION_PATTERNS
        .iter()
        .map(|p| section_regex(p).expect("default section pattern is valid"))
        .collect();
    regexes.push(section_names_regex(DEFAULT_SECTION_NAMES).expect("section names are escaped"));
    regexes
});

/// Lines that start with a number followed by a capitalised word,
/// e.g. `7 Adrenal glands`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumberedHeadingDetector;

impl BoundaryDetector for NumberedHeadingDetector {
    fn name(&self) -> &'static str {
        "numbered"
    }

    fn detect(&self, text: &str) -> Vec<Boundary> {
        captures_to_boundaries(&NUMBERED_HEADING, text, self.name())
    }
}

/// Lines made only of capital letters and spaces, longer than
/// `min_len` characters once trimmed, e.g. `SIGNS AND SYMPTOMS`.
#[derive(Debug, Clone, Copy)]
pub struct UppercaseHeadingDetector {
    min_len: usize,
}

impl UppercaseHeadingDetector {
    /// Headings must be strictly longer than `min_len` characters.
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }
}

impl Default for UppercaseHeadingDetector {
    fn default() -> Self {
        Self::new(5)
    }
}

impl BoundaryDetector for UppercaseHeadingDetector {
    fn name(&self) -> &'static str {
        "uppercase"
    }

    fn detect(&self, text: &str) -> Vec<Boundary> {
        captures_to_boundaries(&UPPERCASE_HEADING, text, self.name())
            .into_iter()
            .filter(|b| b.heading.chars().count() > self.min_len)
            .collect()
    }
}

/// Case-insensitive domain section names such as `Risk factors` or
/// `What is leukaemia?`.
#[derive(Debug, Clone)]
pub struct SectionVocabularyDetector {
    patterns: Vec<Regex>,
}

impl SectionVocabularyDetector {
    /// Use the default prefix patterns plus the given stand-alone section names.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the names produce an invalid pattern.
    pub fn with_section_names(names: &[&str]) -> Result<Self> {
        let mut patterns: Vec<Regex> = DEFAULT_SECTION_REGEXES[..DEFAULT_SECTION_PATTERNS.len()].to_vec();
        if !names.is_empty() {
            let names_regex = section_names_regex(names)
                .map_err(|e| RagError::ConfigError(format!("invalid section names: {e}")))?;
            patterns.push(names_regex);
        }
        Ok(Self { patterns })
    }

    /// Use arbitrary patterns. Each must capture the heading in group 1.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a pattern does not compile.
    pub fn from_patterns(patterns: &[&str]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                section_regex(p)
                    .map_err(|e| RagError::ConfigError(format!("invalid section pattern '{p}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl Default for SectionVocabularyDetector {
    fn default() -> Self {
        Self { patterns: DEFAULT_SECTION_REGEXES.clone() }
    }
}

impl BoundaryDetector for SectionVocabularyDetector {
    fn name(&self) -> &'static str {
        "section"
    }

    fn detect(&self, text: &str) -> Vec<Boundary> {
        self.patterns.iter().flat_map(|re| captures_to_boundaries(re, text, self.name())).collect()
    }
}

fn captures_to_boundaries(re: &Regex, text: &str, detector: &'static str) -> Vec<Boundary> {
    re.captures_iter(text)
        .filter_map(|caps| {
            let heading = caps.get(1).or_else(|| caps.get(0))?;
            let trimmed = heading.as_str().trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(Boundary { position: heading.start(), heading: trimmed.to_string(), detector })
        })
        .collect()
}

/// An ordered list of detectors plus the collapsing rule.
pub struct DetectorChain {
    detectors: Vec<Box<dyn BoundaryDetector>>,
}

impl DetectorChain {
    /// A chain with no detectors.
    pub fn empty() -> Self {
        Self { detectors: Vec::new() }
    }

    /// Append a detector. Earlier detectors win ties at the same position.
    pub fn with(mut self, detector: impl BoundaryDetector + 'static) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector, sort candidates by position and drop any candidate
    /// within `collapse_distance` characters of the previously accepted one.
    pub fn scan(&self, text: &str, collapse_distance: usize) -> Vec<Boundary> {
        let mut candidates: Vec<Boundary> =
            self.detectors.iter().flat_map(|d| d.detect(text)).collect();
        // Stable sort keeps detector order for equal positions.
        candidates.sort_by_key(|b| b.position);

        let mut accepted: Vec<Boundary> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let too_close = accepted.last().is_some_and(|prev| {
                text[prev.position..candidate.position].chars().count() <= collapse_distance
            });
            if !too_close {
                accepted.push(candidate);
            }
        }
        accepted
    }
}

impl Default for DetectorChain {
    /// Numbered headings, then all-caps headings, then the section vocabulary.
    fn default() -> Self {
        Self::empty()
            .with(NumberedHeadingDetector)
            .with(UppercaseHeadingDetector::default())
            .with(SectionVocabularyDetector::default())
    }
}

impl std::fmt::Debug for DetectorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.detectors.iter().map(|d| d.name()).collect();
        f.debug_struct("DetectorChain").field("detectors", &names).finish()
    }
}
