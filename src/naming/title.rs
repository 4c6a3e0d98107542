//! Group titles are composed from two independently managed parts: a base
//! name (user- or auto-assigned) and an optional age annotation such as
//! `(3h)`. Every write goes through [`TitleEdit::apply`] so one part never
//! clobbers the other.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static ANNOTATION_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(?P<base>.*?)\s*\((?P<value>\d{1,6})(?P<unit>[mhd])\)$")
        .expect("annotation pattern is valid")
});

const MINUTE_MS: u64 = 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeUnit {
    Minutes,
    Hours,
    Days,
}

impl AgeUnit {
    fn suffix(&self) -> char {
        match self {
            AgeUnit::Minutes => 'm',
            AgeUnit::Hours => 'h',
            AgeUnit::Days => 'd',
        }
    }

    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "m" => Some(AgeUnit::Minutes),
            "h" => Some(AgeUnit::Hours),
            "d" => Some(AgeUnit::Days),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeAnnotation {
    pub value: u32,
    pub unit: AgeUnit,
}

impl AgeAnnotation {
    /// Coarsest unit that keeps the number small: minutes under an hour,
    /// hours under a day, days after that.
    pub fn from_age_ms(age_ms: u64) -> Self {
        let minutes = age_ms / MINUTE_MS;
        let (value, unit) = if minutes < 60 {
            (minutes, AgeUnit::Minutes)
        } else if minutes < 24 * 60 {
            (minutes / 60, AgeUnit::Hours)
        } else {
            (minutes / (24 * 60), AgeUnit::Days)
        };
        Self {
            value: value.min(999_999) as u32,
            unit,
        }
    }
}

impl fmt::Display for AgeAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}{})", self.value, self.unit.suffix())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub base: String,
    pub annotation: Option<AgeAnnotation>,
}

impl ParsedTitle {
    pub fn is_unnamed(&self) -> bool {
        self.base.is_empty()
    }
}

/// Splits a display title into base name and age annotation. A title that is
/// only an annotation has an empty base.
pub fn parse(title: &str) -> ParsedTitle {
    let trimmed = title.trim();
    if let Some(captures) = ANNOTATION_SUFFIX.captures(trimmed) {
        let value = captures["value"].parse::<u32>().ok();
        let unit = AgeUnit::from_suffix(&captures["unit"]);
        if let (Some(value), Some(unit)) = (value, unit) {
            return ParsedTitle {
                base: captures["base"].trim().to_string(),
                annotation: Some(AgeAnnotation { value, unit }),
            };
        }
    }

    ParsedTitle {
        base: trimmed.to_string(),
        annotation: None,
    }
}

pub fn compose(base: &str, annotation: Option<AgeAnnotation>) -> String {
    let base = base.trim();
    match annotation {
        Some(annotation) if base.is_empty() => annotation.to_string(),
        Some(annotation) => format!("{base} {annotation}"),
        None => base.to_string(),
    }
}

/// Base names that survive a compose/parse round trip: trimmed and not
/// themselves ending in something that looks like an annotation.
pub fn is_valid_base(base: &str) -> bool {
    base == base.trim() && parse(base).annotation.is_none()
}

/// One read-modify-compose step. Parts left as `None` keep the value parsed
/// from the current title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleEdit {
    pub base: Option<String>,
    /// `Some(None)` strips the annotation.
    pub annotation: Option<Option<AgeAnnotation>>,
}

impl TitleEdit {
    pub fn is_empty(&self) -> bool {
        self.base.is_none() && self.annotation.is_none()
    }

    pub fn apply(&self, current: &str) -> String {
        let parsed = parse(current);
        let base = self.base.as_deref().unwrap_or(&parsed.base);
        let annotation = self.annotation.unwrap_or(parsed.annotation);
        compose(base, annotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(value: u32, unit: AgeUnit) -> AgeAnnotation {
        AgeAnnotation { value, unit }
    }

    #[test]
    fn annotation_only_title_has_empty_base() {
        let parsed = parse("(23m)");
        assert_eq!(parsed.base, "");
        assert!(parsed.is_unnamed());
        assert_eq!(parsed.annotation, Some(ann(23, AgeUnit::Minutes)));
    }

    #[test]
    fn parses_base_with_annotation() {
        let parsed = parse("Research (5h)");
        assert_eq!(parsed.base, "Research");
        assert_eq!(parsed.annotation, Some(ann(5, AgeUnit::Hours)));
    }

    #[test]
    fn plain_title_has_no_annotation() {
        let parsed = parse("Trip (Paris)");
        assert_eq!(parsed.base, "Trip (Paris)");
        assert_eq!(parsed.annotation, None);
    }

    #[test]
    fn parse_inverts_compose() {
        let bases = ["", "Work", "Trip (Paris)", "a  b", "Q3 (draft) notes", "Q3\nplanning"];
        let annotations = [
            None,
            Some(ann(0, AgeUnit::Minutes)),
            Some(ann(7, AgeUnit::Hours)),
            Some(ann(12, AgeUnit::Days)),
        ];
        for base in bases {
            assert!(is_valid_base(base));
            for annotation in annotations {
                let parsed = parse(&compose(base, annotation));
                assert_eq!(parsed.base, base);
                assert_eq!(parsed.annotation, annotation);
            }
        }
    }

    #[test]
    fn compose_inverts_parse_for_composed_titles() {
        for title in ["Work (3h)", "(23m)", "Work", ""] {
            let parsed = parse(title);
            assert_eq!(compose(&parsed.base, parsed.annotation), title);
        }
    }

    #[test]
    fn compose_is_idempotent_through_edits() {
        let edit = TitleEdit {
            base: None,
            annotation: Some(Some(ann(2, AgeUnit::Days))),
        };
        let once = edit.apply("Docs (1d)");
        let twice = edit.apply(&once);
        assert_eq!(once, "Docs (2d)");
        assert_eq!(once, twice);
    }

    #[test]
    fn edits_keep_the_other_part() {
        let rename = TitleEdit {
            base: Some("Rust".into()),
            annotation: None,
        };
        assert_eq!(rename.apply("(4h)"), "Rust (4h)");

        let strip = TitleEdit {
            base: None,
            annotation: Some(None),
        };
        assert_eq!(strip.apply("Rust (4h)"), "Rust");
    }

    #[test]
    fn annotation_units_scale_with_age() {
        assert_eq!(AgeAnnotation::from_age_ms(59 * 60_000).to_string(), "(59m)");
        assert_eq!(AgeAnnotation::from_age_ms(5 * 3_600_000).to_string(), "(5h)");
        assert_eq!(AgeAnnotation::from_age_ms(50 * 3_600_000).to_string(), "(2d)");
    }
}
