//! Marker line recognition.

use regex_lite::Regex;

use super::SupervisorError;

pub const DEFAULT_MODULE_PATTERN: &str = r"Module '(.+?)'";
pub const DEFAULT_LESSON_PATTERN: &str = r"Starting download of '(.+?)'";

/// A recognized marker line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Module(String),
    Lesson(String),
}

/// Extracts module and lesson names from executable output.
///
/// Each pattern must have one capture group holding the name.
#[derive(Debug, Clone)]
pub struct MarkerParser {
    module: Regex,
    lesson: Regex,
}

impl MarkerParser {
    pub fn new(module_pattern: &str, lesson_pattern: &str) -> Result<Self, SupervisorError> {
        Ok(Self {
            module: compile(module_pattern)?,
            lesson: compile(lesson_pattern)?,
        })
    }

    /// Classify a single stdout line.
    pub fn parse(&self, line: &str) -> Option<Marker> {
        if let Some(name) = capture(&self.lesson, line) {
            return Some(Marker::Lesson(name));
        }
        capture(&self.module, line).map(Marker::Module)
    }
}

impl Default for MarkerParser {
    fn default() -> Self {
        Self::new(DEFAULT_MODULE_PATTERN, DEFAULT_LESSON_PATTERN)
            .expect("default marker patterns are valid")
    }
}

fn compile(pattern: &str) -> Result<Regex, SupervisorError> {
    let regex = Regex::new(pattern).map_err(|e| SupervisorError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    if regex.captures_len() < 2 {
        return Err(SupervisorError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern needs a capture group for the name".to_string(),
        });
    }
    Ok(regex)
}

fn capture(regex: &Regex, line: &str) -> Option<String> {
    regex
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_markers() {
        let parser = MarkerParser::default();

        assert_eq!(
            parser.parse("[info] Module 'Getting Started'"),
            Some(Marker::Module("Getting Started".to_string()))
        );
        assert_eq!(
            parser.parse("Starting download of 'Lesson 1: Hello'"),
            Some(Marker::Lesson("Lesson 1: Hello".to_string()))
        );
        assert_eq!(parser.parse("downloaded 45%"), None);
        assert_eq!(parser.parse("Module without quotes"), None);
    }

    #[test]
    fn test_lesson_marker_wins_over_embedded_module_text() {
        let parser = MarkerParser::default();
        assert_eq!(
            parser.parse("Starting download of 'Module 'A' recap'"),
            Some(Marker::Lesson("Module ".to_string()))
        );
    }

    #[test]
    fn test_custom_patterns() {
        let parser = MarkerParser::new(r"^== (.+) ==$", r"^-> (.+)$").unwrap();
        assert_eq!(parser.parse("== Intro =="), Some(Marker::Module("Intro".to_string())));
        assert_eq!(parser.parse("-> Setup"), Some(Marker::Lesson("Setup".to_string())));
    }

    #[test]
    fn test_pattern_without_group_is_rejected() {
        let err = MarkerParser::new("Module", DEFAULT_LESSON_PATTERN).unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidPattern { .. }));
        assert!(MarkerParser::new("(", DEFAULT_LESSON_PATTERN).is_err());
    }
}
