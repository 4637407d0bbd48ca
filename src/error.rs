//! Decode failures: an ordered list of path-qualified validation errors.
//!
//! Decoding never panics on bad input. Every failure is reported as data so the
//! caller decides what partial failure means.
use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidType,
    InvalidLiteral,
    MissingProperty,
    MissingDiscriminant,
    UnknownTag,
    ExcessProperty,
    EmptyArray,
    RefinementFailed,
    PrismMismatch,
    /// Raised by user overrides attached through a decoder config slot.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
    pub kind: ErrorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// Accumulated decode failure. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render(.errors))]
pub struct DecodeError {
    errors: Vec<ValidationError>,
}

fn render(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
}

impl DecodeError {
    pub(crate) fn new(errors: Vec<ValidationError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_inner(self) -> Vec<ValidationError> {
        self.errors
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }
}

/// Internal result type of every decoder: a value or a non-empty error list.
pub type Validation<T> = Result<T, Vec<ValidationError>>;

// ————————————————————————————————————————————————————————————————————————————
// KEY PATHS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Current position inside the input, rendered as `address[2].street`.
#[derive(Debug, Clone, Default)]
pub struct KeyPath {
    segments: Vec<Segment>,
}

impl KeyPath {
    pub fn push(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    pub fn pop(&mut self) {
        self.segments.pop();
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(ix) => write!(f, "[{ix}]")?,
            }
        }
        Ok(())
    }
}

/// Append-only merge of two validations: values pair up, errors concatenate.
pub(crate) fn zip<A, B>(a: Validation<A>, b: Validation<B>) -> Validation<(A, B)> {
    match (a, b) {
        (Ok(a), Ok(b)) => Ok((a, b)),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
        (Err(mut e1), Err(e2)) => {
            e1.extend(e2);
            Err(e1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_render_with_dots_and_indices() {
        let mut p = KeyPath::default();
        assert_eq!(p.to_string(), "");
        p.push(Segment::Key("address".into()));
        p.push(Segment::Index(2));
        p.push(Segment::Key("street".into()));
        assert_eq!(p.to_string(), "address[2].street");
        p.pop();
        assert_eq!(p.to_string(), "address[2]");
    }

    #[test]
    fn zip_accumulates_both_sides() {
        let err = |m: &str| ValidationError { path: String::new(), message: m.into(), kind: ErrorKind::InvalidType };
        let a: Validation<u8> = Err(vec![err("a")]);
        let b: Validation<u8> = Err(vec![err("b")]);
        assert_eq!(zip(a, b).unwrap_err().len(), 2);
        assert_eq!(zip(Ok::<_, Vec<ValidationError>>(1u8), Ok::<_, Vec<ValidationError>>(2u8)).unwrap(), (1, 2));
    }

    #[test]
    fn display_marks_root() {
        let e = DecodeError::new(vec![
            ValidationError { path: String::new(), message: "expected object".into(), kind: ErrorKind::InvalidType },
            ValidationError { path: "a".into(), message: "expected number".into(), kind: ErrorKind::InvalidType },
        ]);
        assert_eq!(e.to_string(), "(root): expected object\na: expected number");
    }
}
