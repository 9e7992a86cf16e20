//! Reference expressions: pointers from a binding into an earlier step's result
//!
//! Two spellings are accepted anywhere in a binding, including nested inside
//! literal arrays and objects:
//!
//! - textual: `output of step 1, index 0, key 'href'`
//! - structured: `{"$ref": {"step": 1, "path": [0, "href"]}}`
//!
//! A textual reference must be the whole string; a sentence that merely
//! mentions a step stays a literal.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

use crate::capability::value_type_name;
use crate::error::ResolutionError;
use crate::history::StepRecord;

const REF_KEY: &str = "$ref";

/// One hop into a structured value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "[{}]", i),
            PathSegment::Key(k) => write!(f, "[{:?}]", k),
        }
    }
}

/// A parsed reference to the result of step `step`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub step: usize,
    pub path: Vec<PathSegment>,
}

fn whole_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)^\s*(?:the\s+)?output\s+of\s+step\s+(\d+)((?:\s*,\s*(?:index\s+\d+|key\s+(?:'[^']*'|"[^"]*")))*)\s*\.?\s*$"#,
        )
        .expect("reference pattern is valid")
    })
}

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)index\s+(\d+)|key\s+(?:'([^']*)'|"([^"]*)")"#)
            .expect("segment pattern is valid")
    })
}

fn render_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<result>".to_string();
    }
    path.iter().map(|s| s.to_string()).collect()
}

impl Reference {
    pub fn new(step: usize, path: Vec<PathSegment>) -> Self {
        Self { step, path }
    }

    /// Parse the textual form.
    ///
    /// `Ok(None)` means the string is a literal. A string that matches the
    /// reference grammar but carries a number too large to address anything
    /// is `InvalidReference`, never a literal.
    pub fn parse_text(text: &str) -> Result<Option<Self>, ResolutionError> {
        let Some(caps) = whole_regex().captures(text) else {
            return Ok(None);
        };
        let number = |digits: &str, what: &str| {
            digits
                .parse::<usize>()
                .map_err(|_| ResolutionError::InvalidReference {
                    detail: format!("{} {} is out of range", what, digits),
                })
        };

        let step = number(&caps[1], "step")?;
        let mut path = Vec::new();
        if let Some(tail) = caps.get(2) {
            for seg in segment_regex().captures_iter(tail.as_str()) {
                if let Some(idx) = seg.get(1) {
                    path.push(PathSegment::Index(number(idx.as_str(), "index")?));
                } else if let Some(key) = seg.get(2).or_else(|| seg.get(3)) {
                    path.push(PathSegment::Key(key.as_str().to_string()));
                }
            }
        }
        Ok(Some(Self { step, path }))
    }

    /// Parse the structured form.
    ///
    /// `Ok(None)` when the object carries no `$ref`; an object that tries to
    /// be a reference but is shaped wrong is `InvalidReference`.
    pub fn parse_object(obj: &Map<String, Value>) -> Result<Option<Self>, ResolutionError> {
        let Some(spec) = obj.get(REF_KEY) else {
            return Ok(None);
        };
        let invalid = |detail: String| ResolutionError::InvalidReference { detail };

        if obj.len() != 1 {
            return Err(invalid(format!(
                "\"{}\" must be the only key in its object",
                REF_KEY
            )));
        }
        let spec = spec
            .as_object()
            .ok_or_else(|| invalid(format!("\"{}\" must hold an object", REF_KEY)))?;

        let step = match spec.get("step").and_then(Value::as_u64) {
            Some(n) if n >= 1 => n as usize,
            _ => return Err(invalid("\"step\" must be a positive integer".to_string())),
        };

        let path = match spec.get("path") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::String(k) => Ok(PathSegment::Key(k.clone())),
                    Value::Number(n) => n
                        .as_u64()
                        .map(|i| PathSegment::Index(i as usize))
                        .ok_or_else(|| invalid(format!("bad path index {}", n))),
                    other => Err(invalid(format!(
                        "path segments must be strings or indexes, got {}",
                        value_type_name(other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(invalid(format!(
                    "\"path\" must be an array, got {}",
                    value_type_name(other)
                )))
            }
        };

        if let Some(extra) = spec.keys().find(|k| *k != "step" && *k != "path") {
            return Err(invalid(format!("unexpected key \"{}\"", extra)));
        }

        Ok(Some(Self { step, path }))
    }

    /// Look the reference up in `history`
    pub fn resolve(&self, history: &[StepRecord]) -> Result<Value, ResolutionError> {
        let record = history
            .iter()
            .find(|r| r.index == self.step)
            .ok_or(ResolutionError::UnknownStep {
                step: self.step,
                available: history.len(),
            })?;

        let mut current = record
            .outcome
            .result()
            .ok_or(ResolutionError::StepNotSucceeded { step: self.step })?;

        for (depth, segment) in self.path.iter().enumerate() {
            let so_far = || render_path(&self.path[..=depth]);
            current = match (segment, current) {
                (PathSegment::Index(i), Value::Array(items)) => {
                    items.get(*i).ok_or_else(|| ResolutionError::PathNotFound {
                        step: self.step,
                        path: so_far(),
                    })?
                }
                (PathSegment::Key(k), Value::Object(map)) => {
                    map.get(k).ok_or_else(|| ResolutionError::PathNotFound {
                        step: self.step,
                        path: so_far(),
                    })?
                }
                (segment, other) => {
                    let expected = match segment {
                        PathSegment::Index(_) => "array",
                        PathSegment::Key(_) => "object",
                    };
                    return Err(ResolutionError::TypeMismatch {
                        step: self.step,
                        path: so_far(),
                        expected: expected.to_string(),
                        found: value_type_name(other).to_string(),
                    });
                }
            };
        }

        Ok(current.clone())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output of step {}", self.step)?;
        for segment in &self.path {
            match segment {
                PathSegment::Index(i) => write!(f, ", index {}", i)?,
                PathSegment::Key(k) => write!(f, ", key '{}'", k)?,
            }
        }
        Ok(())
    }
}

/// Materialize one binding value, descending into literal containers
pub fn resolve_value(value: &Value, history: &[StepRecord]) -> Result<Value, ResolutionError> {
    match value {
        Value::String(s) => match Reference::parse_text(s)? {
            Some(reference) => reference.resolve(history),
            None => Ok(value.clone()),
        },
        Value::Object(obj) => match Reference::parse_object(obj)? {
            Some(reference) => reference.resolve(history),
            None => obj
                .iter()
                .map(|(k, v)| Ok((k.clone(), resolve_value(v, history)?)))
                .collect::<Result<Map<_, _>, _>>()
                .map(Value::Object),
        },
        Value::Array(items) => items
            .iter()
            .map(|v| resolve_value(v, history))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Ok(value.clone()),
    }
}

/// Resolve every binding; the first failure wins, in binding order
pub fn resolve(
    bindings: &Map<String, Value>,
    history: &[StepRecord],
) -> Result<Map<String, Value>, ResolutionError> {
    bindings
        .iter()
        .map(|(name, value)| Ok((name.clone(), resolve_value(value, history)?)))
        .collect()
}
