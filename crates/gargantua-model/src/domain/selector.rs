use std::{fmt, str::FromStr};

use crate::{
    domain::Labels,
    error::{ModelError, ModelResult},
};

/// Comparison applied by a single selector requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `key=value` or `key==value`.
    Equals,
    /// `key!=value`; also matches objects without the key.
    NotEquals,
    /// `key in (a,b)`.
    In,
    /// `key notin (a,b)`; also matches objects without the key.
    NotIn,
    /// `key`.
    Exists,
    /// `!key`.
    DoesNotExist,
}

/// One clause of a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub key: String,
    pub op: Operator,
    pub values: Vec<String>,
}

impl Requirement {
    /// Evaluate the requirement against a label set.
    pub fn matches(&self, labels: &Labels) -> bool {
        let actual = labels.get(&self.key);
        match self.op {
            Operator::Equals => actual == self.values.first().map(String::as_str),
            Operator::NotEquals => actual != self.values.first().map(String::as_str),
            Operator::In => actual.is_some_and(|v| self.values.iter().any(|w| w == v)),
            Operator::NotIn => !actual.is_some_and(|v| self.values.iter().any(|w| w == v)),
            Operator::Exists => actual.is_some(),
            Operator::DoesNotExist => actual.is_none(),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Operator::Equals => write!(f, "{}={}", self.key, self.values.join("")),
            Operator::NotEquals => write!(f, "{}!={}", self.key, self.values.join("")),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Label selector: a conjunction of requirements.
///
/// The empty selector matches everything.
///
/// ```
/// use gargantua_model::{Labels, Selector};
///
/// let sel: Selector = "scheduledevent=se-1,bound!=true,environment in (env-a,env-b)"
///     .parse()
///     .unwrap();
/// let labels = Labels::new()
///     .with("scheduledevent", "se-1")
///     .with("environment", "env-b");
/// assert!(sel.matches(&labels));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Selector matching every object.
    pub fn everything() -> Self {
        Self::default()
    }

    /// Returns `true` if the selector has no requirements.
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Requirements in declaration order.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Add `key=value`.
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(Requirement {
            key: key.into(),
            op: Operator::Equals,
            values: vec![value.into()],
        });
        self
    }

    /// Add `key!=value`.
    pub fn ne(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.requirements.push(Requirement {
            key: key.into(),
            op: Operator::NotEquals,
            values: vec![value.into()],
        });
        self
    }

    /// Add `key in (values)`.
    pub fn in_set<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements.push(Requirement {
            key: key.into(),
            op: Operator::In,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add `key notin (values)`.
    pub fn not_in<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements.push(Requirement {
            key: key.into(),
            op: Operator::NotIn,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Add `key` (must exist).
    pub fn exists(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement {
            key: key.into(),
            op: Operator::Exists,
            values: Vec::new(),
        });
        self
    }

    /// Add `!key` (must not exist).
    pub fn absent(mut self, key: impl Into<String>) -> Self {
        self.requirements.push(Requirement {
            key: key.into(),
            op: Operator::DoesNotExist,
            values: Vec::new(),
        });
        self
    }

    /// Evaluate all requirements against `labels`.
    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    /// First `key=value` requirement, used by caches to narrow candidates through a label index.
    pub fn equality_hint(&self) -> Option<(&str, &str)> {
        self.requirements.iter().find_map(|r| match r.op {
            Operator::Equals => r.values.first().map(|v| (r.key.as_str(), v.as_str())),
            _ => None,
        })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl FromStr for Selector {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        let mut requirements = Vec::new();
        for clause in split_clauses(s)? {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            requirements.push(parse_requirement(clause)?);
        }
        Ok(Self { requirements })
    }
}

/// Split on commas that are not inside a `( ... )` value list.
fn split_clauses(s: &str) -> ModelResult<Vec<&str>> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ModelError::InvalidSelector(format!("unbalanced ')' in {s:?}")))?;
            }
            ',' if depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ModelError::InvalidSelector(format!("unbalanced '(' in {s:?}")));
    }
    out.push(&s[start..]);
    Ok(out)
}

fn parse_requirement(clause: &str) -> ModelResult<Requirement> {
    if let Some(key) = clause.strip_prefix('!') {
        return Ok(Requirement {
            key: valid_key(key.trim(), clause)?,
            op: Operator::DoesNotExist,
            values: Vec::new(),
        });
    }
    if let Some((key, value)) = clause.split_once("!=") {
        return Ok(Requirement {
            key: valid_key(key.trim(), clause)?,
            op: Operator::NotEquals,
            values: vec![value.trim().to_string()],
        });
    }
    if let Some((key, value)) = clause.split_once("==").or_else(|| clause.split_once('=')) {
        return Ok(Requirement {
            key: valid_key(key.trim(), clause)?,
            op: Operator::Equals,
            values: vec![value.trim().to_string()],
        });
    }
    if let Some(open) = clause.find('(') {
        let head = clause[..open].trim();
        let body = clause[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| ModelError::InvalidSelector(format!("missing ')' in {clause:?}")))?;
        let values: Vec<String> = body
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();

        let (key, op) = if let Some(key) = head.strip_suffix(" notin") {
            (key, Operator::NotIn)
        } else if let Some(key) = head.strip_suffix(" in") {
            (key, Operator::In)
        } else {
            return Err(ModelError::InvalidSelector(format!(
                "expected 'in' or 'notin' in {clause:?}"
            )));
        };
        return Ok(Requirement {
            key: valid_key(key.trim(), clause)?,
            op,
            values,
        });
    }
    Ok(Requirement {
        key: valid_key(clause, clause)?,
        op: Operator::Exists,
        values: Vec::new(),
    })
}

fn valid_key(key: &str, clause: &str) -> ModelResult<String> {
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Err(ModelError::InvalidSelector(format!(
            "invalid label key in {clause:?}"
        )));
    }
    Ok(key.to_string())
}
