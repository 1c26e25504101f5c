use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
    str::FromStr,
};

use thiserror::Error;

use crate::validation::meta::{is_label_value, is_qualified_name};

pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("Couldn't parse selector '{}': {}", .selector, .reason)]
    Parse { selector: String, reason: String },
    #[error("Invalid selector key '{}'!", .0)]
    InvalidKey(String),
    #[error("Invalid selector value '{}'!", .0)]
    InvalidValue(String),
    #[error("Field label not supported: {}", .0)]
    UnsupportedField(String),
}

impl SelectorError {
    pub(crate) fn parse(selector: &str, reason: impl Into<String>) -> Self {
        SelectorError::Parse {
            selector: selector.to_owned(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    operator: Operator,
    values: BTreeSet<String>,
}

impl Requirement {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, SelectorError> {
        let key = key.into();
        if !is_qualified_name(&key) {
            return Err(SelectorError::InvalidKey(key));
        }

        let values = values
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>();

        if let Some(value) = values.iter().find(|value| !is_label_value(value)) {
            return Err(SelectorError::InvalidValue(value.to_owned()));
        }

        Ok(Self {
            key,
            operator,
            values,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.operator {
            Operator::Equals | Operator::In => {
                value.map_or(false, |value| self.values.contains(value))
            }
            Operator::NotEquals | Operator::NotIn => {
                value.map_or(true, |value| !self.values.contains(value))
            }
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
        }
    }
}

impl Display for Requirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let values = self
            .values
            .iter()
            .map(String::as_str)
            .collect::<Vec<&str>>()
            .join(",");

        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, values),
            Operator::NotEquals => write!(f, "{}!={}", self.key, values),
            Operator::In => write!(f, "{} in ({})", self.key, values),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, values),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// Conjunction of label requirements. An empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn with(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        self.requirements
            .iter()
            .all(|requirement| requirement.matches(labels))
    }

    pub fn from_labels(labels: &Labels) -> Result<Self, SelectorError> {
        labels
            .iter()
            .map(|(key, value)| Requirement::new(key.as_str(), Operator::Equals, [value.as_str()]))
            .collect::<Result<Vec<_>, _>>()
            .map(|requirements| Self { requirements })
    }
}

impl Display for LabelSelector {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, requirement) in self.requirements.iter().enumerate() {
            if position > 0 {
                f.write_str(",")?;
            }
            write!(f, "{requirement}")?;
        }

        Ok(())
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(selector: &str) -> Result<Self, Self::Err> {
        split_terms(selector)?
            .into_iter()
            .map(|term| parse_requirement(selector, term))
            .collect::<Result<Vec<_>, _>>()
            .map(|requirements| Self { requirements })
    }
}

/// Splits on commas that aren't inside a `(...)` value set.
fn split_terms(selector: &str) -> Result<Vec<&str>, SelectorError> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (position, character) in selector.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| SelectorError::parse(selector, "unbalanced ')'"))?
            }
            ',' if depth == 0 => {
                terms.push(&selector[start..position]);
                start = position + 1;
            }
            _ => {}
        }
    }

    if depth != 0 {
        return Err(SelectorError::parse(selector, "unbalanced '('"));
    }

    terms.push(&selector[start..]);

    let terms = terms
        .into_iter()
        .map(str::trim)
        .collect::<Vec<&str>>();

    match terms.as_slice() {
        [only] if only.is_empty() => Ok(Vec::new()),
        _ if terms.iter().any(|term| term.is_empty()) => {
            Err(SelectorError::parse(selector, "empty requirement"))
        }
        _ => Ok(terms),
    }
}

fn parse_requirement(selector: &str, term: &str) -> Result<Requirement, SelectorError> {
    if let Some(key) = term.strip_prefix('!') {
        return Requirement::new(key.trim(), Operator::DoesNotExist, Vec::<String>::new());
    }

    if let Some((key, value)) = term.split_once("!=") {
        return Requirement::new(key.trim(), Operator::NotEquals, [value.trim()]);
    }

    if let Some((key, value)) = term.split_once("==") {
        return Requirement::new(key.trim(), Operator::Equals, [value.trim()]);
    }

    if let Some((key, value)) = term.split_once('=') {
        return Requirement::new(key.trim(), Operator::Equals, [value.trim()]);
    }

    if let Some((key, rest)) = term.split_once(char::is_whitespace) {
        let rest = rest.trim_start();
        let (operator, set) = if let Some(set) = rest.strip_prefix("notin") {
            (Operator::NotIn, set)
        } else if let Some(set) = rest.strip_prefix("in") {
            (Operator::In, set)
        } else {
            return Err(SelectorError::parse(
                selector,
                format!("unknown operator in '{term}'"),
            ));
        };

        let values = set
            .trim()
            .strip_prefix('(')
            .and_then(|set| set.strip_suffix(')'))
            .ok_or_else(|| {
                SelectorError::parse(selector, format!("expected a (value, ...) set in '{term}'"))
            })?
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .collect::<Vec<&str>>();

        if values.is_empty() {
            return Err(SelectorError::parse(
                selector,
                format!("'{term}' needs at least one value"),
            ));
        }

        return Requirement::new(key, operator, values);
    }

    Requirement::new(term, Operator::Exists, Vec::<String>::new())
}
