use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

use super::labels::SelectorError;

pub type Fields = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOperator {
    Equals,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequirement {
    pub field: String,
    pub operator: FieldOperator,
    pub value: String,
}

impl FieldRequirement {
    /// Fields missing from the object compare as the empty string.
    pub fn matches(&self, fields: &Fields) -> bool {
        let value = fields.get(&self.field).map(String::as_str).unwrap_or_default();
        match self.operator {
            FieldOperator::Equals => value == self.value,
            FieldOperator::NotEquals => value != self.value,
        }
    }
}

impl Display for FieldRequirement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.operator {
            FieldOperator::Equals => write!(f, "{}={}", self.field, self.value),
            FieldOperator::NotEquals => write!(f, "{}!={}", self.field, self.value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSelector {
    requirements: Vec<FieldRequirement>,
}

impl FieldSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn one_term_equal(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            requirements: vec![FieldRequirement {
                field: field.into(),
                operator: FieldOperator::Equals,
                value: value.into(),
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[FieldRequirement] {
        &self.requirements
    }

    /// Rejects requirements on fields outside `supported`, which would
    /// otherwise compare against an empty value.
    pub fn check_fields(&self, supported: &[&str]) -> Result<(), SelectorError> {
        match self
            .requirements
            .iter()
            .find(|requirement| !supported.contains(&requirement.field.as_str()))
        {
            Some(requirement) => Err(SelectorError::UnsupportedField(requirement.field.to_owned())),
            None => Ok(()),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        self.requirements
            .iter()
            .all(|requirement| requirement.matches(fields))
    }

    /// Value the selector pins `field` to, if any. Lets a store narrow a
    /// lookup to a single key, e.g. `metadata.name=net1`.
    pub fn requires_exact_match(&self, field: &str) -> Option<&str> {
        self.requirements
            .iter()
            .find(|requirement| {
                requirement.field == field && requirement.operator == FieldOperator::Equals
            })
            .map(|requirement| requirement.value.as_str())
    }
}

impl Display for FieldSelector {
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

impl FromStr for FieldSelector {
    type Err = SelectorError;

    fn from_str(selector: &str) -> Result<Self, Self::Err> {
        if selector.trim().is_empty() {
            return Ok(Self::everything());
        }

        selector
            .split(',')
            .map(str::trim)
            .map(|term| {
                let (field, operator, value) = if let Some((field, value)) = term.split_once("!=") {
                    (field, FieldOperator::NotEquals, value)
                } else if let Some((field, value)) = term.split_once("==") {
                    (field, FieldOperator::Equals, value)
                } else if let Some((field, value)) = term.split_once('=') {
                    (field, FieldOperator::Equals, value)
                } else {
                    return Err(SelectorError::parse(
                        selector,
                        format!("'{term}' is not a field=value term"),
                    ));
                };

                let field = field.trim();
                if field.is_empty() {
                    return Err(SelectorError::parse(selector, "field name is empty"));
                }

                Ok(FieldRequirement {
                    field: field.to_owned(),
                    operator,
                    value: value.trim().to_owned(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|requirements| Self { requirements })
    }
}
