use std::{
    fmt::{Display, Formatter},
    ops::{Deref, DerefMut},
};

pub mod meta;
pub mod network;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Field(String),
    Key(String),
    Index(usize),
}

/// Dotted path to a field inside an object, e.g. `spec.args[mtu]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn new(name: &str) -> Self {
        Self {
            segments: vec![Segment::Field(name.to_owned())],
        }
    }

    pub fn child(&self, name: &str) -> Self {
        self.push(Segment::Field(name.to_owned()))
    }

    pub fn key(&self, key: &str) -> Self {
        self.push(Segment::Key(key.to_owned()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.push(Segment::Index(index))
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    fn push(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);

        Self { segments }
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Field(name) if position == 0 => f.write_str(name)?,
                Segment::Field(name) => f.write_fmt(format_args!(".{name}"))?,
                Segment::Key(key) => f.write_fmt(format_args!("[{key}]"))?,
                Segment::Index(index) => f.write_fmt(format_args!("[{index}]"))?,
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Required,
    Invalid,
    Forbidden,
    TooLong,
    NotSupported,
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorType::Required => "Required value",
            ErrorType::Invalid => "Invalid value",
            ErrorType::Forbidden => "Forbidden",
            ErrorType::TooLong => "Too long",
            ErrorType::NotSupported => "Unsupported value",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: FieldPath,
    pub error_type: ErrorType,
    pub value: Option<String>,
    pub detail: String,
}

impl FieldError {
    pub fn required(path: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            path,
            error_type: ErrorType::Required,
            value: None,
            detail: detail.into(),
        }
    }

    pub fn invalid(path: FieldPath, value: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path,
            error_type: ErrorType::Invalid,
            value: Some(value.into()),
            detail: detail.into(),
        }
    }

    pub fn forbidden(path: FieldPath, detail: impl Into<String>) -> Self {
        Self {
            path,
            error_type: ErrorType::Forbidden,
            value: None,
            detail: detail.into(),
        }
    }

    pub fn too_long(path: FieldPath, value: impl Into<String>, max_length: usize) -> Self {
        Self {
            path,
            error_type: ErrorType::TooLong,
            value: Some(value.into()),
            detail: format!("must have at most {max_length} characters"),
        }
    }

    pub fn not_supported(path: FieldPath, value: impl Into<String>, supported: &[&str]) -> Self {
        Self {
            path,
            error_type: ErrorType::NotSupported,
            value: Some(value.into()),
            detail: format!("supported values: {}", supported.join(", ")),
        }
    }
}

impl Display for FieldError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if !self.path.is_root() {
            f.write_fmt(format_args!("{}: ", self.path))?;
        }

        f.write_fmt(format_args!("{}", self.error_type))?;

        if let Some(value) = &self.value {
            f.write_fmt(format_args!(": {value:?}"))?;
        }

        if !self.detail.is_empty() {
            f.write_fmt(format_args!(": {}", self.detail))?;
        }

        Ok(())
    }
}

/// Validation result, empty when the object is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorList(Vec<FieldError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_path(&self, path: &str) -> bool {
        self.0.iter().any(|error| error.path.to_string() == path)
    }

    pub fn into_result(self) -> Result<(), ErrorList> {
        match self.0.is_empty() {
            true => Ok(()),
            false => Err(self),
        }
    }
}

impl Deref for ErrorList {
    type Target = Vec<FieldError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for ErrorList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<FieldError>> for ErrorList {
    fn from(value: Vec<FieldError>) -> Self {
        Self(value)
    }
}

impl FromIterator<FieldError> for ErrorList {
    fn from_iter<T: IntoIterator<Item = FieldError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<FieldError> for ErrorList {
    fn extend<T: IntoIterator<Item = FieldError>>(&mut self, iter: T) {
        self.0.extend(iter)
    }
}

impl IntoIterator for ErrorList {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Display for ErrorList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0.len() {
            0 => f.write_str("no errors"),
            1 => f.write_fmt(format_args!("{}", self.0[0])),
            _ => {
                f.write_str("[")?;
                for (position, error) in self.0.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_fmt(format_args!("{error}"))?;
                }
                f.write_str("]")
            }
        }
    }
}
