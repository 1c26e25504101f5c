use thiserror::Error;

use self::{
    fields::{FieldSelector, Fields},
    labels::{LabelSelector, Labels, SelectorError},
};

pub mod fields;
pub mod labels;
pub mod network;

/// Projects an object into the labels and fields selectors are evaluated on.
pub type AttrFunc<K> = fn(&K) -> (Labels, Fields);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("Expected an object of kind {}, got {}!", .expected, .found)]
    WrongKind { expected: String, found: String },
}

pub struct SelectionPredicate<K> {
    pub label: LabelSelector,
    pub field: FieldSelector,
    pub get_attrs: AttrFunc<K>,
}

impl<K> SelectionPredicate<K> {
    pub fn new(label: LabelSelector, field: FieldSelector, get_attrs: AttrFunc<K>) -> Self {
        Self {
            label,
            field,
            get_attrs,
        }
    }

    pub fn everything(get_attrs: AttrFunc<K>) -> Self {
        Self::new(
            LabelSelector::everything(),
            FieldSelector::everything(),
            get_attrs,
        )
    }

    /// Builds a predicate from the raw `labelSelector` and `fieldSelector`
    /// query values; missing or empty selectors match everything.
    pub fn parse(
        label: Option<&str>,
        field: Option<&str>,
        get_attrs: AttrFunc<K>,
    ) -> Result<Self, SelectorError> {
        Ok(Self::new(
            label.map(str::parse::<LabelSelector>).transpose()?.unwrap_or_default(),
            field.map(str::parse::<FieldSelector>).transpose()?.unwrap_or_default(),
            get_attrs,
        ))
    }

    pub fn is_everything(&self) -> bool {
        self.label.is_empty() && self.field.is_empty()
    }

    pub fn matches(&self, object: &K) -> bool {
        if self.is_everything() {
            return true;
        }

        let (labels, fields) = (self.get_attrs)(object);
        self.matches_attrs(&labels, &fields)
    }

    pub fn matches_attrs(&self, labels: &Labels, fields: &Fields) -> bool {
        self.label.matches(labels) && self.field.matches(fields)
    }
}

impl<K> Clone for SelectionPredicate<K> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            field: self.field.clone(),
            get_attrs: self.get_attrs,
        }
    }
}

impl<K> std::fmt::Debug for SelectionPredicate<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionPredicate")
            .field("label", &self.label.to_string())
            .field("field", &self.field.to_string())
            .finish()
    }
}
