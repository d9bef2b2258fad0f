//! Compile-time state threaded through every operator call.

use std::collections::HashMap;

use crate::error::{EvalError, Result};
use crate::value::FieldValue;

/// Bookkeeping for one compilation pass.
///
/// `field` is the focus used for determinism analysis; when it is set,
/// operators also build the pinned closures described on [`crate::operators`].
/// The registry records every literal each field was compared against.
#[derive(Debug, Clone, Default)]
pub struct State {
    field: Option<String>,
    field_values: HashMap<String, Vec<FieldValue>>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// State focused on `field`.
    pub fn with_field(field: impl Into<String>) -> Self {
        State {
            field: Some(field.into()),
            field_values: HashMap::new(),
        }
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    /// Record that `field` was compared against `value`.
    ///
    /// All literals registered against one field must share a type.
    pub fn update_field_values(&mut self, field: &str, value: FieldValue) -> Result<()> {
        let Some(values) = self.field_values.get_mut(field) else {
            log::trace!("registering first value for field `{field}`");
            self.field_values.insert(field.to_string(), vec![value]);
            return Ok(());
        };

        if let Some(first) = values.first()
            && first.value.kind() != value.value.kind()
        {
            log::debug!(
                "field `{field}` compared against {} after {} values",
                value.value.kind(),
                first.value.kind()
            );
            return Err(EvalError::FieldValueType {
                field: field.to_string(),
                expected: first.value.kind(),
                actual: value.value.kind(),
            });
        }

        if !values.contains(&value) {
            values.push(value);
        }
        Ok(())
    }

    /// Literals registered against `field`, in registration order.
    pub fn field_values(&self, field: &str) -> &[FieldValue] {
        self.field_values
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every field with at least one registered literal.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.field_values.keys().map(String::as_str)
    }
}
