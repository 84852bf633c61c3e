//! String-keyed property access for editor panels.
//!
//! A panel reads [`Inspectable::properties`] for display and calls
//! [`Inspectable::set_property`] when the user edits a value. Drawing the
//! panel is up to the host.

use glam::Vec3;

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Float(f32),
    Int(i64),
    Vec3(Vec3),
    /// Linear RGB.
    Color(Vec3),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Float(_) => "float",
            PropertyValue::Int(_) => "int",
            PropertyValue::Vec3(_) => "vec3",
            PropertyValue::Color(_) => "color",
        }
    }
}

/// Editing hints for a property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyOptions {
    Range { min: f32, max: f32, step: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    /// Dotted path, e.g. `"shadow.cascade_count"`.
    pub path: String,
    pub label: String,
    pub value: PropertyValue,
    pub options: Option<PropertyOptions>,
}

impl Property {
    pub fn new(path: &str, label: &str, value: PropertyValue) -> Self {
        Self {
            path: path.to_string(),
            label: label.to_string(),
            value,
            options: None,
        }
    }

    pub fn with_range(mut self, min: f32, max: f32, step: f32) -> Self {
        self.options = Some(PropertyOptions::Range { min, max, step });
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    /// The object has no property at this path.
    #[error("unknown property '{0}'")]
    UnknownPath(String),

    /// The value has a different type than the property.
    #[error("property '{path}' expects a {expected}, got a {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The value is outside the property's accepted range.
    #[error("value {value} is out of range for '{path}'")]
    OutOfRange { path: String, value: f64 },
}

/// Two-way binding between an object and an editor panel.
pub trait Inspectable {
    fn properties(&self) -> Vec<Property>;

    fn set_property(&mut self, path: &str, value: PropertyValue) -> Result<(), InspectError>;
}

fn mismatch(path: &str, expected: &'static str, value: &PropertyValue) -> InspectError {
    InspectError::TypeMismatch {
        path: path.to_string(),
        expected,
        found: value.type_name(),
    }
}

pub(crate) fn expect_float(path: &str, value: PropertyValue) -> Result<f32, InspectError> {
    match value {
        PropertyValue::Float(v) => Ok(v),
        other => Err(mismatch(path, "float", &other)),
    }
}

pub(crate) fn expect_float_in(
    path: &str,
    value: PropertyValue,
    min: f32,
    max: f32,
) -> Result<f32, InspectError> {
    let v = expect_float(path, value)?;
    if !(min..=max).contains(&v) {
        return Err(InspectError::OutOfRange {
            path: path.to_string(),
            value: f64::from(v),
        });
    }
    Ok(v)
}

/// Like [`expect_float_in`] with both bounds excluded.
pub(crate) fn expect_float_between(
    path: &str,
    value: PropertyValue,
    min: f32,
    max: f32,
) -> Result<f32, InspectError> {
    let v = expect_float(path, value)?;
    if !(v > min && v < max) {
        return Err(InspectError::OutOfRange {
            path: path.to_string(),
            value: f64::from(v),
        });
    }
    Ok(v)
}

pub(crate) fn expect_int_in(
    path: &str,
    value: PropertyValue,
    min: i64,
    max: i64,
) -> Result<i64, InspectError> {
    match value {
        PropertyValue::Int(v) if (min..=max).contains(&v) => Ok(v),
        PropertyValue::Int(v) => Err(InspectError::OutOfRange {
            path: path.to_string(),
            value: v as f64,
        }),
        other => Err(mismatch(path, "int", &other)),
    }
}

pub(crate) fn expect_bool(path: &str, value: PropertyValue) -> Result<bool, InspectError> {
    match value {
        PropertyValue::Bool(v) => Ok(v),
        other => Err(mismatch(path, "bool", &other)),
    }
}

pub(crate) fn expect_vec3(path: &str, value: PropertyValue) -> Result<Vec3, InspectError> {
    match value {
        PropertyValue::Vec3(v) | PropertyValue::Color(v) => Ok(v),
        other => Err(mismatch(path, "vec3", &other)),
    }
}

/// Look up the current value of `path`.
pub fn get_property(object: &dyn Inspectable, path: &str) -> Option<PropertyValue> {
    object
        .properties()
        .into_iter()
        .find(|p| p.path == path)
        .map(|p| p.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_range_is_checked() {
        assert_eq!(expect_int_in("n", PropertyValue::Int(3), 1, 8).unwrap(), 3);
        assert!(matches!(
            expect_int_in("n", PropertyValue::Int(9), 1, 8),
            Err(InspectError::OutOfRange { .. })
        ));
        assert!(matches!(
            expect_int_in("n", PropertyValue::Float(3.0), 1, 8),
            Err(InspectError::TypeMismatch { expected: "int", found: "float", .. })
        ));
    }

    #[test]
    fn test_color_accepted_as_vec3() {
        let v = expect_vec3("c", PropertyValue::Color(Vec3::ONE)).unwrap();
        assert_eq!(v, Vec3::ONE);
    }
}
