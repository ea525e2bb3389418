//! Record type descriptors and the cacheable-type registry
//!
//! A cacheable type implements [`Record`], exposing a static table of
//! [`Field`] accessors. The [`record!`](crate::record) macro generates both
//! [`Model`] and [`Record`] for a plain struct:
//!
//! ```
//! use sqlcache::record;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct User {
//!     id: u64,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! record!(User { id, name as "user_name", email });
//! ```

use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// A type with a stable record name
///
/// Implemented for record types and, transitively, for references, boxes,
/// slices, arrays and vectors of them, so an example value of any of those
/// shapes reduces to its element type's name.
pub trait Model {
    fn model_name() -> &'static str;
}

impl<T: Model + ?Sized> Model for &T {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

impl<T: Model + ?Sized> Model for &mut T {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

impl<T: Model + ?Sized> Model for Box<T> {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

impl<T: Model + ?Sized> Model for Rc<T> {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

impl<T: Model + ?Sized> Model for Arc<T> {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

impl<T: Model> Model for [T] {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

impl<T: Model, const N: usize> Model for [T; N] {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

impl<T: Model> Model for Vec<T> {
    fn model_name() -> &'static str {
        T::model_name()
    }
}

/// Accessors for one field of a record
pub struct Field<R> {
    /// Field name used as the key in encoded payloads
    pub name: &'static str,
    /// Column name matched when scanning rows
    pub column: &'static str,
    pub get: fn(&R) -> Result<Value, serde_json::Error>,
    pub is_default: fn(&R) -> bool,
    pub set: fn(&mut R, Value) -> Result<(), serde_json::Error>,
}

impl<R> fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("column", &self.column)
            .finish()
    }
}

/// A record shape that can be cached
pub trait Record: Model + Default + Send + Sync + 'static {
    fn fields() -> &'static [Field<Self>];

    fn field(name: &str) -> Option<&'static Field<Self>> {
        Self::fields().iter().find(|field| field.name == name)
    }
}

/// Whether a value equals its type's default
pub fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// Implement [`Model`] and [`Record`] for a struct.
///
/// Each listed field becomes a [`Field`] whose column defaults to the field
/// name; `field as "column"` overrides it. Field types must implement
/// `Serialize`, `DeserializeOwned`, `Default` and `PartialEq`.
#[macro_export]
macro_rules! record {
    ($ty:ident { $($field:ident $(as $column:literal)?),* $(,)? }) => {
        impl $crate::model::Model for $ty {
            fn model_name() -> &'static str {
                stringify!($ty)
            }
        }

        impl $crate::model::Record for $ty {
            fn fields() -> &'static [$crate::model::Field<Self>] {
                static FIELDS: &[$crate::model::Field<$ty>] = &[
                    $(
                        $crate::model::Field {
                            name: stringify!($field),
                            column: $crate::__column!($field $(, $column)?),
                            get: |record: &$ty| {
                                $crate::__private::serde_json::to_value(&record.$field)
                            },
                            is_default: |record: &$ty| $crate::model::is_default(&record.$field),
                            set: |record: &mut $ty, value: $crate::__private::serde_json::Value| {
                                $crate::__private::serde_json::from_value(value)
                                    .map(|parsed| record.$field = parsed)
                            },
                        },
                    )*
                ];
                FIELDS
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __column {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $column:literal) => {
        $column
    };
}

/// The fixed set of record names whose query results may be cached
#[derive(Debug, Clone, Default)]
pub struct ModelSet {
    names: HashSet<String>,
}

impl ModelSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether results of `T` (or any container of it) are cacheable
    pub fn is_eligible<T: Model + ?Sized>(&self) -> bool {
        self.contains(T::model_name())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    record!(User { id, name as "user_name" });

    #[derive(Debug, Default, PartialEq)]
    struct Pet {
        id: u64,
    }

    record!(Pet { id });

    #[test]
    fn test_model_name_unwraps_containers() {
        assert_eq!(User::model_name(), "User");
        assert_eq!(<Vec<User>>::model_name(), "User");
        assert_eq!(<&[Box<User>]>::model_name(), "User");
        assert_eq!(<[Arc<User>; 3]>::model_name(), "User");
        assert_eq!(<&mut Vec<&User>>::model_name(), "User");
    }

    #[test]
    fn test_generated_fields() {
        let fields = User::fields();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "id");
        assert_eq!(fields[0].column, "id");
        assert_eq!(fields[1].name, "name");
        assert_eq!(fields[1].column, "user_name");

        let mut user = User::default();
        assert!((fields[1].is_default)(&user));

        (fields[1].set)(&mut user, Value::from("alice")).unwrap();
        assert_eq!(user.name, "alice");
        assert!(!(fields[1].is_default)(&user));
        assert_eq!((fields[1].get)(&user).unwrap(), Value::from("alice"));

        assert!((fields[0].set)(&mut user, Value::from("nope")).is_err());
        assert!(User::field("name").is_some());
        assert!(User::field("user_name").is_none());
    }

    #[test]
    fn test_model_set_lookup() {
        let set = ModelSet::from_names([User::model_name()]);
        assert!(set.is_eligible::<User>());
        assert!(set.is_eligible::<Vec<User>>());
        assert!(!set.is_eligible::<Pet>());
        assert_eq!(set.len(), 1);
        assert_eq!(set.names(), vec!["User"]);
        assert!(ModelSet::default().is_empty());
    }
}
