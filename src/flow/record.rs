//! Records
//!
//! The immutable value container handed from one step to the next.
//! The engine never looks inside a record; it only moves references
//! to it between steps.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A single opaque value stored in a [`Record`].
pub type Value = Arc<dyn Any + Send + Sync>;

/// Fixed-size, indexable sequence of opaque values.
///
/// Cloning a record is cheap: the values are shared, never copied, and
/// nothing can mutate them once the record exists.
///
/// # Example
///
/// ```
/// use stepflow::Record;
///
/// let record = Record::of(5_i64).with("label");
/// assert_eq!(record.len(), 2);
/// assert_eq!(record.get::<i64>(0), Some(&5));
/// assert_eq!(record.get::<&str>(1), Some(&"label"));
/// ```
#[derive(Clone)]
pub struct Record {
    values: Arc<[Value]>,
}

impl Record {
    /// Creates a record with no values.
    pub fn empty() -> Self {
        Self::from_values(Vec::new())
    }

    /// Creates a single-value record.
    pub fn of<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_values(vec![Arc::new(value) as Value])
    }

    /// Creates a record from already shared values.
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            values: Arc::from(values),
        }
    }

    /// Returns a new record with `value` appended; `self` is left untouched.
    pub fn with<T: Any + Send + Sync>(&self, value: T) -> Self {
        let mut values: Vec<Value> = self.values.iter().cloned().collect();
        values.push(Arc::new(value));
        Self::from_values(values)
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed access to the value at `index`.
    ///
    /// Returns `None` when the index is out of range or the value is of
    /// another type.
    pub fn get<T: Any>(&self, index: usize) -> Option<&T> {
        self.values.get(index)?.downcast_ref::<T>()
    }

    /// Shorthand for `get(0)`, the common case for single-value records.
    pub fn first<T: Any>(&self) -> Option<&T> {
        self.get(0)
    }

    /// Untyped access to the shared value at `index`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns true if both records share the same storage.
    pub fn ptr_eq(&self, other: &Record) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_record() {
        let record = Record::empty();
        assert!(record.is_empty());
        assert_eq!(record.len(), 0);
        assert!(record.first::<i32>().is_none());
    }

    #[test]
    fn test_typed_access() {
        let record = Record::of(42_u32).with(String::from("answer"));
        assert_eq!(record.first::<u32>(), Some(&42));
        assert_eq!(record.get::<String>(1).map(String::as_str), Some("answer"));
    }

    #[test]
    fn test_wrong_type_or_index() {
        let record = Record::of(1_i32);
        assert!(record.get::<i64>(0).is_none());
        assert!(record.get::<i32>(3).is_none());
        assert!(record.value(3).is_none());
    }

    #[test]
    fn test_with_leaves_original_untouched() {
        let original = Record::of(1_i32);
        let extended = original.with(2_i32);
        assert_eq!(original.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(!original.ptr_eq(&extended));
    }

    #[test]
    fn test_clone_shares_storage() {
        let record = Record::of("shared");
        let copy = record.clone();
        assert!(record.ptr_eq(&copy));
    }

    #[test]
    fn test_debug_format() {
        let record = Record::of(1_u8).with(2_u8);
        assert_eq!(format!("{:?}", record), "Record { len: 2 }");
    }
}
