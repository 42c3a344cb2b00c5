//! Paired views of the new and old state of a document member.

use serde_json::Value;

/// A document member as submitted (`new`) and as currently stored (`old`).
///
/// Either side may be absent. A JSON `null` counts as absent for
/// `has_new`/`has_old`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonInput<'v> {
    new: Option<&'v Value>,
    old: Option<&'v Value>,
    /// Whether an old view exists at all, as opposed to an old view in
    /// which this member is missing.
    has_old_view: bool,
}

/// Result of correlating new array elements with old ones.
#[derive(Debug, Default)]
pub struct ArrayDiff<'v> {
    /// Every new element, paired with the old element of the same key.
    pub pairs: Vec<JsonInput<'v>>,
    /// Old elements no new element matched.
    pub missing_from_new: Vec<&'v Value>,
}

impl<'v> JsonInput<'v> {
    /// Input for an insert, or for an update without knowledge of the
    /// current state.
    pub fn new_only(new: &'v Value) -> Self {
        Self {
            new: Some(new),
            old: None,
            has_old_view: false,
        }
    }

    /// Input for an update with the current state known.
    pub fn with_old(new: &'v Value, old: &'v Value) -> Self {
        Self {
            new: Some(new),
            old: Some(old),
            has_old_view: true,
        }
    }

    pub fn has_new(&self) -> bool {
        self.new.map(|v| !v.is_null()).unwrap_or(false)
    }

    pub fn has_old(&self) -> bool {
        self.old.map(|v| !v.is_null()).unwrap_or(false)
    }

    /// True when the old state is known, even if this member was absent.
    pub fn has_old_view(&self) -> bool {
        self.has_old_view
    }

    /// True when the member is present in the new state and explicitly null.
    pub fn new_is_null(&self) -> bool {
        matches!(self.new, Some(Value::Null))
    }

    pub fn new_value(&self) -> Option<&'v Value> {
        self.new
    }

    pub fn old_value(&self) -> Option<&'v Value> {
        self.old
    }

    /// The member `name` on both sides.
    pub fn find(&self, name: &str) -> JsonInput<'v> {
        JsonInput {
            new: self.new.and_then(|v| v.get(name)),
            old: self.old.and_then(|v| v.get(name)),
            has_old_view: self.has_old_view,
        }
    }

    /// Pair every new array element with the old element sharing its key.
    ///
    /// Matched old elements are consumed, so a key cannot match twice.
    /// Elements whose key cannot be extracted never match.
    pub fn sort_old<K, F>(&self, get_key: F) -> ArrayDiff<'v>
    where
        K: PartialEq,
        F: Fn(&Value) -> Option<K>,
    {
        let new_items: &[Value] = match self.new {
            Some(Value::Array(items)) => items,
            _ => &[],
        };
        let mut old_items: Vec<(Option<K>, &'v Value)> = match self.old {
            Some(Value::Array(items)) => items.iter().map(|v| (get_key(v), v)).collect(),
            _ => Vec::new(),
        };

        let mut pairs = Vec::with_capacity(new_items.len());
        for item in new_items {
            let matched = get_key(item).and_then(|key| {
                old_items
                    .iter()
                    .position(|(old_key, _)| old_key.as_ref() == Some(&key))
                    .map(|pos| old_items.remove(pos).1)
            });
            pairs.push(JsonInput {
                new: Some(item),
                old: matched,
                has_old_view: self.has_old_view,
            });
        }

        ArrayDiff {
            pairs,
            missing_from_new: old_items.into_iter().map(|(_, v)| v).collect(),
        }
    }
}
