use crate::value::{RawBag, RawValue};
use serde::Serialize;
use std::collections::BTreeMap;

/// Stored in place of any inventory value that looks like a credential.
pub const REDACTED: &str = "(omitted value)";

pub type InventoryItem = BTreeMap<String, RawValue>;

/// Returns true when either the item key or the field name mentions a password.
pub fn should_redact(key: &str, field: &str) -> bool {
    let sensitive = |s: &str| s.to_ascii_lowercase().contains("password");
    sensitive(key) || sensitive(field)
}

/// Two-level inventory: item key to field name to value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Inventory {
    items: BTreeMap<String, InventoryItem>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field` of item `key`, merging into the item if it already exists.
    /// NaN and infinite floats are stored as text.
    pub fn set_item(&mut self, key: impl Into<String>, field: impl Into<String>, value: impl Into<RawValue>) {
        let key = key.into();
        let field = field.into();
        let value = if should_redact(&key, &field) {
            RawValue::from(REDACTED)
        } else {
            value.into().into_finite()
        };

        self.items.entry(key).or_default().insert(field, value);
    }

    pub fn get(&self, key: &str, field: &str) -> Option<&RawValue> {
        self.items.get(key)?.get(field)
    }

    pub fn item(&self, key: &str) -> Option<&InventoryItem> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InventoryItem)> {
        self.items.iter()
    }
}

/// Flattens `raw` into `inventory`.
///
/// Nested maps become one item with a field per entry, scalars become an item
/// with a single `value` field. Lists, at either level, are skipped.
pub fn populate_inventory(inventory: &mut Inventory, raw: &RawBag) {
    for (key, value) in raw {
        match value {
            RawValue::Map(fields) => {
                for (field, value) in fields {
                    if matches!(value, RawValue::List(_)) {
                        continue;
                    }
                    inventory.set_item(key.as_str(), field.as_str(), value.clone());
                }
            }
            RawValue::List(_) => {}
            scalar => inventory.set_item(key.as_str(), "value", scalar.clone()),
        }
    }
}
