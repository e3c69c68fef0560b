//! Row types for the shopping list table

use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// A persisted shopping list row
///
/// `id` is assigned by the store on insert and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoppingItem {
    pub id: i64,
    pub name: String,
    pub quantity: i32,
    pub is_checked: bool,
}

impl ShoppingItem {
    /// Map a `SELECT id, name, quantity, is_checked` row
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            quantity: row.get(2)?,
            is_checked: row.get(3)?,
        })
    }

    /// Copy of this row with the checked flag replaced
    pub fn with_checked(&self, is_checked: bool) -> Self {
        Self {
            is_checked,
            ..self.clone()
        }
    }
}

/// A row that has not been inserted yet (no id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub name: String,
    pub quantity: i32,
    pub is_checked: bool,
}

impl NewItem {
    pub fn new(name: impl Into<String>, quantity: i32) -> Self {
        Self {
            name: name.into(),
            quantity,
            is_checked: false,
        }
    }
}

/// Read query shapes supported by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemQuery {
    /// Every row, by ascending id
    All,
    /// Rows whose name contains the text (case-sensitive), unchecked first,
    /// newest first within each group
    Matching(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_item_defaults_unchecked() {
        let item = NewItem::new("Milk", 2);
        assert_eq!(item.name, "Milk");
        assert_eq!(item.quantity, 2);
        assert!(!item.is_checked);
    }

    #[test]
    fn test_with_checked_preserves_other_fields() {
        let item = ShoppingItem {
            id: 7,
            name: "Bread".to_string(),
            quantity: 3,
            is_checked: false,
        };
        let toggled = item.with_checked(true);
        assert_eq!(toggled.id, 7);
        assert_eq!(toggled.name, "Bread");
        assert_eq!(toggled.quantity, 3);
        assert!(toggled.is_checked);
    }
}
