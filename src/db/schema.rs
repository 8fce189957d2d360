//! Database schema and types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// SQL schema for initialization
///
/// `items.category` is a plain name, not a foreign key: renaming or removing a
/// category never touches existing items. `categories.name_key` holds the
/// Unicode-lowercased name and carries the uniqueness constraint.
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS categories (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    name_key TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    price TEXT NOT NULL,
    category TEXT NOT NULL,
    added_date TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_category ON items(category);
CREATE INDEX IF NOT EXISTS idx_items_added ON items(added_date);
";

/// Uniqueness key for a category name
pub fn category_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Categories present in every fresh catalog
pub const SEED_CATEGORIES: &[&str] = &["Books", "Clothing", "Electronics", "Home", "Other"];

/// Catalog item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub category: String,
    pub added_at: DateTime<Utc>,
}

/// Catalog category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// Item to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    /// Caller-chosen id. Inserting an id that is already stored returns the
    /// stored item and writes nothing, so a retried insert is harmless.
    pub id: String,
    pub name: String,
    pub price: Decimal,
    pub category: String,
    /// Create `category` (with the item's id) in the same transaction; fails
    /// with `CategoryExists` if it is already present.
    pub create_category: bool,
    pub added_at: DateTime<Utc>,
}

/// Editable item fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    Name,
    Price,
    Category,
}

impl ItemField {
    pub const ALL: [ItemField; 3] = [ItemField::Name, ItemField::Price, ItemField::Category];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemField::Name => "name",
            ItemField::Price => "price",
            ItemField::Category => "category",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(ItemField::Name),
            "price" => Some(ItemField::Price),
            "category" => Some(ItemField::Category),
            _ => None,
        }
    }
}

impl fmt::Display for ItemField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single-field change to an existing item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemUpdate {
    Name(String),
    Price(Decimal),
    /// Move the item to `name`; with `create` the category is inserted in the
    /// same transaction. Creating the category the item already sits in is a
    /// no-op, so a retried move is harmless.
    Category { name: String, create: bool },
}

impl ItemUpdate {
    pub fn field(&self) -> ItemField {
        match self {
            ItemUpdate::Name(_) => ItemField::Name,
            ItemUpdate::Price(_) => ItemField::Price,
            ItemUpdate::Category { .. } => ItemField::Category,
        }
    }
}

/// Aggregate catalog numbers for the admin stats view
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CatalogStats {
    pub total_items: usize,
    pub total_categories: usize,
    /// Item count per category name, including empty categories and names
    /// that items still carry but no longer exist as categories
    pub per_category: BTreeMap<String, usize>,
    pub total_value: Decimal,
}
