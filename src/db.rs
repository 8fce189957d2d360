//! Catalog store
//!
//! Owns the `items` and `categories` relations. Every mutation runs in its own
//! transaction behind the connection mutex, so check-then-insert sequences
//! cannot interleave with another writer.

mod schema;

pub use schema::*;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
    #[error("Item not found: {0}")]
    ItemNotFound(String),
    #[error("Category already exists: {0}")]
    CategoryExists(String),
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("Invalid price: {0}")]
    InvalidPrice(Decimal),
}

pub type DbResult<T> = Result<T, DbError>;

const ITEM_COLUMNS: &str = "id, name, price, category, added_date";

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        for name in SEED_CATEGORIES {
            conn.execute(
                "INSERT OR IGNORE INTO categories (id, name, name_key) VALUES (?1, ?2, ?3)",
                params![uuid::Uuid::new_v4().to_string(), name, category_key(name)],
            )?;
        }
        Ok(())
    }

    // ==================== Queries ====================

    /// All items in insertion order
    pub fn list_items(&self) -> DbResult<Vec<Item>> {
        self.query_items(
            &format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY added_date ASC, rowid ASC"),
            [],
        )
    }

    /// All items ordered by name with byte-wise (case-sensitive) collation,
    /// so "Zebra" sorts before "apple". Ties fall back to insertion order.
    pub fn list_items_sorted(&self) -> DbResult<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 ORDER BY name COLLATE BINARY ASC, added_date ASC, rowid ASC"
            ),
            [],
        )
    }

    /// Category names, byte-wise sorted
    pub fn list_categories(&self) -> DbResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT name FROM categories ORDER BY name COLLATE BINARY")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Items whose stored category equals `name` exactly
    pub fn items_in_category(&self, name: &str) -> DbResult<Vec<Item>> {
        self.query_items(
            &format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE category = ?1 COLLATE BINARY
                 ORDER BY added_date ASC, rowid ASC"
            ),
            params![name],
        )
    }

    /// Case-insensitive substring match on item names.
    ///
    /// Folding happens in Rust: SQLite's `lower()` only folds ASCII.
    pub fn search_by_name_substring(&self, term: &str) -> DbResult<Vec<Item>> {
        let needle = term.trim().to_lowercase();
        let items = self.list_items()?;
        Ok(items
            .into_iter()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .collect())
    }

    /// Get item by ID
    pub fn get_item(&self, id: &str) -> DbResult<Item> {
        let conn = self.lock()?;
        fetch_item(&conn, id)?.ok_or_else(|| DbError::ItemNotFound(id.to_string()))
    }

    // ==================== Mutations ====================

    /// Insert an item. The category must exist at insertion time unless the
    /// item asks for it to be created alongside. An id that is already stored
    /// returns the stored item untouched.
    pub fn insert_item(&self, new: &NewItem) -> DbResult<Item> {
        if new.price.is_sign_negative() && !new.price.is_zero() {
            return Err(DbError::InvalidPrice(new.price));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if let Some(existing) = fetch_item(&tx, &new.id)? {
            tracing::debug!(item_id = %existing.id, "Insert replayed, item already stored");
            return Ok(existing);
        }

        let category = if new.create_category {
            insert_category_tx(&tx, &new.id, &new.category)?.name
        } else {
            canonical_category(&tx, &new.category)?
                .ok_or_else(|| DbError::CategoryNotFound(new.category.clone()))?
        };

        let item = Item {
            id: new.id.clone(),
            name: new.name.clone(),
            price: new.price,
            category,
            added_at: new.added_at,
        };

        tx.execute(
            "INSERT INTO items (id, name, price, category, added_date) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.id,
                item.name,
                item.price.to_string(),
                item.category,
                item.added_at.to_rfc3339()
            ],
        )?;
        tx.commit()?;

        Ok(item)
    }

    /// Apply a single-field change. A missing item is reported before any
    /// category check, and nothing is written on failure.
    pub fn update_item_field(&self, id: &str, update: &ItemUpdate) -> DbResult<Item> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some(current) = fetch_item(&tx, id)? else {
            return Err(DbError::ItemNotFound(id.to_string()));
        };

        match update {
            ItemUpdate::Name(name) => {
                tx.execute("UPDATE items SET name = ?1 WHERE id = ?2", params![name, id])?;
            }
            ItemUpdate::Price(price) => {
                if price.is_sign_negative() && !price.is_zero() {
                    return Err(DbError::InvalidPrice(*price));
                }
                tx.execute(
                    "UPDATE items SET price = ?1 WHERE id = ?2",
                    params![price.to_string(), id],
                )?;
            }
            ItemUpdate::Category { name, create } => {
                let already_there = category_key(&current.category) == category_key(name);
                let category = if *create && !already_there {
                    insert_category_tx(&tx, &uuid::Uuid::new_v4().to_string(), name)?.name
                } else {
                    canonical_category(&tx, name)?
                        .ok_or_else(|| DbError::CategoryNotFound(name.clone()))?
                };
                tx.execute(
                    "UPDATE items SET category = ?1 WHERE id = ?2",
                    params![category, id],
                )?;
            }
        }

        let item = fetch_item(&tx, id)?.ok_or_else(|| DbError::ItemNotFound(id.to_string()))?;
        tx.commit()?;
        Ok(item)
    }

    /// Delete an item
    pub fn delete_item(&self, id: &str) -> DbResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(DbError::ItemNotFound(id.to_string()));
        }
        Ok(())
    }

    /// Insert a category under a caller-chosen id. Names are unique ignoring
    /// case; a duplicate fails with `CategoryExists` and writes nothing. An id
    /// that is already stored returns the stored category.
    pub fn insert_category(&self, id: &str, name: &str) -> DbResult<Category> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let category = insert_category_tx(&tx, id, name)?;
        tx.commit()?;
        Ok(category)
    }

    /// Aggregate numbers over the whole catalog
    pub fn stats(&self) -> DbResult<CatalogStats> {
        let categories = self.list_categories()?;
        let items = self.list_items()?;

        let mut stats = CatalogStats {
            total_items: items.len(),
            total_categories: categories.len(),
            ..CatalogStats::default()
        };
        for name in categories {
            stats.per_category.insert(name, 0);
        }
        for item in &items {
            *stats.per_category.entry(item.category.clone()).or_insert(0) += 1;
            stats.total_value += item.price;
        }
        Ok(stats)
    }

    fn query_items<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<Item>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, parse_item_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn insert_category_tx(tx: &Transaction<'_>, id: &str, name: &str) -> DbResult<Category> {
    let existing = tx
        .query_row(
            "SELECT id, name FROM categories WHERE id = ?1",
            params![id],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    if let Some(category) = existing {
        tracing::debug!(category_id = %category.id, "Insert replayed, category already stored");
        return Ok(category);
    }

    let category = Category {
        id: id.to_string(),
        name: name.to_string(),
    };
    match tx.execute(
        "INSERT INTO categories (id, name, name_key) VALUES (?1, ?2, ?3)",
        params![category.id, category.name, category_key(name)],
    ) {
        Ok(_) => Ok(category),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(DbError::CategoryExists(name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Stored spelling of a category, matched ignoring case
fn canonical_category(conn: &Connection, name: &str) -> DbResult<Option<String>> {
    conn.query_row(
        "SELECT name FROM categories WHERE name_key = ?1",
        params![category_key(name)],
        |row| row.get(0),
    )
    .optional()
    .map_err(DbError::from)
}

fn fetch_item(conn: &Connection, id: &str) -> DbResult<Option<Item>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
        params![id],
        parse_item_row,
    )
    .optional()
    .map_err(DbError::from)
}

fn parse_item_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    let price: String = row.get(2)?;
    let price = Decimal::from_str(&price).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Item {
        id: row.get(0)?,
        name: row.get(1)?,
        price,
        category: row.get(3)?,
        added_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
