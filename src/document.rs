// 📄 Document Model - Categories, columns, items
// The persisted unit behind the revenue and cost builders:
// categories of line items, each category with an ordered column set
// and one arithmetic formula that rolls a row of values into a total.

use chrono::{DateTime, Utc};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// ============================================================================
// COLUMNS
// ============================================================================

/// Whether a column is bound to a well-known field or a user-named one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Bound to one of the standard field bindings (see `standard_fields`)
    Standard,
    /// Freshly named by the user for this category only
    Custom,
}

/// A named numeric input slot on a category
///
/// Columns are addressed positionally in formulas: index 0 is `A`,
/// index 1 is `B`, and so on. The id is the storage key inside each
/// item's value map; the label is what the host displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Storage key, unique within the owning category
    pub id: String,

    /// Display label
    pub label: String,

    /// Standard or custom binding
    pub kind: ColumnKind,
}

impl Column {
    pub fn standard(id: &str, label: &str) -> Self {
        Column {
            id: id.to_string(),
            label: label.to_string(),
            kind: ColumnKind::Standard,
        }
    }

    pub fn custom(id: &str, label: &str) -> Self {
        Column {
            id: id.to_string(),
            label: label.to_string(),
            kind: ColumnKind::Custom,
        }
    }
}

/// Formula letter for a column position (index 0 → 'A')
///
/// Behavior beyond 26 columns is undefined by the data model; we wrap.
pub fn column_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

/// Well-known field bindings offered by `set_column_binding`
pub fn standard_fields() -> &'static [(&'static str, &'static str)] {
    &[
        ("fee", "Fee"),
        ("quantity", "Quantity"),
        ("days", "Days"),
        ("rate", "Rate"),
        ("percentage", "Percentage"),
        ("amount", "Amount"),
    ]
}

// ============================================================================
// ITEMS
// ============================================================================

/// One row of data within a category
///
/// Values are keyed by column id. A missing value means 0 when the
/// formula is evaluated. Items have no identity outside their owning
/// category; deleting the category deletes them.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Unique within the owning category (assigned as max existing id + 1)
    pub id: i64,

    /// Display name
    pub name: String,

    /// Column id → value. BTreeMap keeps serialization deterministic.
    pub values: BTreeMap<String, f64>,
}

impl Item {
    /// Value under a column id, 0 when absent
    pub fn value(&self, column_id: &str) -> f64 {
        self.values.get(column_id).copied().unwrap_or(0.0)
    }
}

// ============================================================================
// CATEGORIES
// ============================================================================

/// A named group of line items sharing one formula and column set
///
/// Identity: UUID string (never changes). Values: name, columns,
/// formula, items (change while an edit session is open).
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    /// Stable identity (UUID) - never changes
    pub id: String,

    /// Category name (e.g., "Ticketing", "Crew")
    pub name: String,

    /// Symbolic icon id for the host UI (e.g., "ticket")
    pub icon: String,

    /// Symbolic color theme id for the host UI (e.g., "blue")
    pub color_theme: String,

    /// Ordered column list; order determines formula letters
    pub columns: Vec<Column>,

    /// Per-category formula, e.g. "=A*B*(C/100)"
    pub formula: String,

    /// Ordered line items
    pub items: Vec<Item>,

    /// UI-only accordion state; never serialized, never fingerprinted
    pub collapsed: bool,
}

impl Category {
    /// Create a category with the default single column and identity formula
    pub fn new(name: &str, icon: &str, color_theme: &str) -> Self {
        Category {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            icon: icon.to_string(),
            color_theme: color_theme.to_string(),
            columns: vec![Column::standard("amount", "Amount")],
            formula: "=A".to_string(),
            items: Vec::new(),
            collapsed: false,
        }
    }

    /// Builder-style replacement of columns and formula (used by templates)
    pub fn with_schema(mut self, columns: Vec<Column>, formula: &str) -> Self {
        self.columns = columns;
        self.formula = formula.to_string();
        self
    }

    /// Position of a column by id
    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == column_id)
    }

    /// The item values in column order, missing values as 0
    pub fn row_values(&self, item: &Item) -> Vec<f64> {
        self.columns.iter().map(|c| item.value(&c.id)).collect()
    }
}

// ============================================================================
// SERIALIZATION (wire shape)
// ============================================================================
// Items serialize as flat objects: { id, name, <columnId>: number, ... }.
// Only columns currently defined on the category at save time are written;
// values orphaned by column removal or rebinding stay in memory but never
// reach disk. Columns added later default the missing values to 0 on read.

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryWire {
    id: String,
    name: String,
    icon: String,
    color_theme: String,
    columns: Vec<Column>,
    formula: String,
    items: Vec<serde_json::Map<String, serde_json::Value>>,
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let items = self
            .items
            .iter()
            .map(|item| {
                let mut map = serde_json::Map::new();
                map.insert("id".to_string(), serde_json::json!(item.id));
                map.insert("name".to_string(), serde_json::json!(item.name));
                // Field presence rule: only currently-defined columns
                for column in &self.columns {
                    if let Some(v) = item.values.get(&column.id) {
                        map.insert(column.id.clone(), serde_json::json!(v));
                    }
                }
                map
            })
            .collect();

        CategoryWire {
            id: self.id.clone(),
            name: self.name.clone(),
            icon: self.icon.clone(),
            color_theme: self.color_theme.clone(),
            columns: self.columns.clone(),
            formula: self.formula.clone(),
            items,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = CategoryWire::deserialize(deserializer)?;

        let mut items = Vec::with_capacity(wire.items.len());
        for raw in wire.items {
            let id = raw
                .get("id")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| D::Error::custom("item is missing a numeric id"))?;
            let name = raw
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let mut values = BTreeMap::new();
            for (key, value) in &raw {
                if key == "id" || key == "name" {
                    continue;
                }
                // Non-numeric junk reads as 0 rather than failing the load
                values.insert(key.clone(), value.as_f64().unwrap_or(0.0));
            }

            items.push(Item { id, name, values });
        }

        Ok(Category {
            id: wire.id,
            name: wire.name,
            icon: wire.icon,
            color_theme: wire.color_theme,
            columns: wire.columns,
            formula: wire.formula,
            items,
            collapsed: false,
        })
    }
}

// ============================================================================
// DOCUMENT
// ============================================================================

/// Which side of an owning entity a document covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSide {
    Revenue,
    Cost,
}

impl DocumentSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentSide::Revenue => "revenue",
            DocumentSide::Cost => "cost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revenue" => Some(DocumentSide::Revenue),
            "cost" => Some(DocumentSide::Cost),
            _ => None,
        }
    }
}

/// Storage key for one document: one per owning entity and side
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub entity_id: String,
    pub side: DocumentSide,
}

impl DocumentKey {
    pub fn new(entity_id: &str, side: DocumentSide) -> Self {
        DocumentKey {
            entity_id: entity_id.to_string(),
            side,
        }
    }
}

/// The full persisted unit: all categories for one side of one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub categories: Vec<Category>,
    /// ISO currency code, e.g. "EUR"
    pub currency: String,
    pub last_modified: DateTime<Utc>,
}

impl Document {
    /// Empty document, no categories
    pub fn empty(currency: &str) -> Self {
        Document {
            categories: Vec::new(),
            currency: currency.to_string(),
            last_modified: Utc::now(),
        }
    }

    /// Default template for a side, used when the store has no document
    pub fn default_template(side: DocumentSide) -> Self {
        let categories = match side {
            DocumentSide::Revenue => vec![
                Category::new("Ticketing", "ticket", "blue").with_schema(
                    vec![
                        Column::standard("fee", "Fee"),
                        Column::standard("quantity", "Quantity"),
                        Column::standard("percentage", "% Performed"),
                    ],
                    "=A*B*(C/100)",
                ),
                Category::new("Sponsorship", "handshake", "purple"),
                Category::new("Merchandising", "shirt", "green").with_schema(
                    vec![
                        Column::standard("quantity", "Quantity"),
                        Column::standard("rate", "Unit Price"),
                    ],
                    "=A*B",
                ),
            ],
            DocumentSide::Cost => vec![
                Category::new("Venue", "building", "amber").with_schema(
                    vec![
                        Column::standard("rate", "Day Rate"),
                        Column::standard("days", "Days"),
                    ],
                    "=A*B",
                ),
                Category::new("Crew", "users", "red").with_schema(
                    vec![
                        Column::standard("quantity", "Headcount"),
                        Column::standard("rate", "Day Rate"),
                        Column::standard("days", "Days"),
                    ],
                    "=A*B*C",
                ),
                Category::new("Logistics", "truck", "slate"),
                Category::new("Marketing", "megaphone", "pink"),
            ],
        };

        Document {
            categories,
            currency: "EUR".to_string(),
            last_modified: Utc::now(),
        }
    }

    /// Find a category by id
    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    pub(crate) fn category_mut(&mut self, id: &str) -> Option<&mut Category> {
        self.categories.iter_mut().find(|c| c.id == id)
    }

    /// Canonical JSON for snapshots and persistence
    ///
    /// Field order is fixed by the struct layout and the ordered value
    /// maps, so equal documents always produce equal strings.
    pub fn canonical_json(&self) -> String {
        // Serialization of this shape cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// SHA-256 hex fingerprint of the canonical JSON
    ///
    /// Two documents with the same financial content have the same
    /// fingerprint; `collapsed` and other UI-only state never affect it.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_json().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Parse a document back from canonical JSON
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        use anyhow::Context;
        serde_json::from_str(json).context("Failed to parse document JSON")
    }
}

// ============================================================================
// TESTS
// ============================================================================
