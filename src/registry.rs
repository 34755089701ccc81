// 🗂️ Category Schema Registry - Mutations over the document
// Every operation either applies fully or rejects with a typed error
// leaving the document unchanged. Mutation is normally reached through
// an EditSession, which gates these calls on the session state.

use crate::document::{column_letter, Category, Column, ColumnKind, Document, Item};
use crate::formula::{compile, FormulaError};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// SCHEMA ERRORS
// ============================================================================

/// Rejection reasons for registry operations
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    UnknownCategory(String),
    UnknownItem { category: String, item: i64 },
    UnknownColumn { category: String, column: String },
    ColumnIndexOutOfRange { category: String, index: usize },
    /// Removing the column would leave the formula with no operands
    LastColumn(String),
    DuplicateColumnId { category: String, column: String },
    /// "id" and "name" are item meta fields in the wire shape and can
    /// never be column ids
    ReservedColumnId(String),
    /// Formula change rejected; the old formula is retained
    InvalidFormula(FormulaError),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::UnknownCategory(id) => write!(f, "Unknown category '{}'", id),
            SchemaError::UnknownItem { category, item } => {
                write!(f, "No item {} in category '{}'", item, category)
            }
            SchemaError::UnknownColumn { category, column } => {
                write!(f, "No column '{}' in category '{}'", column, category)
            }
            SchemaError::ColumnIndexOutOfRange { category, index } => {
                write!(f, "Column index {} out of range for '{}'", index, category)
            }
            SchemaError::LastColumn(category) => write!(
                f,
                "Category '{}' needs at least one column; remove the category instead",
                category
            ),
            SchemaError::DuplicateColumnId { category, column } => {
                write!(f, "Column id '{}' already exists in '{}'", column, category)
            }
            SchemaError::ReservedColumnId(column) => {
                write!(f, "'{}' is reserved and cannot be a column id", column)
            }
            SchemaError::InvalidFormula(e) => write!(f, "Invalid formula: {}", e),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Requested rebinding for `set_column_binding`
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnBinding {
    pub id: String,
    pub label: String,
    pub kind: ColumnKind,
}

// ============================================================================
// REGISTRY OPERATIONS
// ============================================================================

impl Document {
    /// Add a category with a fresh id, one default column, identity formula
    pub fn add_category(&mut self, name: &str) -> Category {
        let category = Category::new(name, "folder", "slate");
        self.categories.push(category.clone());
        category
    }

    pub fn remove_category(&mut self, id: &str) -> Result<(), SchemaError> {
        let before = self.categories.len();
        self.categories.retain(|c| c.id != id);
        if self.categories.len() == before {
            return Err(SchemaError::UnknownCategory(id.to_string()));
        }
        Ok(())
    }

    pub fn rename_category(&mut self, id: &str, name: &str) -> Result<(), SchemaError> {
        let category = self
            .category_mut(id)
            .ok_or_else(|| SchemaError::UnknownCategory(id.to_string()))?;
        category.name = name.to_string();
        Ok(())
    }

    /// Append a custom column, labelled after its formula letter
    pub fn add_column(&mut self, category_id: &str) -> Result<Column, SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        // Smallest unused custom id keeps ids unique within the category
        let mut n = 1;
        while category.columns.iter().any(|c| c.id == format!("custom{}", n)) {
            n += 1;
        }
        let letter = column_letter(category.columns.len());
        let column = Column::custom(&format!("custom{}", n), &format!("Custom {}", letter));
        category.columns.push(column.clone());
        Ok(column)
    }

    /// Remove a column by position
    ///
    /// Rejected when it would leave zero columns: a formula needs at
    /// least one operand. Item values stored under the removed id are
    /// left in place; serialization filters them out.
    pub fn remove_column(&mut self, category_id: &str, index: usize) -> Result<Column, SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        if category.columns.len() <= 1 {
            return Err(SchemaError::LastColumn(category.name.clone()));
        }
        if index >= category.columns.len() {
            return Err(SchemaError::ColumnIndexOutOfRange {
                category: category.name.clone(),
                index,
            });
        }
        Ok(category.columns.remove(index))
    }

    /// Rebind a column to a standard field or a freshly named custom field
    ///
    /// Item values stored under the old id are NOT migrated: they stay
    /// in the item maps under the old key, stop being addressed by the
    /// formula, and are dropped at the next save. This mirrors the
    /// upstream behavior; see DESIGN.md.
    pub fn set_column_binding(
        &mut self,
        category_id: &str,
        index: usize,
        binding: ColumnBinding,
    ) -> Result<(), SchemaError> {
        // Items serialize flat, so a column id sharing a key with the
        // item meta fields would clobber them on save
        if binding.id == "id" || binding.id == "name" {
            return Err(SchemaError::ReservedColumnId(binding.id));
        }
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        if index >= category.columns.len() {
            return Err(SchemaError::ColumnIndexOutOfRange {
                category: category.name.clone(),
                index,
            });
        }
        let clash = category
            .columns
            .iter()
            .enumerate()
            .any(|(i, c)| i != index && c.id == binding.id);
        if clash {
            return Err(SchemaError::DuplicateColumnId {
                category: category.name.clone(),
                column: binding.id,
            });
        }

        category.columns[index] = Column {
            id: binding.id,
            label: binding.label,
            kind: binding.kind,
        };
        Ok(())
    }

    /// Replace the category formula, validated against its column count
    ///
    /// On rejection the old formula is retained.
    pub fn set_formula(&mut self, category_id: &str, formula: &str) -> Result<(), SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        let column_count = category.columns.len();
        let compiled =
            compile(formula, column_count).map_err(SchemaError::InvalidFormula)?;

        // Same placeholder check validate_formula applies: all-ones
        // input must produce a finite result
        let ones = vec![1.0; column_count];
        if !compiled.eval(&ones).is_finite() {
            return Err(SchemaError::InvalidFormula(FormulaError::NonFiniteResult));
        }

        category.formula = formula.to_string();
        Ok(())
    }

    /// Append a new item with every column value at 0
    pub fn add_item(&mut self, category_id: &str) -> Result<Item, SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        let mut values = BTreeMap::new();
        for column in &category.columns {
            values.insert(column.id.clone(), 0.0);
        }
        let item = Item {
            id: next_item_id(category),
            name: "New item".to_string(),
            values,
        };
        category.items.push(item.clone());
        Ok(item)
    }

    /// Copy an item, appending " (Copy)" to its name
    pub fn duplicate_item(&mut self, category_id: &str, item_id: i64) -> Result<Item, SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        let source = category
            .items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| SchemaError::UnknownItem {
                category: category_id.to_string(),
                item: item_id,
            })?;

        let mut copy = source.clone();
        copy.id = next_item_id(category);
        copy.name = format!("{} (Copy)", copy.name);
        category.items.push(copy.clone());
        Ok(copy)
    }

    pub fn rename_item(
        &mut self,
        category_id: &str,
        item_id: i64,
        name: &str,
    ) -> Result<(), SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        let item = category
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| SchemaError::UnknownItem {
                category: category_id.to_string(),
                item: item_id,
            })?;
        item.name = name.to_string();
        Ok(())
    }

    pub fn delete_item(&mut self, category_id: &str, item_id: i64) -> Result<(), SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        let before = category.items.len();
        category.items.retain(|i| i.id != item_id);
        if category.items.len() == before {
            return Err(SchemaError::UnknownItem {
                category: category_id.to_string(),
                item: item_id,
            });
        }
        Ok(())
    }

    /// Set one cell from raw user input
    ///
    /// Parses as float; parse failures and NaN both land as 0 so totals
    /// never see a NaN.
    pub fn update_item_value(
        &mut self,
        category_id: &str,
        item_id: i64,
        column_id: &str,
        raw_value: &str,
    ) -> Result<(), SchemaError> {
        let category = self
            .category_mut(category_id)
            .ok_or_else(|| SchemaError::UnknownCategory(category_id.to_string()))?;

        if category.column_index(column_id).is_none() {
            return Err(SchemaError::UnknownColumn {
                category: category_id.to_string(),
                column: column_id.to_string(),
            });
        }
        let item = category
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| SchemaError::UnknownItem {
                category: category_id.to_string(),
                item: item_id,
            })?;

        let parsed: f64 = raw_value.trim().parse().unwrap_or(0.0);
        let clean = if parsed.is_nan() { 0.0 } else { parsed };
        item.values.insert(column_id.to_string(), clean);
        Ok(())
    }
}

/// max existing id + 1, starting from 1
fn next_item_id(category: &Category) -> i64 {
    category.items.iter().map(|i| i.id).max().unwrap_or(0) + 1
}

// ============================================================================
// TESTS
// ============================================================================
