// Estimate Engine - Core Library
// Configurable financial calculation engine for event operations:
// category/column/formula sheets, pure arithmetic evaluation, top-N
// ranking, and the edit-session lifecycle that protects unsaved work.

pub mod document;
pub mod export;
pub mod formula;
pub mod registry;
pub mod session;
pub mod store;
pub mod totals;

// Re-export commonly used types
pub use document::{
    column_letter, standard_fields, Category, Column, ColumnKind, Document, DocumentKey,
    DocumentSide, Item,
};
pub use export::{export_csv, import_csv};
pub use formula::{
    compile, evaluate_item, preview_formula, validate_formula, CompiledFormula, FormulaError,
    Preview, Validation,
};
pub use registry::{ColumnBinding, SchemaError};
pub use session::{
    EditError, EditSession, EstimateUnlock, NavigationChoice, SessionError, SessionState,
};
pub use store::{DocumentStore, MemoryStore, SqliteStore};
pub use totals::{category_total, grand_total, item_total, top_n, RankedItem};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
