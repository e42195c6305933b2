mod column;

pub use column::{ColumnDef, DefaultValue, ForeignKeyAction, ForeignKeyDef, IndexDef, TableDef};
