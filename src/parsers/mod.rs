pub mod table;

pub use table::{PERIOD_COLUMN, Table, normalize, parse_table};
