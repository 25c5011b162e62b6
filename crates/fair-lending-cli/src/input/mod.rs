pub mod cells_csv;
pub mod file;
pub mod stdin;
