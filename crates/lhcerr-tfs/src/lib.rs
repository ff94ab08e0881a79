//! Legacy TFS-style table I/O.
//!
//! Reads the measurement-database error and rotation tables and writes
//! the fixed-layout optics/error files consumed by the external arc
//! correction binary, including its Fortran-width float format.

#![deny(missing_docs)]

pub mod format;
pub mod read;
pub mod write;

pub use format::{fortran_float, FIELD_WIDTH};
pub use read::{parse_table, read_table, TfsRow, TfsTable};
pub use write::{store_errors, store_optics_reference, DEFAULT_ERROR_PATTERNS};
