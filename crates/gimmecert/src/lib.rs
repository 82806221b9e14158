//! The `gimmecert` command line tool.
//!
//! Stores a CA hierarchy and all issued server and client artifacts below the
//! `.gimmecert` directory of a project. The certificate work itself happens in
//! [`gimmecert_certs`], this crate owns storage, CSR input, the command table
//! and logging.
pub mod commands;
pub mod csr_input;
pub mod error;
pub mod layout;
pub mod logging;
pub mod project;
pub mod storage;

pub use error::{Error, Result};
