//! Layout and boundary glue for tagged unions.
//!
//! Sum types are laid out with their discriminant in trailing padding
//! whenever it fits, glue functions are generated against those layouts
//! and boundary thunks adapt values to the host calling convention.

pub mod boundary;
pub mod cl_backend;
pub mod common;
pub mod error;
pub mod glue;
pub mod input;
pub mod layout;
pub mod target;
pub mod types;
