//! Runtime value types shared by every crate

pub mod value;

pub use value::Value;
