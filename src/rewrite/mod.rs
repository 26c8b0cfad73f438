//! SQL rewriting
//!
//! The token generator finds every spot of a statement that differs between
//! logical and actual SQL. The rewrite engine turns those tokens into one
//! [`SqlBuilder`] template, rendered per route unit.

pub mod builder;
pub mod engine;
pub mod generator;
pub mod keygen;
pub mod token;

pub use builder::{SqlBuilder, SqlUnit};
pub use engine::SqlRewriteEngine;
pub use generator::SqlTokenGenerator;
pub use keygen::{KeyGenerator, SnowflakeKeyGenerator};
pub use token::SqlToken;
