pub mod aggregate;
pub mod context;
pub mod filter;
pub mod predicate;
pub mod schema;
