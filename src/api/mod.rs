pub mod ask;
pub mod schema;
