pub mod dsl;
pub mod material;
pub mod migrate;
pub mod n64;
pub mod schema;
pub mod session;
