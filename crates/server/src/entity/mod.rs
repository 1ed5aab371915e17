//! SeaORM entities. The schema itself is owned by the `migration` crate.

pub mod account;
pub mod cell;
pub mod cell_key;
pub mod cell_resource;
