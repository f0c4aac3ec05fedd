//! Domain Value Objects

pub mod identity;
pub mod month;
pub mod tier;
