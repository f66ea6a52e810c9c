//! Database query functions organized by table.

pub mod contributors;
pub mod payouts;
pub mod pools;
pub mod projects;
