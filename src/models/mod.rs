//! Domain model module declarations.

pub mod stack;
pub mod status;
pub mod task;
