//! External process execution

pub mod renpy;
pub mod subprocess;
