pub mod q_shared;
pub mod common;
pub mod cvar;
pub mod files;
