//! Database models split into domain-specific modules.

pub mod common;
pub mod plan;
pub mod progress;
pub mod student;
pub mod suggestion;
pub mod user;

pub use common::*;
pub use plan::*;
pub use progress::*;
pub use student::*;
pub use suggestion::*;
pub use user::*;
