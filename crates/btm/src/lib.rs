pub mod enumerate;
pub mod error;
pub mod filter;
pub mod format;
pub mod instruction;
pub mod machine;

/// Marks the calling branch as rarely taken (halting, buffer growth).
#[cold]
fn cold() {}
