pub mod extract;
pub mod operation;
