pub mod assembler;
pub mod delta;
pub mod merge;
