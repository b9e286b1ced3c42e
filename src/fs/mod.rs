pub mod flatten;
pub mod path;
pub mod probe;
pub mod tree;
pub mod walker;
