pub mod serve;
pub mod tree;
pub mod version;
