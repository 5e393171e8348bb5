pub mod keys;
pub mod logs;
pub mod migrate;
pub mod send;
