pub mod cluster;
pub mod persistence;
pub mod transition;
