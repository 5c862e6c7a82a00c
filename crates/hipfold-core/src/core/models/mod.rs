pub mod cluster;
pub mod points;
pub mod segment;
