pub mod clusters;
pub mod fold;
