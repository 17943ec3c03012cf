pub mod clusters;
pub mod utils;
pub mod workloads;
