pub mod market;
pub mod snapshot;
pub mod status;
