pub mod context;
pub mod descriptor;
pub mod envelope;
