pub mod check;
pub mod measurement;
pub mod monitor;
