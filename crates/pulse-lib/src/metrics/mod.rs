pub mod heart_rate;
pub mod rhythm;
pub mod sqi;
