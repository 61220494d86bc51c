pub mod session;
pub mod software;
