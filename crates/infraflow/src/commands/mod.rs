pub mod state;
pub mod status;
pub mod validate;
