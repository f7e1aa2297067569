pub mod config;
pub mod error;
pub mod frame;
pub mod sample_spec;
pub mod state;
