pub mod filesystem;
mod register;

pub use register::BackendConfigs;
