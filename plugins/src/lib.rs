pub mod factory;
pub mod gateway;
