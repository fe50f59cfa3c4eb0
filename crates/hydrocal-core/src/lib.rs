pub mod config;
pub mod forcing;
pub mod ivp;
pub mod objective;
pub mod parameters;
pub mod timeseries;
pub mod units;

pub mod errors;
