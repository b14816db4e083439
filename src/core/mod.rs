// Core dispatch engine: scheduling, retries, cooldown and local fallback

pub mod executor;
pub mod scheduler;


pub use executor::*;
pub use scheduler::*;
