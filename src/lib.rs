// Corvid - Adaptive multi-model router for local coding LLMs
// Library exports

// Core modules
pub mod adaptation;
pub mod backends;
pub mod config;
pub mod director;
pub mod invoker;
pub mod patterns;
pub mod routing;
pub mod tracker;
