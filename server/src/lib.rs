pub mod api;
pub mod backload;
pub mod batch;
pub mod claims;
pub mod clock;
pub mod codes;
pub mod config;
pub mod context;
pub mod contributions;
pub mod db;
pub mod gitpoaps;
pub mod jobs;
pub mod metrics;
pub mod ongoing;
pub mod tasks;
pub mod transfers;

#[cfg(test)]
mod tests;
