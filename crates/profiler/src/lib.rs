pub mod aggregator;
pub mod cli;
pub mod features;
pub mod metrics;
pub mod persona_contracts;
pub mod persona_scoring;
pub mod pipeline;
pub mod reference_stats;
pub mod rounding;
pub mod sources;
pub mod wallet_store;

#[cfg(test)]
mod test_support;
