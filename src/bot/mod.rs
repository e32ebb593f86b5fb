//! Point bot: applies interpreted GroupMe events to the point ledger.

pub mod engine;
pub mod ledger;

#[cfg(test)]
mod tests;

pub use engine::PointBot;
pub use ledger::Ledger;
