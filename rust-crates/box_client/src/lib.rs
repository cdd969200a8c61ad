pub mod app;
pub mod catalog;
pub mod chain;
pub mod error;
pub mod inventory;
pub mod orchestrator;
pub mod provider;
pub mod reconciler;
pub mod rpc;
pub mod session;
pub mod wallets;

#[cfg(test)]
pub mod test_helpers;
