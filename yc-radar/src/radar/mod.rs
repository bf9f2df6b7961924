/*!
Core modules: catalog queries, reconciliation, state and delivery
*/

pub mod catalog;
pub mod config;
pub mod delivery_queue;
pub mod detection_engine;
pub mod entity;
pub mod error;
pub mod notifier;
pub mod retry;
pub mod state_manager;
pub mod tracker;
