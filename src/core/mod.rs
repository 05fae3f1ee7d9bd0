pub mod builder;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod filter;
pub mod normalize;
pub mod notifier;
pub mod registry;
pub mod shape;
pub mod tables;
pub mod write;
