//! 客户端模块：把各组件装配成一个对调用方“永不失败”的搜索入口。
//!
//! # Search Client
//!
//! [`SearchClientBuilder`] wires every service from an
//! [`OptimizerConfig`](crate::config::OptimizerConfig) plus the injected
//! collaborators (upstream, local catalog, key-value store, shared cache
//! tier). [`SearchClient`] is the caller-facing surface; implementation
//! details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod signals;

pub use builder::SearchClientBuilder;
pub use self::core::{SearchClient, WarmReport};
pub use signals::SearchSignals;
