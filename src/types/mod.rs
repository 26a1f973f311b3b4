//! 类型模块：定义商品记录、搜索选项等核心数据类型。
//!
//! # Types Module
//!
//! Core data types shared by every layer of the search-cost optimizer.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ProductRecord`] | One product as returned by the upstream or the local catalog |
//! | [`SearchOptions`] | Caller options for category and brand searches |
//! | [`SharedResults`] | Reference-counted, order-preserving result set |

pub mod product;

pub use product::{ProductRecord, SearchOptions, SharedResults};
