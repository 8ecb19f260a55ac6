//! Core data structures shared across the automation layers.
//!
//! These strongly-typed models provide a common vocabulary for DOM
//! snapshots, element addressing, and the adapter/client boundary.

pub mod adapter;
pub mod dom;

pub use adapter::{
    ConnectionStatus, ConversationSnapshot, ConversationTurn, DetectionMethod, ResponseWait,
    SelectorSet, SendResult,
};
pub use dom::{DocNode, ElementHandle, ElementState, PageInfo, QueryItem, QueryResult};
