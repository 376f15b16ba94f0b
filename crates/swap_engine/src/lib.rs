//! Response-outcome resolution and swap execution.
//!
//! A completed exchange is classified ([`outcome`]), resolved to a target and
//! swap directive ([`resolve`]), split into main and out-of-band content
//! ([`oob`]) and applied through the swap/settle pipeline ([`engine`]).

pub mod config;
pub mod engine;
pub mod events;
pub mod oob;
pub mod outcome;
pub mod resolve;
pub mod scheduler;
pub mod selector;
pub mod settle;
pub mod strategy;
pub mod swap_spec;

pub use config::SwapConfig;
pub use engine::{Exchange, PipelineState, ResponseDisposition, SwapEngine, SwapOptions};
pub use events::SwapEvent;
pub use outcome::{CodePattern, ResolvedOutcome, ResponseRule, classify};
pub use resolve::{Override, TriggerAttributes};
pub use strategy::{InsertionStrategy, StrategyRegistry, SwapContent, SwapContext};
pub use swap_spec::{SwapSpecification, parse_swap_spec};
