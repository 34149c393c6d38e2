mod engine;
mod evaluator;

pub use engine::StateEngine;
pub use evaluator::{Evaluation, ValueLookup, evaluate_all};
