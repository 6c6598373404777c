//! Numeric parameter ranges, enforced when the value is entered.

use tracing::debug;

use crate::config::RangePolicy;
use crate::document::*;
use crate::error::EditError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
}

impl Bound {
    const fn new(field: &'static str, min: f64, max: f64) -> Self {
        Bound { field, min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn enforce(&self, value: f64, policy: RangePolicy) -> Result<f64, EditError> {
        if self.contains(value) {
            return Ok(value);
        }
        match policy {
            RangePolicy::Reject => Err(EditError::OutOfRange {
                field: self.field.to_string(),
                value,
                min: self.min,
                max: self.max,
            }),
            RangePolicy::Clamp => {
                let clamped = value.clamp(self.min, self.max);
                debug!(field = self.field, value, clamped, "clamped out-of-range parameter");
                Ok(clamped)
            }
        }
    }
}

pub const BATCH_SIZE: Bound = Bound::new("batch_size", 1.0, 200.0);
pub const CONCURRENT_SIZE: Bound = Bound::new("concurrent_size", 1.0, 10.0);
pub const COUNT_LIMIT: Bound = Bound::new("count_limit", 1.0, 500.0);
pub const MAX_RETRIES: Bound = Bound::new("max_retries", 1.0, 10.0);
pub const RETRY_INTERVAL: Bound = Bound::new("retry_interval", 100.0, 5000.0);
pub const TOP_K: Bound = Bound::new("top_k", 1.0, 20.0);
pub const SIMILARITY_THRESHOLD: Bound = Bound::new("similarity_threshold", 0.01, 1.0);
pub const MEMORY_ROUND: Bound = Bound::new("round", 1.0, 50.0);
pub const HISTORY_MAX_ROUND: Bound = Bound::new("history_max_round", 1.0, 50.0);

fn enforce_u32(bound: Bound, value: &mut u32, policy: RangePolicy) -> Result<(), EditError> {
    *value = bound.enforce(f64::from(*value), policy)? as u32;
    Ok(())
}

fn enforce_f64(bound: Bound, value: &mut f64, policy: RangePolicy) -> Result<(), EditError> {
    *value = bound.enforce(*value, policy)?;
    Ok(())
}

fn enforce_memory(memory: &mut ShortMemoryConfig, policy: RangePolicy) -> Result<(), EditError> {
    if memory.enabled {
        enforce_u32(MEMORY_ROUND, &mut memory.round, policy)?;
    }
    Ok(())
}

/// Clamp or reject every bounded parameter of `node`. Under
/// `RangePolicy::Reject` the node is left untouched when an error is returned.
pub fn apply_bounds(node: &mut WorkflowNode, policy: RangePolicy) -> Result<(), EditError> {
    if let Some(retry) = node.retry_mut() {
        if retry.retry_enabled {
            enforce_u32(MAX_RETRIES, &mut retry.max_retries, policy)?;
            enforce_u32(RETRY_INTERVAL, &mut retry.retry_interval, policy)?;
        }
    }

    match node {
        WorkflowNode::Parallel(n) => {
            let p = &mut n.data.node_param;
            enforce_u32(BATCH_SIZE, &mut p.batch_size, policy)?;
            enforce_u32(CONCURRENT_SIZE, &mut p.concurrent_size, policy)?;
        }
        WorkflowNode::Iterator(n) => {
            let p = &mut n.data.node_param;
            if p.iterator_type == IteratorType::ByCount {
                enforce_u32(COUNT_LIMIT, &mut p.count_limit, policy)?;
            }
        }
        WorkflowNode::Retrieval(n) => {
            let p = &mut n.data.node_param;
            enforce_u32(TOP_K, &mut p.top_k, policy)?;
            enforce_f64(SIMILARITY_THRESHOLD, &mut p.similarity_threshold, policy)?;
        }
        WorkflowNode::Llm(n) => enforce_memory(&mut n.data.node_param.short_memory, policy)?,
        WorkflowNode::ParameterExtractor(n) => {
            enforce_memory(&mut n.data.node_param.short_memory, policy)?
        }
        _ => {}
    }
    Ok(())
}

/// Bounded parameters of `node` whose current value lies outside their
/// range. Covers the same fields `apply_bounds` enforces.
pub fn out_of_range(node: &WorkflowNode) -> Vec<(Bound, f64)> {
    let mut values: Vec<(Bound, f64)> = Vec::new();
    if let Some(retry) = node.retry() {
        if retry.retry_enabled {
            values.push((MAX_RETRIES, f64::from(retry.max_retries)));
            values.push((RETRY_INTERVAL, f64::from(retry.retry_interval)));
        }
    }
    let memory = |m: &ShortMemoryConfig| m.enabled.then(|| (MEMORY_ROUND, f64::from(m.round)));
    match node {
        WorkflowNode::Parallel(n) => {
            let p = &n.data.node_param;
            values.push((BATCH_SIZE, f64::from(p.batch_size)));
            values.push((CONCURRENT_SIZE, f64::from(p.concurrent_size)));
        }
        WorkflowNode::Iterator(n) => {
            let p = &n.data.node_param;
            if p.iterator_type == IteratorType::ByCount {
                values.push((COUNT_LIMIT, f64::from(p.count_limit)));
            }
        }
        WorkflowNode::Retrieval(n) => {
            let p = &n.data.node_param;
            values.push((TOP_K, f64::from(p.top_k)));
            values.push((SIMILARITY_THRESHOLD, p.similarity_threshold));
        }
        WorkflowNode::Llm(n) => values.extend(memory(&n.data.node_param.short_memory)),
        WorkflowNode::ParameterExtractor(n) => values.extend(memory(&n.data.node_param.short_memory)),
        _ => {}
    }
    values.retain(|(bound, value)| !bound.contains(*value));
    values
}

pub fn apply_history_bounds(history: &mut HistoryConfig, policy: RangePolicy) -> Result<(), EditError> {
    let mut round = history.history_max_round;
    enforce_u32(HISTORY_MAX_ROUND, &mut round, policy)?;
    history.history_max_round = round;
    Ok(())
}
