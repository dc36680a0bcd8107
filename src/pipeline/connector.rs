// In: src/pipeline/connector.rs

//! Wires adjacent stages into a linear pipeline.
//!
//! Each link is a single-producer, single-consumer `crossbeam-channel` queue.
//! Links are created once, after every stage has been built and before any of
//! them is spawned; they are never re-wired.

use crossbeam_channel::{bounded, unbounded};

use crate::error::MeterlineError;
use crate::pipeline::{BuiltStage, Inlet, Outlet};

#[derive(Debug, Clone, Copy, Default)]
pub struct Connector {
    capacity: Option<usize>,
}

impl Connector {
    /// `capacity = None` creates unbounded links.
    pub fn new(capacity: Option<usize>) -> Self {
        Self { capacity }
    }

    fn open_link(&self) -> (Outlet, Inlet) {
        match self.capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        }
    }

    /// Connects `upstream`'s output to `downstream`'s input.
    pub fn connect(
        &self,
        upstream: &mut BuiltStage,
        downstream: &mut BuiltStage,
    ) -> Result<(), MeterlineError> {
        let (outlet, inlet) = self.open_link();
        let (from, to) = (upstream.name, downstream.name);
        let refused = |side: &str, stage: &str, reason: String| MeterlineError::Connection {
            from: from.to_string(),
            to: to.to_string(),
            reason: format!("'{}' {}: {}", stage, side, reason),
        };

        if let Err(err) = upstream.stage.connect_output(outlet) {
            return Err(refused("output", upstream.name, err.to_string()));
        }
        if let Err(err) = downstream.stage.connect_input(inlet) {
            return Err(refused("input", downstream.name, err.to_string()));
        }

        log::debug!(
            "Connected components {} ('{}') and {} ('{}')",
            upstream.index,
            upstream.name,
            downstream.index,
            downstream.name
        );
        Ok(())
    }

    /// Connects every stage `i` to stage `i + 1`. Returns the number of links.
    /// A chain of zero or one stages needs no links.
    pub fn connect_chain(&self, stages: &mut [BuiltStage]) -> Result<usize, MeterlineError> {
        if stages.len() < 2 {
            return Ok(0);
        }
        for i in 0..stages.len() - 1 {
            let (head, tail) = stages.split_at_mut(i + 1);
            self.connect(&mut head[i], &mut tail[0])?;
        }
        Ok(stages.len() - 1)
    }
}
