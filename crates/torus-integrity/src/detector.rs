//! Integrity verdicts for reasoning traces.
//!
//! A trace is valid when its connection graph has no independent cycles
//! (`b1 == 0`). An empty trace is valid. A trace that cannot be built into
//! a complex at all is invalid.

use tracing::{debug, warn};

use crate::betti::{analyze, BettiNumbers};
use crate::error::TraceError;
use crate::{ReasoningNode, SimplicialComplex};

/// Detector settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntegrityConfig {
    /// Treat connections to nodes missing from the trace as extra vertices
    /// instead of rejecting the trace.
    pub allow_dangling_references: bool,
}

/// Outcome of validating one trace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub betti: BettiNumbers,
    /// Connections that closed a cycle, one per unit of `b1`
    pub cycle_witnesses: Vec<(String, String)>,
    /// Why the trace could not be analysed, if it could not
    pub error: Option<TraceError>,
}

impl IntegrityReport {
    /// Short human-readable explanation for result notes.
    pub fn summary(&self) -> String {
        if let Some(err) = &self.error {
            return format!("malformed reasoning trace: {err}");
        }
        if self.is_valid {
            return format!("reasoning acyclic ({})", self.betti);
        }
        let closing: Vec<String> = self
            .cycle_witnesses
            .iter()
            .map(|(from, to)| format!("{from}->{to}"))
            .collect();
        format!(
            "circular reasoning: {} cycle(s) closed by {} ({})",
            self.betti.b1,
            closing.join(", "),
            self.betti
        )
    }
}

/// Checks reasoning traces for unresolved cycles.
#[derive(Debug, Clone, Default)]
pub struct IntegrityDetector {
    config: IntegrityConfig,
}

impl IntegrityDetector {
    pub fn new(config: IntegrityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntegrityConfig {
        &self.config
    }

    /// Validate a trace.
    pub fn validate_reasoning(&self, trace: &[ReasoningNode]) -> IntegrityReport {
        if trace.is_empty() {
            debug!("Empty reasoning trace, trivially valid");
            return IntegrityReport {
                is_valid: true,
                ..IntegrityReport::default()
            };
        }

        let complex = match SimplicialComplex::from_trace(trace, self.config.allow_dangling_references) {
            Ok(complex) => complex,
            Err(err) => {
                warn!(error = %err, "Reasoning trace rejected as malformed");
                return IntegrityReport {
                    is_valid: false,
                    error: Some(err),
                    ..IntegrityReport::default()
                };
            }
        };

        let analysis = analyze(complex.simplices());
        let is_valid = analysis.betti.is_acyclic();

        if is_valid {
            debug!(
                betti = %analysis.betti,
                nodes = trace.len(),
                max_dim = complex.max_dim(),
                "Reasoning trace acyclic"
            );
        } else {
            warn!(
                betti = %analysis.betti,
                witnesses = ?analysis.witnesses,
                "Circular reasoning detected"
            );
        }

        IntegrityReport {
            is_valid,
            betti: analysis.betti,
            cycle_witnesses: analysis.witnesses,
            error: None,
        }
    }
}
