//! Scripted simulation of a flaky action behind a circuit breaker.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use fusebox::{BreakerError, CircuitBreaker, CircuitState};

/// Errors from parsing a call pattern.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,

    #[error("unexpected '{found}' at position {position}, expected 's' or 'f'")]
    InvalidStep { found: char, position: usize },
}

/// Outcome the scripted action produces on each call.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    steps: Vec<bool>,
}

impl Pattern {
    pub fn len(&self) -> usize {
        self.steps.len()
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let steps = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .enumerate()
            .map(|(position, c)| match c.to_ascii_lowercase() {
                's' => Ok(true),
                'f' => Ok(false),
                found => Err(PatternError::InvalidStep { found, position }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if steps.is_empty() {
            return Err(PatternError::Empty);
        }
        Ok(Self { steps })
    }
}

/// Error the scripted action fails with.
#[derive(Error, Debug)]
#[error("scripted failure on call {0}")]
pub struct ScriptedFailure(usize);

/// What the breaker did with one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    ProbeFailed,
    Rejected,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::ProbeFailed => "probe failed",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A single call in the report.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub call: usize,
    pub elapsed_ms: u64,
    pub before: CircuitState,
    pub outcome: Outcome,
    pub after: CircuitState,
    pub action_ran: bool,
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub calls: Vec<CallRecord>,
    pub action_invocations: usize,
    pub rejected: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {:>8}  {:<9}  {:<12}  {:<9}",
            "call", "t(ms)", "before", "outcome", "after"
        )?;
        for record in &self.calls {
            writeln!(
                f,
                "{:>4}  {:>8}  {:<9}  {:<12}  {:<9}",
                record.call,
                record.elapsed_ms,
                record.before.to_string(),
                record.outcome.to_string(),
                record.after.to_string()
            )?;
        }
        writeln!(
            f,
            "\n{} calls, {} ran the action, {} rejected",
            self.calls.len(),
            self.action_invocations,
            self.rejected
        )
    }
}

/// Plays a pattern through a breaker, one call per interval.
pub struct Simulation {
    breaker: CircuitBreaker,
    pattern: Pattern,
    interval: Duration,
}

impl Simulation {
    pub fn new(breaker: CircuitBreaker, pattern: Pattern, interval: Duration) -> Self {
        Self {
            breaker,
            pattern,
            interval,
        }
    }

    pub async fn run(self) -> Report {
        let started = Instant::now();
        let mut calls = Vec::with_capacity(self.pattern.len());

        for (index, succeeds) in self.pattern.steps.iter().copied().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.interval).await;
            }

            let call = index + 1;
            let before = self.breaker.state();
            let mut action_ran = false;

            let result = self
                .breaker
                .guard(|| {
                    action_ran = true;
                    async move {
                        if succeeds {
                            Ok(call)
                        } else {
                            Err(ScriptedFailure(call))
                        }
                    }
                })
                .await;

            let outcome = match result {
                Ok(_) => Outcome::Succeeded,
                Err(BreakerError::Action(e)) => {
                    tracing::debug!(error = %e, "Action failed");
                    Outcome::Failed
                }
                Err(BreakerError::HalfOpen { source, .. }) => {
                    tracing::debug!(error = %source, "Recovery probe failed");
                    Outcome::ProbeFailed
                }
                Err(BreakerError::Open { .. }) => Outcome::Rejected,
            };

            calls.push(CallRecord {
                call,
                elapsed_ms: started.elapsed().as_millis() as u64,
                before,
                outcome,
                after: self.breaker.state(),
                action_ran,
            });
        }

        Report {
            action_invocations: calls.iter().filter(|c| c.action_ran).count(),
            rejected: calls
                .iter()
                .filter(|c| c.outcome == Outcome::Rejected)
                .count(),
            calls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(cooldown: Duration) -> CircuitBreaker {
        CircuitBreaker::builder()
            .failure_threshold(3)
            .half_open_trial_limit(2)
            .cooldown(cooldown)
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_pattern() {
        let pattern: Pattern = "ff s F".parse().unwrap();
        assert_eq!(pattern.steps, vec![false, false, true, false]);
        assert_eq!(pattern.len(), 4);
    }

    #[test]
    fn test_parse_pattern_errors() {
        assert_eq!("".parse::<Pattern>(), Err(PatternError::Empty));
        assert_eq!(
            "ffx".parse::<Pattern>(),
            Err(PatternError::InvalidStep {
                found: 'x',
                position: 2
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_while_open() {
        let pattern: Pattern = "fffff".parse().unwrap();
        let report = Simulation::new(breaker(Duration::from_secs(10)), pattern, Duration::from_millis(100))
            .run()
            .await;

        let outcomes: Vec<_> = report.calls.iter().map(|c| c.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Failed,
                Outcome::Failed,
                Outcome::Failed,
                Outcome::Rejected,
                Outcome::Rejected,
            ]
        );
        assert_eq!(report.calls[2].after, CircuitState::Open);
        assert_eq!(report.action_invocations, 3);
        assert_eq!(report.rejected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_cooldown() {
        // Three failures open the circuit, the 4th call lands after the cooldown
        let pattern: Pattern = "fffsf".parse().unwrap();
        let report = Simulation::new(breaker(Duration::from_millis(250)), pattern, Duration::from_millis(300))
            .run()
            .await;

        let probe = &report.calls[3];
        assert_eq!(probe.before, CircuitState::HalfOpen);
        assert_eq!(probe.outcome, Outcome::Succeeded);
        assert_eq!(probe.after, CircuitState::Closed);

        assert_eq!(report.calls[4].outcome, Outcome::Failed);
        assert_eq!(report.rejected, 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["calls"][3]["before"], "half_open");
    }
}
