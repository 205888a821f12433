//! Deterministic generator for tests/dev.
//!
//! Outcomes are scripted per system instruction. Each call consumes the next
//! step; once a script runs out, its last step repeats. Instructions without a
//! script get the default step (an immediate canned reply).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::generator::{GenerationRequest, TextGenerator};

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub outcome: Result<String, GenerationError>,
    pub delay: Duration,
}

impl ScriptStep {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            outcome: Ok(text.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn fail(error: GenerationError) -> Self {
        Self {
            outcome: Err(error),
            delay: Duration::ZERO,
        }
    }

    /// Simulated call latency before the outcome is returned.
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug)]
struct Script {
    steps: VecDeque<ScriptStep>,
    last: Option<ScriptStep>,
}

/// Scripted `TextGenerator` with call counting and concurrency tracking.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<String, Script>>,
    default_delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latency applied to the default reply for unscripted instructions.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Script the outcomes for calls carrying `system_instruction`.
    pub fn with_script(self, system_instruction: impl Into<String>, steps: Vec<ScriptStep>) -> Self {
        lock(&self.scripts).insert(
            system_instruction.into(),
            Script {
                steps: steps.into(),
                last: None,
            },
        );
        self
    }

    /// Number of calls received for one instruction.
    pub fn calls_for(&self, system_instruction: &str) -> usize {
        lock(&self.calls).get(system_instruction).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }

    /// Calls currently inside `generate`.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_step(&self, system_instruction: &str) -> ScriptStep {
        let mut scripts = lock(&self.scripts);
        match scripts.get_mut(system_instruction) {
            Some(script) => match script.steps.pop_front() {
                Some(step) => {
                    script.last = Some(step.clone());
                    step
                }
                None => script
                    .last
                    .clone()
                    .unwrap_or_else(|| self.default_step(system_instruction)),
            },
            None => self.default_step(system_instruction),
        }
    }

    fn default_step(&self, system_instruction: &str) -> ScriptStep {
        ScriptStep::reply(format!("feedback for: {system_instruction}")).after(self.default_delay)
    }
}

/// Decrements the live-call counter even when the call future is dropped
/// (timeout or cancellation).
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest<'_>) -> Result<String, GenerationError> {
        *lock(&self.calls)
            .entry(request.system_instruction.to_string())
            .or_insert(0) += 1;

        let step = self.next_step(request.system_instruction);

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }
        step.outcome
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
