//! Ordered execution of per-repository analysis steps.
//!
//! Every configured step runs unconditionally in order against the shared
//! context. A step reporting `success: false` never stops the pipeline; only
//! a genuine fault (an `Err` from `execute`) aborts the run for the current
//! repository and surfaces as that repository's error.

use anyhow::{Context, Result};

use crate::context::{RunContext, StepResult};

/// One pluggable unit of per-repository work.
pub trait Step {
    fn name(&self) -> &str;

    /// Perform the step against the shared context.
    ///
    /// Expected problems (missing configuration, a failing external tool)
    /// are reported as `Ok` with `success: false`; `Err` is reserved for
    /// faults that invalidate the rest of the pipeline.
    fn execute(&mut self, ctx: &mut RunContext) -> Result<StepResult>;
}

pub struct StepPipeline {
    steps: Vec<Box<dyn Step>>,
}

impl std::fmt::Debug for StepPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepPipeline")
            .field("steps", &self.step_names())
            .finish()
    }
}

impl StepPipeline {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn run(&mut self, ctx: &mut RunContext) -> Result<Vec<StepResult>> {
        let mut results = Vec::with_capacity(self.steps.len());
        for step in &mut self.steps {
            let name = step.name().to_string();
            tracing::debug!(step = %name, repo = %ctx.repository.slug, "running step");
            let mut result = step
                .execute(ctx)
                .with_context(|| format!("step {name} faulted"))?;
            if result.step_name.is_empty() {
                result.step_name = name;
            }
            if !result.success {
                tracing::warn!(
                    step = %result.step_name,
                    repo = %ctx.repository.slug,
                    message = %result.message,
                    "step reported failure"
                );
            }
            results.push(result);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Repository;
    use anyhow::anyhow;
    use std::path::PathBuf;

    fn test_context() -> RunContext {
        RunContext::new(
            "ws",
            Repository {
                name: "Repo".to_string(),
                slug: "repo".to_string(),
                clone_url: "https://example.invalid/repo.git".to_string(),
            },
            PathBuf::from("/tmp/repo"),
        )
    }

    /// Appends its own name to `metadata["order"]`, reporting the configured
    /// success flag.
    struct RecordingStep {
        name: String,
        succeed: bool,
    }

    impl Step for RecordingStep {
        fn name(&self) -> &str {
            &self.name
        }

        fn execute(&mut self, ctx: &mut RunContext) -> Result<StepResult> {
            let order = ctx
                .metadata
                .entry("order".to_string())
                .or_insert_with(|| serde_json::Value::Array(Vec::new()));
            if let Some(items) = order.as_array_mut() {
                items.push(serde_json::Value::String(self.name.clone()));
            }
            Ok(if self.succeed {
                StepResult::ok(&self.name, "done")
            } else {
                StepResult::failed(&self.name, "reported failure")
            })
        }
    }

    struct FaultingStep;

    impl Step for FaultingStep {
        fn name(&self) -> &str {
            "faulting"
        }

        fn execute(&mut self, _ctx: &mut RunContext) -> Result<StepResult> {
            Err(anyhow!("boom"))
        }
    }

    fn recording(name: &str, succeed: bool) -> Box<dyn Step> {
        Box::new(RecordingStep {
            name: name.to_string(),
            succeed,
        })
    }

    #[test]
    fn runs_every_step_in_configured_order() {
        let mut pipeline = StepPipeline::new(vec![
            recording("a", true),
            recording("b", false),
            recording("c", true),
        ]);
        let mut ctx = test_context();
        let results = pipeline.run(&mut ctx).unwrap();

        let names: Vec<&str> = results.iter().map(|r| r.step_name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(
            ctx.metadata["order"],
            serde_json::json!(["a", "b", "c"]),
            "later steps must observe earlier mutations"
        );
    }

    #[test]
    fn reported_failure_does_not_stop_the_pipeline() {
        let mut pipeline = StepPipeline::new(vec![recording("first", false), recording("second", true)]);
        let mut ctx = test_context();
        let results = pipeline.run(&mut ctx).unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
    }

    #[test]
    fn fault_aborts_the_pipeline() {
        let mut pipeline = StepPipeline::new(vec![
            recording("first", true),
            Box::new(FaultingStep),
            recording("after", true),
        ]);
        let mut ctx = test_context();
        let err = pipeline.run(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("faulting"));
        // The step after the fault never ran.
        assert_eq!(ctx.metadata["order"], serde_json::json!(["first"]));
    }
}
