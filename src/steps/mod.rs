//! Step implementations and the name-to-constructor registry.

pub mod languages;
pub mod properties;
pub mod report;
pub mod sonar;

use anyhow::{anyhow, Result};

use crate::config::ScanConfig;
use crate::pipeline::{Step, StepPipeline};

use languages::DetectLanguagesStep;
use properties::SonarPropertiesStep;
use report::LanguageReportCsvStep;
use sonar::SonarScanStep;

/// Registered step names with a one-line description each, in default order.
pub fn available_steps() -> [(&'static str, &'static str); 4] {
    [
        (languages::STEP_NAME, "detect configured file extensions"),
        (report::STEP_NAME, "append the repository to the language CSV report"),
        (properties::STEP_NAME, "generate sonar-project.properties"),
        (sonar::STEP_NAME, "submit the repository to the scanner"),
    ]
}

/// Build the run's pipeline from the configured ordered step-name list,
/// failing fast on an unrecognized name.
pub fn build_pipeline(config: &ScanConfig) -> Result<StepPipeline> {
    let mut steps: Vec<Box<dyn Step>> = Vec::with_capacity(config.steps.len());
    for name in &config.steps {
        let step: Box<dyn Step> = match name.as_str() {
            languages::STEP_NAME => {
                Box::new(DetectLanguagesStep::new(&config.languages.extensions))
            }
            report::STEP_NAME => Box::new(LanguageReportCsvStep::new(
                config.languages.report_csv_path.clone(),
                config.languages.regenerate_report,
            )),
            properties::STEP_NAME => {
                Box::new(SonarPropertiesStep::new(config.sonar.overwrite_properties))
            }
            sonar::STEP_NAME => Box::new(SonarScanStep::from_config(&config.sonar)),
            other => {
                let known = available_steps()
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(anyhow!("unrecognized step '{other}' (available: {known})"));
            }
        };
        steps.push(step);
    }
    Ok(StepPipeline::new(steps))
}
