use crate::error::ConfigurationError;
use crate::execution::matrix::MatrixExpander;
use crate::execution::template::Placeholder;
use crate::execution::executor::StepPlan;
use crate::workflow::models::Workflow;
use crate::ServiceResult;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Parser for matrix workflow YAML files.
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow from a file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ServiceResult<Workflow> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "read workflow file");
        Self::parse(&content)
    }

    /// Parse a workflow from a YAML string.
    pub fn parse(content: &str) -> ServiceResult<Workflow> {
        let workflow: Workflow = serde_yaml::from_str(content)?;
        Ok(workflow)
    }

    /// Parse and validate a workflow from a YAML string.
    pub fn parse_and_validate(content: &str) -> ServiceResult<Workflow> {
        let workflow = Self::parse(content)?;
        Self::validate(&workflow)?;
        Ok(workflow)
    }

    /// Validate a parsed workflow for structural correctness.
    ///
    /// Everything that could make a job ill-defined is rejected here, so a
    /// validated workflow expands and resolves without further errors.
    pub fn validate(workflow: &Workflow) -> Result<(), ConfigurationError> {
        let axes = workflow.axes()?;
        MatrixExpander::validate(&axes, workflow.toolchain.as_ref())?;

        if workflow.steps.is_empty() {
            return Err(ConfigurationError::NoSteps);
        }

        // Step names identify the failing step in a job result
        let mut names = HashSet::new();
        for (index, step) in workflow.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(ConfigurationError::UnnamedStep { index });
            }
            if !names.insert(step.name.as_str()) {
                return Err(ConfigurationError::DuplicateStepName {
                    name: step.name.clone(),
                });
            }
        }

        // Gates may only reference declared axes and values
        for step in &workflow.steps {
            let Some(gate) = &step.when else { continue };
            for (axis_name, value) in &gate.matrix {
                let axis = axes.iter().find(|a| &a.name == axis_name).ok_or_else(|| {
                    ConfigurationError::UnknownGateAxis {
                        step: step.name.clone(),
                        axis: axis_name.clone(),
                    }
                })?;
                if !axis.values.contains(value) {
                    return Err(ConfigurationError::UnknownGateValue {
                        step: step.name.clone(),
                        axis: axis_name.clone(),
                        value: value.clone(),
                    });
                }
            }
        }

        // Templates may only substitute declared axes
        let plan = StepPlan::compile(&workflow.steps)?;
        for compiled in plan.steps() {
            for placeholder in compiled.template.placeholders() {
                if let Placeholder::Matrix(axis) = placeholder {
                    if !axes.iter().any(|a| &a.name == axis) {
                        return Err(ConfigurationError::UnknownPlaceholder {
                            step: compiled.step.name.clone(),
                            placeholder: format!("matrix.{}", axis),
                        });
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;

    use std::io::Write;

    fn validate(yaml: &str) -> Result<(), ConfigurationError> {
        WorkflowParser::validate(&WorkflowParser::parse(yaml).unwrap())
    }

    #[test]
    fn test_parse_minimal_workflow() {
        let yaml = r#"
matrix:
  backend: [openssl]
steps:
  - name: Build
    run: cargo build
"#;
        let workflow = WorkflowParser::parse_and_validate(yaml).unwrap();
        assert!(workflow.name.is_none());
        assert_eq!(workflow.steps.len(), 1);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "name: CI\nmatrix:\n  backend: [openssl, mbedtls]\nsteps:\n  - name: Build\n    run: cargo build"
        )
        .unwrap();

        let workflow = WorkflowParser::from_file(file.path()).unwrap();
        assert_eq!(workflow.display_name(), "CI");
        assert_eq!(workflow.axes().unwrap()[0].values.len(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = WorkflowParser::from_file("/no/such/workflow.yml");
        assert!(matches!(result, Err(ServiceError::Io(_))));
    }

    #[test]
    fn test_invalid_yaml_is_yaml_error() {
        let result = WorkflowParser::parse("steps: [name: Build");
        assert!(matches!(result, Err(ServiceError::Yaml(_))));
    }

    #[test]
    fn test_validate_no_axes() {
        let result = validate("steps:\n  - name: Build\n    run: cargo build\n");
        assert_eq!(result, Err(ConfigurationError::NoAxes));
    }

    #[test]
    fn test_validate_empty_axis() {
        let yaml = r#"
matrix:
  backend: [openssl]
  features: []
steps:
  - name: Build
    run: cargo build
"#;
        assert_eq!(
            validate(yaml),
            Err(ConfigurationError::EmptyAxis {
                axis: "features".to_string()
            })
        );
    }

    #[test]
    fn test_validate_no_steps() {
        assert_eq!(
            validate("matrix:\n  backend: [openssl]\n"),
            Err(ConfigurationError::NoSteps)
        );
    }

    #[test]
    fn test_validate_duplicate_step_name() {
        let yaml = r#"
matrix:
  backend: [openssl]
steps:
  - name: Build
    run: cargo build
  - name: Build
    run: cargo build --release
"#;
        assert_eq!(
            validate(yaml),
            Err(ConfigurationError::DuplicateStepName {
                name: "Build".to_string()
            })
        );
    }

    #[test]
    fn test_validate_unnamed_step() {
        let yaml = r#"
matrix:
  backend: [openssl]
steps:
  - name: " "
    run: cargo build
"#;
        assert_eq!(
            validate(yaml),
            Err(ConfigurationError::UnnamedStep { index: 0 })
        );
    }

    #[test]
    fn test_validate_gate_on_unknown_axis() {
        let yaml = r#"
matrix:
  backend: [openssl]
steps:
  - name: Test
    when: { matrix: { features: os } }
    run: cargo test
"#;
        assert_eq!(
            validate(yaml),
            Err(ConfigurationError::UnknownGateAxis {
                step: "Test".to_string(),
                axis: "features".to_string()
            })
        );
    }

    #[test]
    fn test_validate_gate_on_undeclared_value() {
        let yaml = r#"
matrix:
  features: ["", alloc]
steps:
  - name: Test
    when: { matrix: { features: os } }
    run: cargo test
"#;
        assert_eq!(
            validate(yaml),
            Err(ConfigurationError::UnknownGateValue {
                step: "Test".to_string(),
                axis: "features".to_string(),
                value: "os".to_string()
            })
        );
    }

    #[test]
    fn test_validate_template_on_unknown_axis() {
        let yaml = r#"
matrix:
  backend: [openssl]
steps:
  - name: Build
    run: cargo build --target ${{ matrix.target }}
"#;
        assert_eq!(
            validate(yaml),
            Err(ConfigurationError::UnknownPlaceholder {
                step: "Build".to_string(),
                placeholder: "matrix.target".to_string()
            })
        );
    }

    #[test]
    fn test_validate_toolchain_axis_missing() {
        let yaml = r#"
toolchain: {}
matrix:
  backend: [openssl]
steps:
  - name: Build
    run: cargo build
"#;
        assert_eq!(
            validate(yaml),
            Err(ConfigurationError::UnknownToolchainAxis {
                axis: "toolchain".to_string()
            })
        );
    }

    #[test]
    fn test_parse_and_validate_reference_workflow() {
        let yaml = r#"
name: CI

env:
  CARGO_TERM_COLOR: always

toolchain:
  axis: toolchain
  pinned: nightly
  version: nightly-2024-05-01

matrix:
  backend: [rustcrypto, mbedtls, openssl]
  features: ["", alloc, os]
  toolchain: [stable, nightly]

steps:
  - name: Install toolchain
    when: { toolchain: pinned }
    run: rustup toolchain install ${{ toolchain }} --component rustfmt,clippy
  - name: Format
    run: cargo +${{ toolchain }} fmt --all -- --check
  - name: Clippy
    run: cargo +${{ toolchain }} clippy --no-default-features --features ${{ matrix.backend }},${{ matrix.features }} -- -D warnings
  - name: Build
    run: cargo +${{ toolchain }} build --no-default-features --features ${{ matrix.backend }},${{ matrix.features }}
  - name: Test
    when:
      matrix: { features: os }
    run: cargo +${{ toolchain }} test --no-default-features --features ${{ matrix.backend }},${{ matrix.features }}
"#;
        let workflow = WorkflowParser::parse_and_validate(yaml).unwrap();
        assert_eq!(workflow.steps.len(), 5);
        assert_eq!(workflow.axes().unwrap().len(), 3);
    }
}
