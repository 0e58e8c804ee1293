// Service Errors
// Error taxonomy for workflow loading, validation and matrix runs

use thiserror::Error;

/// Result alias used across the service crate
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Top-level error for the matrix service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The workflow declaration is structurally invalid
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The workflow file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The workflow file is not valid YAML for the declaration schema
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A job task panicked or was aborted
    #[error("job task failed: {0}")]
    JobTask(String),
}

/// A declaration problem detected before any job runs.
///
/// These are fatal: a run with a configuration error has no well-defined jobs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("no matrix axes declared")]
    NoAxes,

    #[error("matrix axis '{axis}' has no values")]
    EmptyAxis { axis: String },

    #[error("matrix axis '{axis}' has a non-scalar value")]
    NonScalarAxisValue { axis: String },

    #[error("matrix axis '{axis}' declares value '{value}' more than once")]
    DuplicateAxisValue { axis: String, value: String },

    #[error("matrix has more combinations than can be addressed")]
    MatrixTooLarge,

    #[error("no steps declared")]
    NoSteps,

    #[error("step {index} has an empty name")]
    UnnamedStep { index: usize },

    #[error("step name '{name}' is declared more than once")]
    DuplicateStepName { name: String },

    #[error("step '{step}' is gated on unknown matrix axis '{axis}'")]
    UnknownGateAxis { step: String, axis: String },

    #[error("step '{step}' is gated on '{axis}={value}', which is not a declared value")]
    UnknownGateValue {
        step: String,
        axis: String,
        value: String,
    },

    #[error("toolchain axis '{axis}' is not a declared matrix axis")]
    UnknownToolchainAxis { axis: String },

    #[error("pinned toolchain value '{value}' is not a value of axis '{axis}'")]
    UnknownPinnedValue { axis: String, value: String },

    #[error("step '{step}' references unknown placeholder '${{{{ {placeholder} }}}}'")]
    UnknownPlaceholder { step: String, placeholder: String },

    #[error("step '{step}' has an unterminated '${{{{' placeholder")]
    UnterminatedPlaceholder { step: String },
}

impl ConfigurationError {
    /// Name of the step the error is attached to, if any
    pub fn step(&self) -> Option<&str> {
        match self {
            ConfigurationError::UnknownGateAxis { step, .. }
            | ConfigurationError::UnknownGateValue { step, .. }
            | ConfigurationError::UnknownPlaceholder { step, .. }
            | ConfigurationError::UnterminatedPlaceholder { step } => Some(step),
            ConfigurationError::DuplicateStepName { name } => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_messages() {
        let err = ConfigurationError::EmptyAxis {
            axis: "backend".to_string(),
        };
        assert_eq!(err.to_string(), "matrix axis 'backend' has no values");

        let err = ConfigurationError::UnknownPlaceholder {
            step: "Build".to_string(),
            placeholder: "matrix.os".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "step 'Build' references unknown placeholder '${{ matrix.os }}'"
        );
    }

    #[test]
    fn test_service_error_wraps_configuration() {
        let err: ServiceError = ConfigurationError::NoAxes.into();
        assert!(matches!(err, ServiceError::Configuration(ConfigurationError::NoAxes)));
        assert_eq!(err.to_string(), "configuration error: no matrix axes declared");
    }

    #[test]
    fn test_step_accessor() {
        let err = ConfigurationError::UnknownGateAxis {
            step: "Test".to_string(),
            axis: "os".to_string(),
        };
        assert_eq!(err.step(), Some("Test"));
        assert_eq!(ConfigurationError::NoSteps.step(), None);
    }
}
