// Command Templates
// Substitutes job values into `${{ ... }}` placeholders

use crate::config::RunnerConfig;
use crate::execution::gate::resolve_toolchain_label;
use crate::execution::matrix::JobConfig;

use indexmap::IndexMap;

/// A substitution point inside a command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
    /// `${{ matrix.<axis> }}`
    Matrix(String),
    /// `${{ toolchain }}`
    Toolchain,
    /// `${{ env.<NAME> }}`
    Env(String),
    /// `${{ secrets.token }}`
    Token,
}

impl Placeholder {
    fn parse(expr: &str) -> Option<Self> {
        match expr {
            "toolchain" => Some(Placeholder::Toolchain),
            "secrets.token" => Some(Placeholder::Token),
            _ => {
                if let Some(axis) = expr.strip_prefix("matrix.") {
                    (!axis.is_empty()).then(|| Placeholder::Matrix(axis.to_string()))
                } else if let Some(name) = expr.strip_prefix("env.") {
                    (!name.is_empty()).then(|| Placeholder::Env(name.to_string()))
                } else {
                    None
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// Why a template could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The expression between `${{` and `}}` is not a known placeholder
    Unknown(String),
    /// A `${{` without a closing `}}`
    Unterminated,
}

/// A parsed command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    segments: Vec<Segment>,
}

impl CommandTemplate {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("${{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }

            let after = &rest[start + 3..];
            let end = after.find("}}").ok_or(TemplateError::Unterminated)?;
            let expr = after[..end].trim();
            let placeholder =
                Placeholder::parse(expr).ok_or_else(|| TemplateError::Unknown(expr.to_string()))?;
            segments.push(Segment::Placeholder(placeholder));

            rest = &after[end + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Placeholders in order of appearance
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    /// The command to execute for `job`.
    ///
    /// Pure: the same job, configuration and step environment always give the
    /// same string. `${{ env.X }}` looks in `step_env` first, then in the
    /// workflow environment, matching the step process environment. Unset
    /// names and a missing token resolve to "".
    pub fn resolve(
        &self,
        job: &JobConfig,
        config: &RunnerConfig,
        step_env: &IndexMap<String, String>,
    ) -> String {
        self.render(job, config, step_env, false)
    }

    /// Like [`resolve`](Self::resolve), with the access token replaced by `***`
    pub fn display(
        &self,
        job: &JobConfig,
        config: &RunnerConfig,
        step_env: &IndexMap<String, String>,
    ) -> String {
        self.render(job, config, step_env, true)
    }

    fn render(
        &self,
        job: &JobConfig,
        config: &RunnerConfig,
        step_env: &IndexMap<String, String>,
        mask: bool,
    ) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(Placeholder::Matrix(axis)) => {
                    out.push_str(job.value(axis).unwrap_or_default())
                }
                Segment::Placeholder(Placeholder::Toolchain) => {
                    out.push_str(resolve_toolchain_label(job, config))
                }
                Segment::Placeholder(Placeholder::Env(name)) => {
                    let value = step_env.get(name).or_else(|| config.env.get(name));
                    out.push_str(value.map(String::as_str).unwrap_or_default())
                }
                Segment::Placeholder(Placeholder::Token) => match &config.access_token {
                    Some(_) if mask => out.push_str("***"),
                    Some(token) => out.push_str(token),
                    None => {}
                },
            }
        }

        if mask {
            config.mask_secrets(&out)
        } else {
            out
        }
    }
}
