//! Pipeline document configuration from YAML
//!
//! A document is a YAML stream of one or more resources separated by `---`.
//! Resources with `kind: pipeline` are parsed into [`PipelineConfig`]; any
//! other resource is kept verbatim so the document re-emits unchanged.

use crate::core::{
    build::Build, condition::Conditions, context::BuildContext, literal::keep_literal_text,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Events a trigger or `when` filter may name
pub const KNOWN_EVENTS: &[&str] = &[
    "push",
    "pull_request",
    "tag",
    "promote",
    "rollback",
    "cron",
    "custom",
];

/// Statuses a `status` filter may name
pub const KNOWN_STATUSES: &[&str] = &["success", "failure"];

/// A parsed pipeline document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentConfig {
    /// Resources in document order
    pub resources: Vec<Resource>,
}

/// One YAML document of the stream
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Pipeline(PipelineConfig),
    /// Any non-pipeline resource (`kind: secret`, `kind: signature`, ...)
    Other(Value),
}

/// Pipeline definition (`kind: pipeline`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub kind: String,

    /// Runner type, e.g. `docker`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub pipeline_type: Option<String>,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone: Option<Value>,

    /// Steps, run in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepConfig>,

    /// Containers started before the first step and removed after the last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeConfig>,

    /// Pipelines that must finish before this one is considered
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub trigger: Conditions,

    /// Keys this runner does not interpret, kept for re-emission
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    pub name: String,

    /// Container image reference
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    /// Image pull policy (`always`, `never`, `if-not-exists`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<String>,

    /// Shell commands, run in order in one shell
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, EnvValue>,

    /// Plugin settings, passed as `PLUGIN_*` variables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<BTreeMap<String, SettingValue>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,

    #[serde(default, skip_serializing_if = "Conditions::is_empty")]
    pub when: Conditions,

    /// `ignore` keeps a failing step from failing the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Service container configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, EnvValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commands: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeMount>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Top-level volume declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostVolume>,

    /// Scratch volume living as long as the pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostVolume {
    pub path: String,
}

/// A volume mounted into a step or service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Name of a top-level volume
    pub name: String,

    /// Mount path inside the container
    pub path: String,
}

/// Reference to a value held by the secret store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecretRef {
    pub from_secret: String,
}

/// Environment variable value: a literal or a secret reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Secret(SecretRef),
    Bool(bool),
    Number(serde_yaml::Number),
    Text(String),
}

impl EnvValue {
    /// The literal value, or `None` for a secret reference
    pub fn literal(&self) -> Option<String> {
        match self {
            EnvValue::Secret(_) => None,
            EnvValue::Bool(b) => Some(b.to_string()),
            EnvValue::Number(n) => Some(n.to_string()),
            EnvValue::Text(s) => Some(s.clone()),
        }
    }

    pub fn secret(&self) -> Option<&str> {
        match self {
            EnvValue::Secret(secret) => Some(&secret.from_secret),
            _ => None,
        }
    }
}

/// Plugin setting value: a secret reference or any YAML value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Secret(SecretRef),
    Value(Value),
}

/// Exposed service port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Port {
    Number(u16),
    Spec(String),
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Number(n) => write!(f, "{}", n),
            Port::Spec(s) => f.write_str(s),
        }
    }
}

impl DocumentConfig {
    /// Load a document from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document = Self::parse(yaml)?;
        document.validate()?;
        Ok(document)
    }

    /// Parse without validating
    pub fn parse(yaml: &str) -> Result<Self> {
        let mut resources = Vec::new();

        // The second stream re-reads pipelines for the source text of literals
        let documents = serde_yaml::Deserializer::from_str(yaml)
            .zip(serde_yaml::Deserializer::from_str(yaml));

        for (index, (doc, source)) in documents.enumerate() {
            let value = Value::deserialize(doc)
                .with_context(|| format!("Invalid YAML in document #{}", index + 1))?;
            if value.is_null() {
                continue;
            }

            let kind = value.get("kind").and_then(Value::as_str);
            if kind == Some("pipeline") {
                let value = keep_literal_text(source, &value)
                    .with_context(|| format!("Invalid YAML in document #{}", index + 1))?;
                let pipeline: PipelineConfig = serde_yaml::from_value(value)
                    .with_context(|| format!("Invalid pipeline in document #{}", index + 1))?;
                resources.push(Resource::Pipeline(pipeline));
            } else {
                resources.push(Resource::Other(value));
            }
        }

        Ok(Self { resources })
    }

    /// Emit the document as a YAML stream
    pub fn to_yaml(&self) -> Result<String> {
        let docs = self
            .resources
            .iter()
            .map(|resource| match resource {
                Resource::Pipeline(pipeline) => serde_yaml::to_string(pipeline),
                Resource::Other(value) => serde_yaml::to_string(value),
            })
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to serialize document")?;

        Ok(docs.join("---\n"))
    }

    /// Pipelines in document order
    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineConfig> {
        self.resources.iter().filter_map(|resource| match resource {
            Resource::Pipeline(pipeline) => Some(pipeline),
            Resource::Other(_) => None,
        })
    }

    /// Find a pipeline by name
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines().find(|p| p.name == name)
    }

    /// Validate the document
    pub fn validate(&self) -> Result<()> {
        let pipelines: Vec<_> = self.pipelines().collect();
        if pipelines.is_empty() {
            anyhow::bail!("Document does not define any pipeline");
        }

        let mut seen_names = HashSet::new();
        let mut network_names = HashMap::new();
        for pipeline in &pipelines {
            if pipeline.name.trim().is_empty() {
                anyhow::bail!("Pipeline name must not be empty");
            }
            if !seen_names.insert(pipeline.name.as_str()) {
                anyhow::bail!("Duplicate pipeline name: {}", pipeline.name);
            }
            if let Some(other) = network_names.insert(sanitize(&pipeline.name), &pipeline.name) {
                anyhow::bail!(
                    "Pipelines '{}' and '{}' map to the same network name '{}'",
                    other,
                    pipeline.name,
                    sanitize(&pipeline.name)
                );
            }
        }

        for pipeline in &pipelines {
            pipeline.validate()?;

            for dep in &pipeline.depends_on {
                if dep == &pipeline.name {
                    anyhow::bail!("Pipeline '{}' depends on itself", pipeline.name);
                }
                if !seen_names.contains(dep.as_str()) {
                    anyhow::bail!(
                        "Pipeline '{}' depends on non-existent pipeline '{}'",
                        pipeline.name,
                        dep
                    );
                }
            }
        }

        self.check_cycles()?;

        Ok(())
    }

    /// Check for cycles in the pipeline dependency graph
    fn check_cycles(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut recursion_stack = HashSet::new();

        for pipeline in self.pipelines() {
            if !visited.contains(&pipeline.name) {
                self.dfs_check(&pipeline.name, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        name: &str,
        visited: &mut HashSet<String>,
        recursion_stack: &mut HashSet<String>,
    ) -> Result<()> {
        visited.insert(name.to_string());
        recursion_stack.insert(name.to_string());

        if let Some(pipeline) = self.pipeline(name) {
            for dep in &pipeline.depends_on {
                if recursion_stack.contains(dep) {
                    anyhow::bail!("Cycle detected in pipeline dependencies involving '{}'", dep);
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(name);
        Ok(())
    }

    /// Convert the document into a runnable build for an event
    pub fn to_build(&self, context: BuildContext) -> Build {
        Build::from_config(self, context)
    }
}

impl PipelineConfig {
    /// Validate a single pipeline
    pub fn validate(&self) -> Result<()> {
        let name = &self.name;

        let mut volume_names = HashSet::new();
        for volume in &self.volumes {
            if volume.name.trim().is_empty() {
                anyhow::bail!("Pipeline '{}' declares a volume without a name", name);
            }
            if !volume_names.insert(volume.name.as_str()) {
                anyhow::bail!("Pipeline '{}' declares volume '{}' twice", name, volume.name);
            }
            match (&volume.host, &volume.temp) {
                (Some(host), None) => {
                    if !host.path.starts_with('/') {
                        anyhow::bail!(
                            "Volume '{}' in pipeline '{}' has a relative host path: {}",
                            volume.name,
                            name,
                            host.path
                        );
                    }
                }
                (None, Some(_)) => {}
                _ => anyhow::bail!(
                    "Volume '{}' in pipeline '{}' must declare exactly one of host or temp",
                    volume.name,
                    name
                ),
            }
        }

        let mut container_names: HashMap<&str, &str> = HashMap::new();
        for service in &self.services {
            check_container(name, "service", &service.name, &service.image)?;
            if container_names.insert(&service.name, "service").is_some() {
                anyhow::bail!("Pipeline '{}' declares service '{}' twice", name, service.name);
            }
            check_mounts(name, &service.name, &service.volumes, &volume_names)?;
        }

        for step in &self.steps {
            check_container(name, "step", &step.name, &step.image)?;
            if let Some(kind) = container_names.insert(&step.name, "step") {
                anyhow::bail!(
                    "Pipeline '{}' declares step '{}' which clashes with a {} of the same name",
                    name,
                    step.name,
                    kind
                );
            }
            if step.commands.is_empty() && step.settings.is_none() {
                anyhow::bail!(
                    "Step '{}' in pipeline '{}' must declare commands or plugin settings",
                    step.name,
                    name
                );
            }
            check_mounts(name, &step.name, &step.volumes, &volume_names)?;
            check_conditions(&format!("step '{}' in pipeline '{}'", step.name, name), &step.when)?;

            if let Some(failure) = &step.failure {
                if failure != "ignore" {
                    anyhow::bail!(
                        "Step '{}' in pipeline '{}' has unsupported failure mode '{}'",
                        step.name,
                        name,
                        failure
                    );
                }
            }
        }

        let mut slugs: HashMap<String, &str> = HashMap::new();
        let containers = self
            .services
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.steps.iter().map(|s| s.name.as_str()));
        for container in containers {
            if let Some(other) = slugs.insert(sanitize(container), container) {
                anyhow::bail!(
                    "'{}' and '{}' in pipeline '{}' map to the same container name '{}'",
                    other,
                    container,
                    name,
                    sanitize(container)
                );
            }
        }

        check_conditions(&format!("trigger of pipeline '{}'", name), &self.trigger)?;

        Ok(())
    }

    /// Find a step by name
    pub fn step(&self, name: &str) -> Option<&StepConfig> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Find a top-level volume by name
    pub fn volume(&self, name: &str) -> Option<&VolumeConfig> {
        self.volumes.iter().find(|v| v.name == name)
    }
}

/// Keep characters docker accepts in names, replace the rest
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn check_container(pipeline: &str, kind: &str, name: &str, image: &str) -> Result<()> {
    if name.trim().is_empty() {
        anyhow::bail!("Pipeline '{}' declares a {} without a name", pipeline, kind);
    }
    if image.trim().is_empty() {
        anyhow::bail!(
            "The {} '{}' in pipeline '{}' must declare an image",
            kind,
            name,
            pipeline
        );
    }
    if image.chars().any(char::is_whitespace) {
        anyhow::bail!(
            "The {} '{}' in pipeline '{}' has an invalid image reference: '{}'",
            kind,
            name,
            pipeline,
            image
        );
    }
    Ok(())
}

fn check_mounts(
    pipeline: &str,
    container: &str,
    mounts: &[VolumeMount],
    volume_names: &HashSet<&str>,
) -> Result<()> {
    for mount in mounts {
        if !volume_names.contains(mount.name.as_str()) {
            anyhow::bail!(
                "'{}' in pipeline '{}' mounts undeclared volume '{}'",
                container,
                pipeline,
                mount.name
            );
        }
        if !mount.path.starts_with('/') {
            anyhow::bail!(
                "'{}' in pipeline '{}' mounts volume '{}' at a relative path: {}",
                container,
                pipeline,
                mount.name,
                mount.path
            );
        }
    }
    Ok(())
}

fn check_conditions(owner: &str, conditions: &Conditions) -> Result<()> {
    if let Some(status) = &conditions.status {
        for value in status.patterns() {
            if !KNOWN_STATUSES.contains(&value) {
                anyhow::bail!("Unknown status '{}' in {}", value, owner);
            }
        }
    }
    if let Some(event) = &conditions.event {
        for value in event.patterns() {
            if !KNOWN_EVENTS.contains(&value) {
                anyhow::bail!("Unknown event '{}' in {}", value, owner);
            }
        }
    }
    Ok(())
}
