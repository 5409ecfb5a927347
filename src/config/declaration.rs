//! Declared consumers
//!
//! The declarative configuration itself is parsed and validated elsewhere; this
//! module holds the normalized, namespace-scoped view the runtime reconciles
//! against, plus a minimal serde model for reading it from YAML or JSON.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// Namespace-qualified consumer identity
///
/// Consumers of the default namespace are identified by their bare name,
/// everything else by `namespace::name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId {
    namespace: Option<String>,
    name: String,
}

impl InstanceId {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Id in the default namespace
    pub fn default_ns(name: &str) -> Self {
        Self::new(None, name)
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Representation usable as a file name
    pub fn file_safe(&self) -> String {
        self.to_string().replace("::", "__")
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}::{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Per-consumer tracing switch: `true`/`false` or an explicit file path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceSetting {
    Enabled(bool),
    Path(PathBuf),
}

impl Default for TraceSetting {
    fn default() -> Self {
        TraceSetting::Enabled(false)
    }
}

/// One consumer as declared by the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredConsumer {
    pub name: String,

    /// Sink type, i.e. the plugin name (e.g. "Splunk")
    #[serde(rename = "type")]
    pub consumer_type: String,

    #[serde(default = "default_enable")]
    pub enable: bool,

    #[serde(default)]
    pub trace: TraceSetting,

    /// Sink-specific settings, opaque to the runtime
    #[serde(default = "empty_object")]
    pub config: Value,
}

/// Consumers of one user-defined namespace
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NamespaceDeclaration {
    #[serde(default)]
    pub consumers: Vec<DeclaredConsumer>,
}

/// Whole declaration: default namespace plus named namespaces
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Declaration {
    #[serde(default)]
    pub consumers: Vec<DeclaredConsumer>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub namespaces: BTreeMap<String, NamespaceDeclaration>,
}

fn default_enable() -> bool {
    true
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Declaration {
    /// Parse a declaration from YAML (JSON is valid YAML)
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse consumer declaration")
    }

    /// Read a declaration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read declaration file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid declaration file: {}", path.display()))
    }

    /// Enabled consumers of every namespace, namespace-qualified
    pub fn normalize(&self) -> Vec<NormalizedConsumer> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::new();

        let scoped = std::iter::once((None, &self.consumers)).chain(
            self.namespaces
                .iter()
                .map(|(ns, decl)| (Some(ns.as_str()), &decl.consumers)),
        );

        for (namespace, consumers) in scoped {
            for consumer in consumers {
                if !consumer.enable {
                    tracing::debug!(
                        "Consumer '{}' is disabled",
                        InstanceId::new(namespace, &consumer.name)
                    );
                    continue;
                }
                let item = NormalizedConsumer::new(namespace, consumer);
                if !seen.insert(item.id.clone()) {
                    tracing::warn!("Duplicate consumer '{}' ignored", item.id);
                    continue;
                }
                normalized.push(item);
            }
        }

        normalized
    }

    /// Enabled consumers of a single namespace (None = default namespace)
    pub fn normalize_namespace(&self, namespace: Option<&str>) -> Vec<NormalizedConsumer> {
        self.normalize()
            .into_iter()
            .filter(|c| c.id.namespace() == namespace)
            .collect()
    }
}

/// A declared consumer after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedConsumer {
    pub id: InstanceId,
    pub consumer_type: String,
    pub trace: TraceSetting,
    pub config: Value,
    fingerprint: u64,
}

impl NormalizedConsumer {
    pub fn new(namespace: Option<&str>, declared: &DeclaredConsumer) -> Self {
        let config = match &declared.config {
            Value::Null => empty_object(),
            other => other.clone(),
        };
        let fingerprint = fingerprint(&declared.consumer_type, &declared.trace, &config);

        Self {
            id: InstanceId::new(namespace, &declared.name),
            consumer_type: declared.consumer_type.clone(),
            trace: declared.trace.clone(),
            config,
            fingerprint,
        }
    }

    /// Content hash of the declared type, trace setting and config
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Whether `other` declares exactly the same consumer
    pub fn same_declaration(&self, other: &NormalizedConsumer) -> bool {
        self.fingerprint == other.fingerprint
            && self.consumer_type == other.consumer_type
            && self.trace == other.trace
            && self.config == other.config
    }
}

// serde_json objects are key-ordered, so the serialized form is canonical
fn fingerprint(consumer_type: &str, trace: &TraceSetting, config: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    consumer_type.hash(&mut hasher);
    trace.hash(&mut hasher);
    serde_json::to_string(config)
        .unwrap_or_default()
        .hash(&mut hasher);
    hasher.finish()
}

/// Which part of the declaration a change covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeScope {
    /// Every namespace; live consumers absent from the change are removed
    All,
    /// One namespace (None = default); other namespaces are left alone
    Namespace(Option<String>),
}

impl ChangeScope {
    pub fn covers(&self, id: &InstanceId) -> bool {
        match self {
            ChangeScope::All => true,
            ChangeScope::Namespace(ns) => id.namespace() == ns.as_deref(),
        }
    }
}

/// Notification of a successful configuration change
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigChange {
    pub scope: ChangeScope,
    pub consumers: Vec<NormalizedConsumer>,
}

impl ConfigChange {
    /// Change covering the whole declaration
    pub fn full(declaration: &Declaration) -> Self {
        Self {
            scope: ChangeScope::All,
            consumers: declaration.normalize(),
        }
    }

    /// Change covering a single namespace
    pub fn namespace(declaration: &Declaration, namespace: Option<&str>) -> Self {
        Self {
            scope: ChangeScope::Namespace(namespace.map(str::to_string)),
            consumers: declaration.normalize_namespace(namespace),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DECLARATION: &str = r#"
consumers:
  - name: defaultConsumer1
    type: Default
  - name: disabled
    type: Default
    enable: false
namespaces:
  finance:
    consumers:
      - name: splunk
        type: Splunk
        trace: true
        config:
          host: splunk.example.com
          port: 8088
"#;

    #[test]
    fn test_instance_id_display() {
        assert_eq!(InstanceId::default_ns("c1").to_string(), "c1");
        assert_eq!(InstanceId::new(Some("finance"), "c1").to_string(), "finance::c1");
        assert_eq!(InstanceId::new(Some("finance"), "c1").file_safe(), "finance__c1");
    }

    #[test]
    fn test_normalize_skips_disabled() {
        let declaration = Declaration::from_yaml(DECLARATION).unwrap();
        let consumers = declaration.normalize();

        let ids: Vec<String> = consumers.iter().map(|c| c.id.to_string()).collect();
        assert_eq!(ids, vec!["defaultConsumer1", "finance::splunk"]);
        assert_eq!(consumers[1].trace, TraceSetting::Enabled(true));
        assert_eq!(consumers[0].config, json!({}));
    }

    #[test]
    fn test_normalize_namespace() {
        let declaration = Declaration::from_yaml(DECLARATION).unwrap();
        let finance = declaration.normalize_namespace(Some("finance"));
        assert_eq!(finance.len(), 1);
        assert_eq!(finance[0].consumer_type, "Splunk");

        let default = declaration.normalize_namespace(None);
        assert_eq!(default.len(), 1);
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let a = DeclaredConsumer {
            name: "c".into(),
            consumer_type: "X".into(),
            enable: true,
            trace: TraceSetting::default(),
            config: serde_json::from_str(r#"{"a": 1, "b": 2}"#).unwrap(),
        };
        let mut b = a.clone();
        b.config = serde_json::from_str(r#"{"b": 2, "a": 1}"#).unwrap();

        let na = NormalizedConsumer::new(None, &a);
        let nb = NormalizedConsumer::new(None, &b);
        assert!(na.same_declaration(&nb));

        b.config = json!({"a": 1, "b": 3});
        assert!(!na.same_declaration(&NormalizedConsumer::new(None, &b)));
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let yaml = r#"
consumers:
  - name: c
    type: X
  - name: c
    type: Y
"#;
        let consumers = Declaration::from_yaml(yaml).unwrap().normalize();
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].consumer_type, "X");
    }

    #[test]
    fn test_change_scope_covers() {
        let finance = InstanceId::new(Some("finance"), "c");
        let default = InstanceId::default_ns("c");

        assert!(ChangeScope::All.covers(&finance));
        assert!(ChangeScope::Namespace(Some("finance".into())).covers(&finance));
        assert!(!ChangeScope::Namespace(Some("finance".into())).covers(&default));
        assert!(ChangeScope::Namespace(None).covers(&default));
    }

    #[test]
    fn test_trace_path_setting() {
        let yaml = r#"
consumers:
  - name: c
    type: X
    trace: /tmp/trace-c
"#;
        let consumers = Declaration::from_yaml(yaml).unwrap().normalize();
        assert_eq!(
            consumers[0].trace,
            TraceSetting::Path(PathBuf::from("/tmp/trace-c"))
        );
    }
}
