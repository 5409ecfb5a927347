//! Declaration file watcher
//!
//! Polls the declared consumers file and turns content changes into
//! [`ConfigChange`]s for the consumers service. The first successful read
//! produces a full change; later reads produce one namespace-scoped change per
//! namespace whose declarations differ, so an edit in one namespace never
//! touches the consumers of another.

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::declaration::{ConfigChange, Declaration};

/// Remembers the last applied declaration of one file
#[derive(Debug)]
pub struct DeclarationWatcher {
    path: PathBuf,
    last_content: Option<String>,
    applied: Option<Declaration>,
}

impl DeclarationWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_content: None,
            applied: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the file and report what changed since the last successful read
    ///
    /// A missing file declares no consumers. Unparsable content is reported
    /// once and the previous declaration stays in effect.
    pub fn poll(&mut self) -> Result<Vec<ConfigChange>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read declaration file {}: {}",
                    self.path.display(),
                    e
                ));
            }
        };

        if self.last_content.as_deref() == Some(content.as_str()) {
            return Ok(Vec::new());
        }
        self.last_content = Some(content.clone());

        let declaration = if content.trim().is_empty() {
            Declaration::default()
        } else {
            Declaration::from_yaml(&content)?
        };

        let changes = match &self.applied {
            None => vec![ConfigChange::full(&declaration)],
            Some(previous) => changed_namespaces(previous, &declaration)
                .into_iter()
                .map(|ns| ConfigChange::namespace(&declaration, ns.as_deref()))
                .collect(),
        };

        self.applied = Some(declaration);
        Ok(changes)
    }
}

/// Namespaces (None = default) whose declared consumers differ
fn changed_namespaces(previous: &Declaration, current: &Declaration) -> Vec<Option<String>> {
    let mut changed = Vec::new();

    if previous.consumers != current.consumers {
        changed.push(None);
    }

    let names: BTreeSet<&String> = previous
        .namespaces
        .keys()
        .chain(current.namespaces.keys())
        .collect();
    for name in names {
        if previous.namespaces.get(name) != current.namespaces.get(name) {
            changed.push(Some(name.clone()));
        }
    }

    changed
}

/// Poll `watcher` every `interval` and forward changes until `changes` closes
pub fn spawn_poller(
    mut watcher: DeclarationWatcher,
    interval: Duration,
    changes: mpsc::Sender<ConfigChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Watching {} every {:?}",
            watcher.path().display(),
            interval
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let batch = match watcher.poll() {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!("Ignoring declaration update: {:#}", e);
                    continue;
                }
            };

            for change in batch {
                tracing::debug!("Declaration changed ({:?})", change.scope);
                if changes.send(change).await.is_err() {
                    tracing::debug!("Consumers service stopped, declaration watcher exiting");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::declaration::ChangeScope;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_first_read_is_full_change() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("consumers.yaml");
        write(&path, "consumers: [{name: a, type: Default}]");

        let mut watcher = DeclarationWatcher::new(&path);
        let changes = watcher.poll().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].scope, ChangeScope::All);
        assert_eq!(changes[0].consumers.len(), 1);

        // unchanged content
        assert!(watcher.poll().unwrap().is_empty());
    }

    #[test]
    fn test_namespace_edit_is_scoped() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("consumers.yaml");
        write(
            &path,
            r#"
consumers: [{name: a, type: Default}]
namespaces:
  finance: {consumers: [{name: f, type: Default}]}
  ops: {consumers: [{name: o, type: Default}]}
"#,
        );
        let mut watcher = DeclarationWatcher::new(&path);
        watcher.poll().unwrap();

        write(
            &path,
            r#"
consumers: [{name: a, type: Default}]
namespaces:
  finance: {consumers: [{name: f, type: Default, config: {level: 2}}]}
  ops: {consumers: [{name: o, type: Default}]}
"#,
        );
        let changes = watcher.poll().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].scope,
            ChangeScope::Namespace(Some("finance".to_string()))
        );
    }

    #[test]
    fn test_removed_namespace_and_missing_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("consumers.yaml");
        write(
            &path,
            "namespaces: {finance: {consumers: [{name: f, type: Default}]}}",
        );
        let mut watcher = DeclarationWatcher::new(&path);
        watcher.poll().unwrap();

        std::fs::remove_file(&path).unwrap();
        let changes = watcher.poll().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].scope,
            ChangeScope::Namespace(Some("finance".to_string()))
        );
        assert!(changes[0].consumers.is_empty());
    }

    #[test]
    fn test_invalid_content_keeps_previous() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("consumers.yaml");
        write(&path, "consumers: [{name: a, type: Default}]");
        let mut watcher = DeclarationWatcher::new(&path);
        watcher.poll().unwrap();

        write(&path, "consumers: {{{");
        assert!(watcher.poll().is_err());
        // reported once
        assert!(watcher.poll().unwrap().is_empty());

        write(&path, "consumers: [{name: b, type: Default}]");
        let changes = watcher.poll().unwrap();
        assert_eq!(changes[0].scope, ChangeScope::Namespace(None));
        assert_eq!(changes[0].consumers[0].id.name(), "b");
    }
}
