// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Action discovery: turning raw file paths and class names into
//! [`Action`]s. `spec.md` places this collaborator out of core scope;
//! this module supplements it with one concrete, minimal implementation,
//! grounded on `testrunner::test_list::TestList::new`'s role of turning
//! raw inputs into structured test data.

use crate::action::Action;
use crate::outcome::Outcome;
use camino::{Utf8Path, Utf8PathBuf};
use walkdir::WalkDir;

/// External contract: discovers `Action`s from source files and class
/// names, optionally injecting pre-computed early outcomes (e.g. a
/// discovery-time parse failure) alongside them.
pub trait ActionFinder {
    fn find(&self, files: &[Utf8PathBuf], class_names: &[String]) -> Vec<DiscoveredAction>;
}

/// One discovered action, plus an optional outcome already known at
/// discovery time (`spec.md` §4.1 step 5's early-result short-circuit).
pub struct DiscoveredAction {
    pub action: Action,
    pub early_outcome: Option<Outcome>,
}

/// Walks `files` for sources matching `source_suffix` and pairs the rest
/// up with `class_names` directly (actions with no backing source file,
/// per `spec.md` §4.1 step 2: "classes without source files become
/// Actions whose source/resource paths are empty").
pub struct FilesystemActionFinder {
    source_suffix: String,
}

impl FilesystemActionFinder {
    pub fn new(source_suffix: impl Into<String>) -> Self {
        Self {
            source_suffix: source_suffix.into(),
        }
    }
}

impl Default for FilesystemActionFinder {
    fn default() -> Self {
        Self::new("_test.rs")
    }
}

impl ActionFinder for FilesystemActionFinder {
    fn find(&self, files: &[Utf8PathBuf], class_names: &[String]) -> Vec<DiscoveredAction> {
        let mut discovered = Vec::new();

        for root in files {
            for entry in WalkDir::new(root.as_std_path())
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
            {
                let Ok(path) = Utf8Path::from_path(entry.path()) else {
                    continue;
                };
                if !path.as_str().ends_with(&self.source_suffix) {
                    continue;
                }
                let name = path
                    .file_name()
                    .map(|f| f.trim_end_matches(&self.source_suffix).to_string())
                    .unwrap_or_else(|| path.as_str().to_string());
                let mut action = Action::new(name.clone(), name);
                action.source_path = Some(path.to_path_buf());
                discovered.push(DiscoveredAction {
                    action,
                    early_outcome: None,
                });
            }
        }

        for class_name in class_names {
            let mut action = Action::new(class_name.clone(), class_name.clone());
            action.source_path = None;
            action.resource_path = None;
            discovered.push(DiscoveredAction {
                action,
                early_outcome: None,
            });
        }

        discovered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_matching_source_files() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("foo_test.rs");
        fs::write(&file_path, "// test").unwrap();
        let other_path = dir.path().join("bar.rs");
        fs::write(&other_path, "// not a test").unwrap();

        let finder = FilesystemActionFinder::default();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let discovered = finder.find(&[root], &[]);

        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].action.name, "foo");
        assert!(discovered[0].action.source_path.is_some());
    }

    #[test]
    fn class_names_get_empty_paths() {
        let finder = FilesystemActionFinder::default();
        let discovered = finder.find(&[], &["com.example.Foo".to_string()]);
        assert_eq!(discovered.len(), 1);
        assert!(discovered[0].action.source_path.is_none());
        assert!(discovered[0].action.resource_path.is_none());
    }
}
