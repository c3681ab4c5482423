// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The classpath-suggestion index: `spec.md` places this out of core
//! scope ("referenced only by the interfaces the core consumes") but
//! still lists it as an external interface the final summary calls
//! into (§4.1 step 12, §6). This module carries the trait boundary and
//! a minimal concrete implementation; a real index (backed by a build
//! graph or package registry) is out of scope for this crate.

use aho_corasick::AhoCorasick;
use camino::Utf8PathBuf;
use std::collections::BTreeSet;

/// External collaborator contract: given the captured output of a
/// failed action, suggest classpath entries that might resolve it
/// (typically parsed out of `ClassNotFoundException`-style lines).
pub trait ClassFileIndex: Send + Sync {
    fn suggest_classpaths(&self, output_lines: &[String]) -> BTreeSet<Utf8PathBuf>;
}

/// Never suggests anything. The default when no index is configured.
#[derive(Clone, Debug, Default)]
pub struct NullClassFileIndex;

impl ClassFileIndex for NullClassFileIndex {
    fn suggest_classpaths(&self, _output_lines: &[String]) -> BTreeSet<Utf8PathBuf> {
        BTreeSet::new()
    }
}

/// A substring-matching index: maps a fully-qualified class name (or
/// any other identifying substring found in failure output) to the
/// classpath entry that provides it, using the same Aho-Corasick engine
/// `Expectation`'s output-pattern matching uses in `src/expectation.rs`.
pub struct SubstringClassFileIndex {
    automaton: AhoCorasick,
    entries: Vec<Utf8PathBuf>,
}

impl SubstringClassFileIndex {
    /// `entries` pairs a substring to search for (e.g. a class name)
    /// with the classpath entry that provides it.
    pub fn new(entries: impl IntoIterator<Item = (String, Utf8PathBuf)>) -> Self {
        let (patterns, paths): (Vec<String>, Vec<Utf8PathBuf>) = entries.into_iter().unzip();
        Self {
            automaton: AhoCorasick::new(&patterns).expect("valid pattern set"),
            entries: paths,
        }
    }
}

impl ClassFileIndex for SubstringClassFileIndex {
    fn suggest_classpaths(&self, output_lines: &[String]) -> BTreeSet<Utf8PathBuf> {
        let mut suggestions = BTreeSet::new();
        for line in output_lines {
            for m in self.automaton.find_iter(line) {
                suggestions.insert(self.entries[m.pattern().as_usize()].clone());
            }
        }
        suggestions
    }
}
