// Copyright (c) The action-driver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level CLI surface, in the manner of `testrunner::dispatch::Opts`
//! migrated from `structopt` to `clap`'s derive macros (`SPEC_FULL.md`
//! §2 item 10).

use crate::config::{DriverConfig, FileConfig};
use crate::expectation::InMemoryExpectationStore;
use crate::finder::FilesystemActionFinder;
use crate::mode::LocalMode;
use crate::orchestrator::Driver;
use crate::reporter::Color;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "action-driver", about = "Builds and runs discovered test actions under supervision")]
pub struct Opts {
    /// Coloring: always, auto, never
    #[arg(long, default_value = "auto")]
    color: CliColor,

    /// Path to a TOML configuration file overriding the built-in defaults
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List discovered actions without building or running them
    ListActions {
        #[command(flatten)]
        discovery: DiscoveryArgs,
    },
    /// Build and run the discovered actions
    Run {
        #[command(flatten)]
        discovery: DiscoveryArgs,

        /// Number of runner threads
        #[arg(long)]
        jobs: Option<usize>,

        /// Write a JUnit XML report to this path
        #[arg(long)]
        junit: Option<Utf8PathBuf>,
    },
}

#[derive(Debug, Clone, clap::Args)]
pub struct DiscoveryArgs {
    /// Root directories to search for action sources
    #[arg(short = 'r', long = "root", required = true, num_args = 1..)]
    pub roots: Vec<Utf8PathBuf>,

    /// Already-built class names to include, with no corresponding source file
    #[arg(long = "class")]
    pub classes: Vec<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
enum CliColor {
    Always,
    Auto,
    Never,
}

impl From<CliColor> for Color {
    fn from(value: CliColor) -> Self {
        match value {
            CliColor::Always => Color::Always,
            CliColor::Auto => Color::Auto,
            CliColor::Never => Color::Never,
        }
    }
}

impl Opts {
    pub fn exec(self) -> Result<()> {
        let mut config = DriverConfig::default();
        if let Some(path) = &self.config {
            config = FileConfig::load(path)?.apply(config);
        }

        match self.command {
            Command::ListActions { discovery } => {
                let finder = FilesystemActionFinder::default();
                let discovered = finder.find(&discovery.roots, &discovery.classes);
                for item in discovered {
                    println!("{}", item.action.name);
                }
                Ok(())
            }
            Command::Run { discovery, jobs, junit } => {
                if let Some(jobs) = jobs {
                    config.num_runner_threads = jobs;
                }
                let driver = Driver::new(
                    config,
                    Box::new(LocalMode::new(None)),
                    Box::new(FilesystemActionFinder::default()),
                    Box::new(InMemoryExpectationStore::new()),
                    self.color.into(),
                    junit,
                );
                let snapshot = driver
                    .build_and_run(&discovery.roots, &discovery.classes)
                    .context("build-and-run cycle failed")?;
                if snapshot.failures > 0 {
                    std::process::exit(1);
                }
                Ok(())
            }
        }
    }
}
