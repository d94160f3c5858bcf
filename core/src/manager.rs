//! Migration registration and ordered application.
//!
//! A [`Manager`] holds the migration catalog for one backend. Each migration
//! names the version it produces and the version it `replaces`; the root
//! migration replaces the empty string, which is what a [`Driver`] reports
//! for a database that has no version table yet.
//!
//! # Example
//!
//! ```
//! use revstore_core::Manager;
//!
//! let mut manager: Manager<&str> = Manager::new();
//! manager.register("initial", "", "CREATE TABLE ...").unwrap();
//! manager.register("add-caveats", "initial", "ALTER TABLE ...").unwrap();
//! assert_eq!(manager.head_revision().unwrap(), "add-caveats");
//!
//! // Identifiers must start with a letter.
//! assert!(manager.register("888", "add-caveats", "...").is_err());
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::Context;
use crate::driver::Driver;
use crate::error::{Error, Result};

/// Alias accepted by [`Manager::run`] for the latest registered migration.
pub const HEAD: &str = "head";

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("static regex must compile"));

/// Checks a migration version against the identifier grammar.
///
/// # Errors
///
/// Returns [`Error::InvalidIdentifier`] when the identifier is empty, starts
/// with anything other than an ASCII letter, or contains characters outside
/// `[A-Za-z0-9_-]`.
pub fn validate_identifier(identifier: &str) -> Result<()> {
    if IDENTIFIER_RE.is_match(identifier) {
        Ok(())
    } else {
        Err(Error::InvalidIdentifier(identifier.to_string()))
    }
}

/// One registered migration step.
#[derive(Debug)]
pub struct Migration<M> {
    version: String,
    replaces: String,
    up: M,
}

impl<M> Migration<M> {
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The version that must be stored for this step to apply.
    pub fn replaces(&self) -> &str {
        &self.replaces
    }

    pub fn up(&self) -> &M {
        &self.up
    }
}

/// Whether [`Manager::run`] applies steps or only plans them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    #[default]
    Live,
    DryRun,
}

/// Summary of a [`Manager::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Version stored before the run.
    pub starting: String,
    /// Version the run migrated towards.
    pub target: String,
    /// Versions applied in order (planned, for a dry run).
    pub applied: Vec<String>,
    pub dry_run: bool,
}

/// Catalog of migrations for a backend whose bodies have type `M`.
#[derive(Debug)]
pub struct Manager<M> {
    migrations: Vec<Migration<M>>,
    by_version: HashMap<String, usize>,
    successors: HashMap<String, usize>,
}

impl<M> Default for Manager<M> {
    fn default() -> Self {
        Self {
            migrations: Vec::new(),
            by_version: HashMap::new(),
            successors: HashMap::new(),
        }
    }
}

impl<M> Manager<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration producing `version` from `replaces`.
    ///
    /// Pass an empty `replaces` for the root migration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifier`] if `version`, or a non-empty
    ///   `replaces`, breaks the identifier grammar.
    /// - [`Error::ReservedVersion`] if `version` is `head` in any case.
    /// - [`Error::DuplicateVersion`] if `version` is already registered.
    /// - [`Error::BranchingMigration`] if another migration already replaces
    ///   `replaces`.
    pub fn register(
        &mut self,
        version: impl Into<String>,
        replaces: impl Into<String>,
        up: M,
    ) -> Result<()> {
        let version = version.into();
        let replaces = replaces.into();

        if version.eq_ignore_ascii_case(HEAD) {
            return Err(Error::ReservedVersion(version));
        }
        validate_identifier(&version)?;
        if !replaces.is_empty() {
            validate_identifier(&replaces)?;
        }
        if self.by_version.contains_key(&version) {
            return Err(Error::DuplicateVersion(version));
        }
        if let Some(&existing) = self.successors.get(&replaces) {
            return Err(Error::BranchingMigration {
                version,
                replaces,
                existing: self.migrations[existing].version.clone(),
            });
        }

        let index = self.migrations.len();
        self.by_version.insert(version.clone(), index);
        self.successors.insert(replaces.clone(), index);
        self.migrations.push(Migration {
            version,
            replaces,
            up,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Looks up a migration by the version it produces.
    pub fn get(&self, version: &str) -> Option<&Migration<M>> {
        self.by_version.get(version).map(|&idx| &self.migrations[idx])
    }

    /// Iterates migrations in registration order.
    pub fn migrations(&self) -> impl Iterator<Item = &Migration<M>> {
        self.migrations.iter()
    }

    /// The one registered version no other migration replaces.
    pub fn head_revision(&self) -> Result<String> {
        if self.migrations.is_empty() {
            return Err(Error::NoMigrations);
        }
        let mut candidates: Vec<String> = self
            .migrations
            .iter()
            .filter(|m| !self.successors.contains_key(&m.version))
            .map(|m| m.version.clone())
            .collect();
        match candidates.len() {
            0 => Err(Error::CyclicMigrations),
            1 => Ok(candidates.remove(0)),
            _ => {
                candidates.sort();
                Err(Error::AmbiguousHead(candidates))
            }
        }
    }

    /// Returns `true` if `revision` is the current head.
    pub fn is_head_compatible(&self, revision: &str) -> Result<bool> {
        Ok(self.head_revision()? == revision)
    }

    /// Steps that move a database from `from` to `to`, in application order.
    ///
    /// `to` may be [`HEAD`]. The list is empty when `from == to`.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownVersion`] if `to` is not registered, or
    /// [`Error::UnreachableVersion`] if `from` is not an ancestor of `to`.
    pub fn plan(&self, from: &str, to: &str) -> Result<Vec<&Migration<M>>> {
        let to = self.resolve(to)?;
        if from == to {
            return Ok(Vec::new());
        }

        let unreachable = || Error::UnreachableVersion {
            from: from.to_string(),
            to: to.clone(),
        };
        let mut steps = Vec::new();
        let mut current = to.as_str();
        loop {
            let step = self.get(current).ok_or_else(unreachable)?;
            steps.push(step);
            if step.replaces == from {
                break;
            }
            // Reaching the root, or walking longer than the catalog, means
            // `from` is not on this chain.
            if step.replaces.is_empty() || steps.len() > self.migrations.len() {
                return Err(unreachable());
            }
            current = &step.replaces;
        }
        steps.reverse();
        Ok(steps)
    }

    /// Migrates the database behind `driver` to `target`.
    ///
    /// Each step runs in its own transaction through
    /// [`Driver::transact`]. The first failure stops the run and is
    /// returned; steps committed before it stay committed.
    pub fn run<D>(&self, driver: &mut D, ctx: &Context, target: &str, mode: RunMode) -> Result<RunReport>
    where
        D: Driver<Migration = M>,
    {
        ctx.check()?;
        let starting = driver.version(ctx)?;
        let target = self.resolve(target)?;
        let steps = self.plan(&starting, &target)?;
        debug!(
            starting = %starting,
            target = %target,
            pending = steps.len(),
            "planned migration run"
        );

        let mut report = RunReport {
            starting,
            target,
            applied: Vec::with_capacity(steps.len()),
            dry_run: mode == RunMode::DryRun,
        };

        for step in steps {
            ctx.check()?;
            match mode {
                RunMode::DryRun => {
                    info!(version = %step.version, replaces = %step.replaces, "would apply migration");
                }
                RunMode::Live => {
                    info!(version = %step.version, replaces = %step.replaces, "applying migration");
                    driver.transact(ctx, &step.up, &step.version, &step.replaces)?;
                }
            }
            report.applied.push(step.version.clone());
        }

        if !report.dry_run && !report.applied.is_empty() {
            info!(applied = report.applied.len(), version = %report.target, "migrations complete");
        }
        Ok(report)
    }

    fn resolve(&self, target: &str) -> Result<String> {
        if target.eq_ignore_ascii_case(HEAD) {
            return self.head_revision();
        }
        if self.by_version.contains_key(target) {
            Ok(target.to_string())
        } else {
            Err(Error::UnknownVersion(target.to_string()))
        }
    }
}
