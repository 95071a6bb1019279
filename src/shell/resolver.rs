//! Command resolution
//!
//! Maps a typed command to an application. Search order, first hit wins:
//! 1. an exact application identifier
//! 2. a path (relative to the working directory) to an installed package
//! 3. the same path with the package suffix appended
//! 4. steps 2-3 under the terminal applications directory
//! 5. steps 2-3 under the system directory
//! 6. a process kind the host already knows by that name

use crate::config::TerminalConfig;
use crate::kernel::host::{AppId, ProcessHost};
use crate::vfs::join_path;
use std::sync::Arc;

pub struct CommandResolver {
    host: Arc<dyn ProcessHost>,
    package_suffix: String,
    working_dir: String,
    roots: Vec<String>,
}

impl CommandResolver {
    pub fn new(host: Arc<dyn ProcessHost>, config: &TerminalConfig) -> Self {
        Self {
            host,
            package_suffix: config.package_suffix.clone(),
            working_dir: config.working_dir.clone(),
            roots: vec![config.terminal_apps_dir.clone(), config.system_dir.clone()],
        }
    }

    /// Resolve `command`, or `None` if nothing matches
    pub fn resolve(&self, command: &str) -> Option<AppId> {
        if command.is_empty() {
            return None;
        }
        if self.host.is_application(command) {
            return Some(AppId::new(command));
        }

        let found = self
            .installed_at(&join_path(&self.working_dir, command))
            .or_else(|| {
                let relative = command.trim_start_matches('/');
                self.roots
                    .iter()
                    .find_map(|root| self.installed_at(&join_path(root, relative)))
            });
        if found.is_some() {
            return found;
        }

        if self.host.is_known_process(command) {
            return Some(AppId::new(command));
        }
        None
    }

    /// Package at `path`, or at `path` plus the suffix
    fn installed_at(&self, path: &str) -> Option<AppId> {
        self.host.application_at(path).or_else(|| {
            if path.ends_with(&self.package_suffix) {
                None
            } else {
                self.host
                    .application_at(&format!("{}{}", path, self.package_suffix))
            }
        })
    }
}
