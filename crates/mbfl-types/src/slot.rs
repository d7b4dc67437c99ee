//! Execution slot identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// One (machine, core) execution unit in the worker topology.
///
/// Slots never share mutable filesystem state: every slot works inside
/// its own directory tree derived from [`SlotId::core_dir`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId {
    /// Machine hostname (or `localhost` in local mode).
    pub machine: String,
    /// Core index on that machine.
    pub core: u32,
    /// Home directory on the machine, used to root remote paths.
    pub home_dir: PathBuf,
}

impl SlotId {
    pub fn new(machine: impl Into<String>, core: u32, home_dir: impl Into<PathBuf>) -> Self {
        Self {
            machine: machine.into(),
            core,
            home_dir: home_dir.into(),
        }
    }

    /// The slot's private working directory under the experiment
    /// working-env root: `<working_env>/<machine>/core<core>`.
    pub fn core_dir(&self, working_env_dir: &std::path::Path) -> PathBuf {
        working_env_dir
            .join(&self.machine)
            .join(format!("core{}", self.core))
    }

    /// Directory holding artifacts assigned to this slot for a stage.
    pub fn assigned_works_dir(&self, working_env_dir: &std::path::Path, stage: &str) -> PathBuf {
        self.core_dir(working_env_dir)
            .join(format!("{stage}-assigned_works"))
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:core{}", self.machine, self.core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn slot_directories_are_partitioned() {
        let a = SlotId::new("worker1", 0, "/home/exp");
        let b = SlotId::new("worker1", 1, "/home/exp");
        let root = Path::new("/data/working_env");
        assert_ne!(a.core_dir(root), b.core_dir(root));
        assert_eq!(
            a.assigned_works_dir(root, "usable_selection"),
            Path::new("/data/working_env/worker1/core0/usable_selection-assigned_works")
        );
    }
}
