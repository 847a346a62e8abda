//! Endpoint registry: the per-device namespace and the process-wide debug entry
//!
//! Layout under the root namespace:
//!
//! ```text
//! ndiswrapper/
//! ├── debug            (optional, read/write)
//! └── <iface>/
//!     ├── hw           (read)
//!     ├── stats        (read)
//!     ├── encr         (read)
//!     └── settings     (read/write)
//! ```
//!
//! A device directory keeps whatever entries were created even if a later
//! sibling failed; `remove_device` copes with such partial directories and
//! is safe to call more than once. Removal waits for in-flight reads and
//! writes on that directory, and later ones are rejected.

use ndisproc_core::Device;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, error, info};

use crate::command::write_settings;
use crate::debug::DebugLevel;
use crate::error::ProcError;
use crate::report::{
    render_encr, render_hw, render_settings, render_stats, EntryRead, ReportWriter,
};

/// Name of the root namespace
pub const ROOT_NAME: &str = "ndiswrapper";

/// Name of the process-wide debug entry
pub const DEBUG_ENTRY: &str = "debug";

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Owner applied to every directory and entry
    pub uid: u32,
    pub gid: u32,
    /// Create the root-level `debug` entry
    pub debug_entry: bool,
    /// Upper bound on directories plus entries in the whole tree
    pub max_entries: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            uid: 0,
            gid: 0,
            debug_entry: true,
            max_entries: 64,
        }
    }
}

/// Kinds of entries the registry serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Hw,
    Stats,
    Encr,
    Settings,
    Debug,
}

impl EntryKind {
    /// Entries created in every device directory, in creation order
    pub const DEVICE_ENTRIES: [EntryKind; 4] = [Self::Hw, Self::Stats, Self::Encr, Self::Settings];

    pub fn name(self) -> &'static str {
        match self {
            Self::Hw => "hw",
            Self::Stats => "stats",
            Self::Encr => "encr",
            Self::Settings => "settings",
            Self::Debug => DEBUG_ENTRY,
        }
    }

    pub fn writable(self) -> bool {
        matches!(self, Self::Settings | Self::Debug)
    }

    /// Permission bits: owner and group only
    pub fn mode(self) -> u32 {
        if self.writable() {
            0o660
        } else {
            0o440
        }
    }
}

/// Owner of a directory or entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

/// Metadata of one created entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub kind: EntryKind,
    pub mode: u32,
    pub owner: Ownership,
}

impl EntryInfo {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

struct DeviceDir {
    device: Arc<Device>,
    entries: Vec<EntryInfo>,
    /// Cleared on removal; operations hold it shared while they run
    live: RwLock<bool>,
}

impl DeviceDir {
    fn entry(&self, name: &str) -> Option<&EntryInfo> {
        self.entries.iter().find(|e| e.name() == name)
    }
}

struct Root {
    debug_entry: Option<EntryInfo>,
    dirs: BTreeMap<String, Arc<DeviceDir>>,
}

impl Root {
    fn entry_count(&self) -> usize {
        let files: usize = self.dirs.values().map(|d| d.entries.len()).sum();
        self.dirs.len() + files + usize::from(self.debug_entry.is_some())
    }
}

enum Target {
    Debug,
    Device(Arc<DeviceDir>, EntryKind),
}

/// All endpoints exposed by this process
pub struct Registry {
    config: RegistryConfig,
    debug: Arc<DebugLevel>,
    root: RwLock<Option<Root>>,
}

impl Registry {
    /// Create the root namespace and, if configured, the debug entry
    pub fn init(config: RegistryConfig, debug: Arc<DebugLevel>) -> Result<Self, ProcError> {
        let owner = Ownership {
            uid: config.uid,
            gid: config.gid,
        };
        let debug_entry = if config.debug_entry {
            if config.max_entries == 0 {
                error!(entry = DEBUG_ENTRY, "Couldn't create entry");
                return Err(ProcError::EntryLimit(config.max_entries));
            }
            Some(EntryInfo {
                kind: EntryKind::Debug,
                mode: EntryKind::Debug.mode(),
                owner,
            })
        } else {
            None
        };

        info!(root = ROOT_NAME, debug_entry = config.debug_entry, "Created root namespace");
        Ok(Self {
            config,
            debug,
            root: RwLock::new(Some(Root {
                debug_entry,
                dirs: BTreeMap::new(),
            })),
        })
    }

    /// Registry whose root namespace could not be created
    pub fn without_root(config: RegistryConfig, debug: Arc<DebugLevel>) -> Self {
        Self {
            config,
            debug,
            root: RwLock::new(None),
        }
    }

    pub fn debug_level(&self) -> &Arc<DebugLevel> {
        &self.debug
    }

    pub fn has_root(&self) -> bool {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Create the directory and entries for one device
    ///
    /// Fails immediately without a root. If an entry cannot be created the
    /// directory keeps the siblings created before it; the caller is
    /// expected to call `remove_device`.
    pub fn add_device(&self, device: Arc<Device>) -> Result<(), ProcError> {
        let mut guard = self.root.write().unwrap_or_else(PoisonError::into_inner);
        let root = guard.as_mut().ok_or(ProcError::NoRoot)?;
        let name = device.name().to_string();

        if name.is_empty() || name.contains('/') || name == DEBUG_ENTRY {
            return Err(ProcError::InvalidInput(format!("bad directory name '{}'", name)));
        }
        if root.dirs.contains_key(&name) {
            error!(device = %name, "Couldn't create directory");
            return Err(ProcError::AlreadyExists(name));
        }

        let mut used = root.entry_count();
        if used >= self.config.max_entries {
            error!(device = %name, "Couldn't create directory");
            return Err(ProcError::EntryLimit(self.config.max_entries));
        }
        used += 1;

        let owner = Ownership {
            uid: self.config.uid,
            gid: self.config.gid,
        };
        let mut entries = Vec::with_capacity(EntryKind::DEVICE_ENTRIES.len());
        let mut result = Ok(());
        for kind in EntryKind::DEVICE_ENTRIES {
            if used >= self.config.max_entries {
                error!(device = %name, entry = kind.name(), "Couldn't create entry");
                result = Err(ProcError::EntryLimit(self.config.max_entries));
                break;
            }
            entries.push(EntryInfo {
                kind,
                mode: kind.mode(),
                owner,
            });
            used += 1;
        }

        root.dirs.insert(
            name.clone(),
            Arc::new(DeviceDir {
                device,
                entries,
                live: RwLock::new(true),
            }),
        );
        if result.is_ok() {
            info!(device = %name, "Registered device endpoints");
        }
        result
    }

    /// Remove a device directory and everything in it
    ///
    /// Waits for operations already running on the directory. Returns
    /// whether anything was removed.
    pub fn remove_device(&self, name: &str) -> bool {
        let dir = {
            let mut guard = self.root.write().unwrap_or_else(PoisonError::into_inner);
            match guard.as_mut() {
                Some(root) => root.dirs.remove(name),
                None => None,
            }
        };
        match dir {
            Some(dir) => {
                retire(&dir);
                info!(device = %name, entries = dir.entries.len(), "Removed device endpoints");
                true
            }
            None => false,
        }
    }

    /// Tear down every directory, the debug entry, and the root
    pub fn remove(&self) {
        let root = self
            .root
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(root) = root {
            for dir in root.dirs.values() {
                retire(dir);
            }
            info!(root = ROOT_NAME, devices = root.dirs.len(), "Removed root namespace");
        }
    }

    /// Names of registered device directories
    pub fn devices(&self) -> Vec<String> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|root| root.dirs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Entries present in a device directory
    pub fn entries(&self, device: &str) -> Option<Vec<EntryInfo>> {
        let guard = self.root.read().unwrap_or_else(PoisonError::into_inner);
        let dir = guard.as_ref()?.dirs.get(device)?;
        Some(dir.entries.clone())
    }

    /// The device registered under `name`
    pub fn device(&self, name: &str) -> Option<Arc<Device>> {
        let guard = self.root.read().unwrap_or_else(PoisonError::into_inner);
        let dir = guard.as_ref()?.dirs.get(name)?;
        Some(dir.device.clone())
    }

    /// Read an entry by path (`"debug"` or `"<iface>/<entry>"`)
    pub fn read(&self, path: &str, offset: u64, capacity: usize) -> Result<EntryRead, ProcError> {
        let target = self.resolve(path)?;
        self.read_target(path, target, offset, capacity)
    }

    fn read_target(
        &self,
        path: &str,
        target: Target,
        offset: u64,
        capacity: usize,
    ) -> Result<EntryRead, ProcError> {
        match target {
            Target::Debug => {
                if offset != 0 {
                    return Ok(EntryRead::eof());
                }
                let mut w = ReportWriter::new(capacity);
                w.line(format_args!("{}", self.debug.get()));
                Ok(w.finish(ROOT_NAME, DEBUG_ENTRY))
            }
            Target::Device(dir, kind) => {
                let live = dir.live.read().unwrap_or_else(PoisonError::into_inner);
                if !*live {
                    return Err(ProcError::Removed(path.to_string()));
                }
                if offset != 0 {
                    return Ok(EntryRead::eof());
                }
                let device = dir.device.as_ref();
                let read = match kind {
                    EntryKind::Hw => render_hw(device, capacity),
                    EntryKind::Stats => render_stats(device, capacity),
                    EntryKind::Encr => render_encr(device, capacity),
                    EntryKind::Settings => render_settings(device, capacity),
                    EntryKind::Debug => return Err(ProcError::NotFound(path.to_string())),
                };
                Ok(read)
            }
        }
    }

    /// Write to an entry by path, returning the bytes consumed
    pub fn write(&self, path: &str, input: &[u8]) -> Result<usize, ProcError> {
        let target = self.resolve(path)?;
        self.write_target(path, target, input)
    }

    fn write_target(&self, path: &str, target: Target, input: &[u8]) -> Result<usize, ProcError> {
        match target {
            Target::Debug => self.debug.write(input),
            Target::Device(dir, kind) => {
                if !kind.writable() {
                    return Err(ProcError::PermissionDenied(path.to_string()));
                }
                let live = dir.live.read().unwrap_or_else(PoisonError::into_inner);
                if !*live {
                    return Err(ProcError::Removed(path.to_string()));
                }
                let result = write_settings(&dir.device, input, &self.debug);
                if let Err(e) = &result {
                    debug!(path = %path, error = %e, "Settings write rejected");
                }
                result
            }
        }
    }

    fn resolve(&self, path: &str) -> Result<Target, ProcError> {
        let not_found = || ProcError::NotFound(path.to_string());
        let guard = self.root.read().unwrap_or_else(PoisonError::into_inner);
        let root = guard.as_ref().ok_or_else(not_found)?;

        let path = path.trim_matches('/');
        match path.split_once('/') {
            None if path == DEBUG_ENTRY && root.debug_entry.is_some() => Ok(Target::Debug),
            None => Err(not_found()),
            Some((iface, entry)) => {
                let dir = root.dirs.get(iface).ok_or_else(not_found)?;
                let info = dir.entry(entry).ok_or_else(not_found)?;
                Ok(Target::Device(dir.clone(), info.kind))
            }
        }
    }
}

/// Mark a directory dead once every in-flight operation has finished
fn retire(dir: &DeviceDir) {
    let mut live = dir.live.write().unwrap_or_else(PoisonError::into_inner);
    *live = false;
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.remove();
    }
}
