//! Plugin modules
//!
//! A [`PluginModule`] is one plugin library on disk together with the MIME
//! types it claims. Creating one opens the library just long enough to read
//! its capability description. Instances then share it through a load count:
//! the first [`PluginModule::load`] binds the library and exchanges function
//! tables, and the teardown after the last [`PluginModule::unload`] runs on a
//! later scheduler turn, never inside the call that released it.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::ffi::{CStr, c_char, c_void};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::ptr;
use std::rc::{Rc, Weak};

use fos_npapi::*;

use crate::error::{ModuleError, NpError};
use crate::host_funcs;
use crate::library::{EntryPoints, LibraryProvider, NativeLibrary};
use crate::mime::{MimeEntry, ModuleVersion, parse_mime_description};
use crate::quirks::{ModuleIdentity, QuirkSet, determine_quirks};
use crate::scheduler::{Scheduler, TaskId};

/// Live binding of a loaded module.
struct Binding {
    entry_points: EntryPoints,
    plugin_funcs: Box<NPPluginFuncs>,
    // The plugin may keep this pointer until shutdown.
    _host_funcs: Box<NPNetscapeFuncs>,
    // Declared last: entry points must not outlive the library.
    _library: Box<dyn NativeLibrary>,
}

/// A plugin library and its declared capabilities.
pub struct PluginModule {
    self_ref: Weak<PluginModule>,
    path: PathBuf,
    file_name: String,
    name: String,
    description: String,
    mime_types: Vec<MimeEntry>,
    version: ModuleVersion,
    quirks: QuirkSet,
    provider: Rc<dyn LibraryProvider>,
    scheduler: Rc<Scheduler>,
    binding: RefCell<Option<Binding>>,
    load_count: Cell<u32>,
    teardown_task: Cell<Option<TaskId>>,
}

impl PluginModule {
    /// Read a module's capabilities. Fails if the library is not a plugin.
    pub fn create(
        path: &Path,
        provider: Rc<dyn LibraryProvider>,
        scheduler: Rc<Scheduler>,
    ) -> Result<Rc<Self>, ModuleError> {
        let library = provider.open(path)?;
        let entry_points = library.entry_points()?;

        // SAFETY: entry points come from the library, which is alive here.
        let mime_description = unsafe { c_string((entry_points.get_mime_description)()) }
            .ok_or_else(|| ModuleError::NotAPlugin(path.to_path_buf()))?;
        let mime_types = parse_mime_description(&mime_description);
        if mime_types.is_empty() {
            return Err(ModuleError::NotAPlugin(path.to_path_buf()));
        }

        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = path
            .file_stem()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        let name = plugin_string(&entry_points, NPPV_PLUGIN_NAME_STRING).unwrap_or(stem);
        let description = plugin_string(&entry_points, NPPV_PLUGIN_DESCRIPTION_STRING).unwrap_or_default();
        let version = ModuleVersion::parse(&description).unwrap_or_default();

        let quirks = mime_types.iter().fold(QuirkSet::NONE, |acc, entry| {
            acc | determine_quirks(&ModuleIdentity {
                mime_type: &entry.mime_type,
                file_name: &file_name,
                name: &name,
                version,
            })
        });

        drop(library);
        tracing::debug!(
            "Plugin module {} ({}) handles {} MIME types, quirks {:?}",
            name,
            path.display(),
            mime_types.len(),
            quirks.names()
        );

        Ok(Rc::new_cyclic(|weak| Self {
            self_ref: weak.clone(),
            path: path.to_path_buf(),
            file_name,
            name,
            description,
            mime_types,
            version,
            quirks,
            provider,
            scheduler,
            binding: RefCell::new(None),
            load_count: Cell::new(0),
            teardown_task: Cell::new(None),
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn parent_directory(&self) -> Option<&Path> {
        self.path.parent()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mime_types(&self) -> &[MimeEntry] {
        &self.mime_types
    }

    pub fn handles_mime(&self, mime_type: &str) -> bool {
        self.mime_entry(mime_type).is_some()
    }

    pub fn mime_entry(&self, mime_type: &str) -> Option<&MimeEntry> {
        self.mime_types
            .iter()
            .find(|e| e.mime_type.eq_ignore_ascii_case(mime_type))
    }

    pub fn extensions_for(&self, mime_type: &str) -> Option<&[String]> {
        self.mime_entry(mime_type).map(|e| e.extensions.as_slice())
    }

    pub fn description_for(&self, mime_type: &str) -> Option<&str> {
        self.mime_entry(mime_type).map(|e| e.description.as_str())
    }

    /// MIME type registered for a file extension.
    pub fn mime_for_extension(&self, extension: &str) -> Option<&str> {
        self.mime_types
            .iter()
            .find(|e| e.extensions.iter().any(|ext| ext.eq_ignore_ascii_case(extension)))
            .map(|e| e.mime_type.as_str())
    }

    pub fn version(&self) -> ModuleVersion {
        self.version
    }

    pub fn quirks(&self) -> QuirkSet {
        self.quirks
    }

    pub fn load_count(&self) -> u32 {
        self.load_count.get()
    }

    /// Library bound and initialized.
    pub fn is_loaded(&self) -> bool {
        self.binding.borrow().is_some()
    }

    /// Teardown scheduled but not yet run.
    pub fn is_teardown_pending(&self) -> bool {
        self.teardown_task.get().is_some()
    }

    /// Copy of the plugin's function table, if loaded.
    pub fn plugin_funcs(&self) -> Option<NPPluginFuncs> {
        self.binding.borrow().as_ref().map(|b| *b.plugin_funcs)
    }

    /// Take one load reference, binding the library on first use.
    pub fn load(&self) -> Result<(), ModuleError> {
        if self.quirks.has(QuirkSet::DONT_ALLOW_MULTIPLE_INSTANCES) && self.load_count.get() > 0 {
            tracing::warn!("{} refuses a second instance", self.name);
            return Err(ModuleError::MultipleInstances);
        }

        if let Some(task) = self.teardown_task.take() {
            self.scheduler.cancel(task);
            tracing::debug!("Reusing live binding of {}", self.name);
        }

        if !self.is_loaded() {
            let binding = self.bind()?;
            *self.binding.borrow_mut() = Some(binding);
        }

        self.load_count.set(self.load_count.get() + 1);
        Ok(())
    }

    /// Drop one load reference. The last one schedules teardown.
    pub fn unload(&self) {
        let count = self.load_count.get();
        if count == 0 {
            return;
        }
        self.load_count.set(count - 1);
        if count > 1 || !self.is_loaded() || self.teardown_task.get().is_some() {
            return;
        }

        let weak = self.self_ref.clone();
        let task = self.scheduler.post(move || {
            if let Some(module) = weak.upgrade() {
                module.teardown_task.set(None);
                module.teardown();
            }
        });
        self.teardown_task.set(Some(task));
    }

    fn bind(&self) -> Result<Binding, ModuleError> {
        let library = self.provider.open(&self.path)?;
        let entry_points = library.entry_points()?;

        let mut host_funcs = Box::new(host_funcs::netscape_funcs());
        let mut plugin_funcs = Box::new(NPPluginFuncs::default());

        // SAFETY: the tables are heap allocated and moved into the binding,
        // so the pointers stay valid for as long as the library is bound.
        let code = unsafe { initialize(&entry_points, &mut host_funcs, &mut plugin_funcs) };
        if let Err(err) = NpError::from_code(code) {
            tracing::warn!("{} failed to initialize: {}", self.name, err);
            return Err(ModuleError::InitializeFailed(err));
        }

        let (major, minor) = split_version(plugin_funcs.version);
        if major > NP_VERSION_MAJOR {
            tracing::warn!("{} has incompatible table version {}.{}", self.name, major, minor);
            // SAFETY: initialize succeeded, so shutdown is allowed.
            unsafe { (entry_points.shutdown)() };
            return Err(ModuleError::IncompatibleVersion { major });
        }

        tracing::debug!("Loaded plugin {} (table {}.{})", self.name, major, minor);
        Ok(Binding {
            entry_points,
            plugin_funcs,
            _host_funcs: host_funcs,
            _library: library,
        })
    }

    fn teardown(&self) {
        if self.load_count.get() > 0 {
            return;
        }
        let binding = self.binding.borrow_mut().take();
        if let Some(binding) = binding {
            // SAFETY: the library is still bound.
            let code = unsafe { (binding.entry_points.shutdown)() };
            if code != NPERR_NO_ERROR {
                tracing::warn!("{} shutdown returned {}", self.name, code);
            }
            drop(binding);
            tracing::debug!("Unloaded plugin {}", self.name);
        }
    }

    /// Key deciding whether two records describe the same plugin, e.g. one
    /// library reached through a symlink.
    pub fn identity(&self) -> ModuleKey {
        let mut mime_types: Vec<String> = self.mime_types.iter().map(|e| e.mime_type.clone()).collect();
        mime_types.sort();
        ModuleKey {
            name: self.name.clone(),
            description: self.description.clone(),
            mime_types,
        }
    }

    pub fn equal(&self, other: &PluginModule) -> bool {
        self.identity() == other.identity()
    }

    pub fn hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.identity().hash(&mut hasher);
        hasher.finish()
    }

    /// Rank two modules claiming the same MIME type. `Less` means `self` is
    /// preferred.
    pub fn compare(&self, other: &PluginModule, preferred_directory: Option<&Path>) -> Ordering {
        let multi = |m: &PluginModule| !m.quirks.has(QuirkSet::DONT_ALLOW_MULTIPLE_INSTANCES);
        let preferred = |m: &PluginModule| preferred_directory.is_some_and(|dir| m.parent_directory() == Some(dir));

        multi(other)
            .cmp(&multi(self))
            .then_with(|| preferred(other).cmp(&preferred(self)))
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| other.version.cmp(&self.version))
            .then_with(|| self.path.cmp(&other.path))
    }
}

impl Drop for PluginModule {
    fn drop(&mut self) {
        if let Some(task) = self.teardown_task.take() {
            self.scheduler.cancel(task);
        }
        if let Some(binding) = self.binding.get_mut().take() {
            // SAFETY: the library is still bound.
            unsafe { (binding.entry_points.shutdown)() };
        }
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("path", &self.path)
            .field("name", &self.name)
            .field("mime_types", &self.mime_types)
            .field("quirks", &self.quirks)
            .field("load_count", &self.load_count.get())
            .finish()
    }
}

/// Identity used to dedupe module records.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    pub name: String,
    pub description: String,
    pub mime_types: Vec<String>,
}

/// Exchange function tables with the plugin.
///
/// # Safety
/// The entry points must belong to a live library and the tables must stay
/// valid while it is bound.
#[cfg(all(unix, not(target_os = "macos")))]
unsafe fn initialize(
    entry_points: &EntryPoints,
    host_funcs: &mut NPNetscapeFuncs,
    plugin_funcs: &mut NPPluginFuncs,
) -> NPError {
    unsafe { (entry_points.initialize)(host_funcs, plugin_funcs) }
}

/// # Safety
/// As above.
#[cfg(not(all(unix, not(target_os = "macos"))))]
unsafe fn initialize(
    entry_points: &EntryPoints,
    host_funcs: &mut NPNetscapeFuncs,
    plugin_funcs: &mut NPPluginFuncs,
) -> NPError {
    let Some(get_entry_points) = entry_points.get_entry_points else {
        return NPERR_INVALID_FUNCTABLE_ERROR;
    };
    unsafe {
        let code = get_entry_points(plugin_funcs);
        if code != NPERR_NO_ERROR {
            return code;
        }
        (entry_points.initialize)(host_funcs)
    }
}

/// Query a string value through the module-level `NP_GetValue`.
fn plugin_string(entry_points: &EntryPoints, variable: NPPVariable) -> Option<String> {
    let get_value = entry_points.get_value?;
    let mut value: *const c_char = ptr::null();
    // SAFETY: the string variables write a `const char*` through `value`.
    let code = unsafe { get_value(ptr::null_mut(), variable, &mut value as *mut *const c_char as *mut c_void) };
    if code != NPERR_NO_ERROR {
        return None;
    }
    // SAFETY: the plugin returned a NUL-terminated string it owns.
    unsafe { c_string(value) }.filter(|s| !s.is_empty())
}

/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn c_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}
