//! Plugin database
//!
//! Scans the plugin directories, keeps one module record per distinct plugin
//! and answers "which plugin handles this MIME type / extension".

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::PluginSettings;
use crate::error::ModuleError;
use crate::library::{DynamicLibraryProvider, LibraryProvider, is_plugin_file};
use crate::module::PluginModule;
use crate::scheduler::Scheduler;

/// Default search path, in priority order.
pub fn default_plugin_directories() -> Vec<PathBuf> {
    let mut search = Vec::new();

    if let Some(home) = dirs::home_dir() {
        search.push(home.join(".mozilla/plugins"));
        search.push(home.join(".netscape/plugins"));
    }

    search.push(PathBuf::from("/usr/lib/browser-plugins"));
    search.push(PathBuf::from("/usr/lib/mozilla/plugins"));
    search.push(PathBuf::from("/usr/lib64/browser-plugins"));
    search.push(PathBuf::from("/usr/lib/firefox/plugins"));

    if let Some(mozilla_home) = std::env::var_os("MOZILLA_HOME") {
        search.push(PathBuf::from(mozilla_home).join("plugins"));
    }

    if let Ok(paths) = std::env::var("MOZ_PLUGIN_PATH") {
        search.extend(paths.split(':').filter(|p| !p.is_empty()).map(PathBuf::from));
    }

    search
}

/// Directory whose modules win ties with the same MIME type.
pub fn default_preferred_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".mozilla/plugins"))
}

/// Registry of installed plugin modules.
pub struct PluginDatabase {
    enabled: bool,
    directories: Vec<PathBuf>,
    preferred_directory: Option<PathBuf>,
    provider: Rc<dyn LibraryProvider>,
    scheduler: Rc<Scheduler>,
    modules: Vec<Rc<PluginModule>>,
}

impl PluginDatabase {
    pub fn new(settings: &PluginSettings, scheduler: Rc<Scheduler>) -> Self {
        Self::with_provider(settings, Rc::new(DynamicLibraryProvider), scheduler)
    }

    pub fn with_provider(
        settings: &PluginSettings,
        provider: Rc<dyn LibraryProvider>,
        scheduler: Rc<Scheduler>,
    ) -> Self {
        let directories = if settings.plugin_directories.is_empty() {
            default_plugin_directories()
        } else {
            settings.plugin_directories.clone()
        };
        let preferred_directory = settings
            .preferred_directory
            .clone()
            .or_else(default_preferred_directory);

        Self {
            enabled: settings.enabled,
            directories,
            preferred_directory,
            provider,
            scheduler,
            modules: Vec::new(),
        }
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }

    pub fn plugins(&self) -> &[Rc<PluginModule>] {
        &self.modules
    }

    /// Rescan every directory. Returns the number of modules found.
    pub fn refresh(&mut self) -> usize {
        if !self.enabled {
            self.modules.clear();
            tracing::info!("Plugins disabled, skipping scan");
            return 0;
        }

        let mut modules: Vec<Rc<PluginModule>> = Vec::new();
        let mut seen_paths = HashSet::new();
        let mut seen_plugins = HashSet::new();

        for dir in &self.directories {
            for path in plugin_files(dir) {
                let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
                if !seen_paths.insert(canonical) {
                    continue;
                }

                // Keep a loaded record rather than opening the library again.
                if let Some(existing) = self.modules.iter().find(|m| m.path() == path && m.is_loaded()) {
                    if seen_plugins.insert(existing.identity()) {
                        modules.push(existing.clone());
                    }
                    continue;
                }

                match PluginModule::create(&path, self.provider.clone(), self.scheduler.clone()) {
                    Ok(module) => {
                        if seen_plugins.insert(module.identity()) {
                            modules.push(module);
                        } else {
                            tracing::debug!("Skipping duplicate plugin {}", path.display());
                        }
                    }
                    Err(ModuleError::NotAPlugin(_)) => {
                        tracing::debug!("{} is not a plugin", path.display());
                    }
                    Err(err) => {
                        tracing::warn!("Rejected plugin {}: {}", path.display(), err);
                    }
                }
            }
        }

        self.modules = modules;
        tracing::info!(
            "Plugin database: {} plugins in {} directories",
            self.modules.len(),
            self.directories.len()
        );
        self.modules.len()
    }

    /// Best module for a MIME type.
    pub fn plugin_for_mime(&self, mime_type: &str) -> Option<Rc<PluginModule>> {
        let preferred = self.preferred_directory.as_deref();
        self.modules
            .iter()
            .filter(|m| m.handles_mime(mime_type))
            .min_by(|a, b| rank(a, b, preferred))
            .cloned()
    }

    /// Best module for a file extension, with the MIME type it registered.
    pub fn plugin_for_extension(&self, extension: &str) -> Option<(Rc<PluginModule>, String)> {
        let preferred = self.preferred_directory.as_deref();
        self.modules
            .iter()
            .filter_map(|m| m.mime_for_extension(extension).map(|mime| (m, mime)))
            .min_by(|(a, _), (b, _)| rank(a, b, preferred))
            .map(|(module, mime)| (module.clone(), mime.to_string()))
    }

    pub fn mime_for_extension(&self, extension: &str) -> Option<String> {
        self.plugin_for_extension(extension).map(|(_, mime)| mime)
    }

    pub fn is_mime_registered(&self, mime_type: &str) -> bool {
        self.modules.iter().any(|m| m.handles_mime(mime_type))
    }
}

impl std::fmt::Debug for PluginDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDatabase")
            .field("directories", &self.directories)
            .field("modules", &self.modules.len())
            .finish()
    }
}

fn rank(a: &PluginModule, b: &PluginModule, preferred: Option<&Path>) -> Ordering {
    a.compare(b, preferred)
}

/// Shared libraries directly inside `dir`, sorted by name.
fn plugin_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_plugin_file(path))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_directories_override_defaults() {
        let settings = PluginSettings {
            plugin_directories: vec![PathBuf::from("/opt/plugins")],
            preferred_directory: Some(PathBuf::from("/opt/plugins")),
            ..Default::default()
        };
        let db = PluginDatabase::new(&settings, Rc::new(Scheduler::system()));
        assert_eq!(db.directories(), &[PathBuf::from("/opt/plugins")]);
    }

    #[test]
    fn test_defaults_include_system_directories() {
        let dirs = default_plugin_directories();
        assert!(dirs.contains(&PathBuf::from("/usr/lib/mozilla/plugins")));
    }

    #[test]
    fn test_refresh_skips_non_plugins() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        fs::write(dir.path().join("libbroken.so"), b"not an elf").unwrap();

        let settings = PluginSettings {
            plugin_directories: vec![dir.path().to_path_buf()],
            ..Default::default()
        };
        let mut db = PluginDatabase::new(&settings, Rc::new(Scheduler::system()));
        assert_eq!(db.refresh(), 0);
        assert!(!db.is_mime_registered("application/x-shockwave-flash"));
        assert!(db.plugin_for_mime("application/x-shockwave-flash").is_none());
    }
}
