//! YAML-file object store.
//!
//! # Storage layout
//!
//! ```text
//! <root>/                      (default ~/.clonesync)
//!   namespaces/
//!     <namespace>/
//!       templates/<name>.yaml  (mode 0600)
//!       instances/<name>.yaml  (mode 0600)
//! ```
//!
//! # API pattern
//!
//! [`FileStore::at`] takes an explicit root and is what tests use with a
//! `TempDir`; [`FileStore::from_home`] derives `~/.clonesync` from
//! `dirs::home_dir()`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, StoreError};
use crate::store::ObjectStore;
use crate::types::{Instance, Namespace, ObjectKey, ObjectMeta, ObjectName, Template};

pub const ROOT_DIR: &str = ".clonesync";
pub const NAMESPACES_DIR: &str = "namespaces";
pub const TEMPLATES_DIR: &str = "templates";
pub const INSTANCES_DIR: &str = "instances";

/// Which collection a stored file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Template,
    Instance,
}

impl ObjectClass {
    fn dir_name(self) -> &'static str {
        match self {
            ObjectClass::Template => TEMPLATES_DIR,
            ObjectClass::Instance => INSTANCES_DIR,
        }
    }

    fn kind(self) -> &'static str {
        match self {
            ObjectClass::Template => "template",
            ObjectClass::Instance => "instance",
        }
    }
}

/// Objects kept as one YAML file each under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at `~/.clonesync`.
    pub fn from_home() -> Result<Self, StoreError> {
        let home = dirs::home_dir().ok_or(StoreError::HomeNotFound)?;
        Ok(Self::at(home.join(ROOT_DIR)))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/namespaces`: pure, no I/O.
    pub fn namespaces_root(&self) -> PathBuf {
        self.root.join(NAMESPACES_DIR)
    }

    /// `<root>/namespaces/<ns>/<templates|instances>`: pure, no I/O.
    pub fn class_dir(&self, namespace: &Namespace, class: ObjectClass) -> PathBuf {
        self.namespaces_root().join(&namespace.0).join(class.dir_name())
    }

    /// `<root>/namespaces/<ns>/<templates|instances>/<name>.yaml`: pure, no I/O.
    pub fn object_path(&self, key: &ObjectKey, class: ObjectClass) -> PathBuf {
        self.class_dir(&key.namespace, class)
            .join(format!("{}.yaml", key.name.0))
    }

    /// Map a path inside the store back to the object it holds.
    ///
    /// Returns `None` for anything that is not `<ns>/<class>/<name>.yaml`.
    pub fn classify_path(&self, path: &Path) -> Option<(ObjectClass, ObjectKey)> {
        let relative = path.strip_prefix(self.namespaces_root()).ok()?;
        let parts: Vec<_> = relative.iter().filter_map(|c| c.to_str()).collect();
        let [namespace, class, file] = parts.as_slice() else {
            return None;
        };
        let name = file.strip_suffix(".yaml")?;
        if name.is_empty() {
            return None;
        }
        let class = match *class {
            TEMPLATES_DIR => ObjectClass::Template,
            INSTANCES_DIR => ObjectClass::Instance,
            _ => return None,
        };
        Some((class, ObjectKey::new(*namespace, name)))
    }

    /// Lists the names of all namespace directories, sorted.
    pub fn list_namespaces(&self) -> Result<Vec<Namespace>, StoreError> {
        let dir = self.namespaces_root();
        let mut names: Vec<Namespace> = sorted_entries(&dir)?
            .into_iter()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| Namespace::from(e.file_name().to_string_lossy().into_owned()))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Atomically write a template, creating its directories as needed.
    pub fn save_template(&self, template: &Template) -> Result<(), StoreError> {
        let path = self.object_path(&template.key(), ObjectClass::Template);
        save_atomic(&path, template)
    }

    /// Atomically write an instance without a version check.
    pub fn save_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        let path = self.object_path(&instance.key(), ObjectClass::Instance);
        save_atomic(&path, instance)
    }

    pub fn load_instance(&self, key: &ObjectKey) -> Result<Instance, StoreError> {
        let path = self.object_path(key, ObjectClass::Instance);
        let instance: Instance = load(&path, key, ObjectClass::Instance)?;
        check_location(&path, &instance.metadata, key)?;
        Ok(instance)
    }

    fn list_class<T, F>(
        &self,
        namespace: &Namespace,
        class: ObjectClass,
        meta: F,
    ) -> Result<Vec<T>, StoreError>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> &ObjectMeta,
    {
        let dir = self.class_dir(namespace, class);
        let mut result = Vec::new();
        for entry in sorted_entries(&dir)? {
            let fname = entry.file_name();
            let fname = fname.to_string_lossy();
            let Some(name) = fname.strip_suffix(".yaml") else {
                continue;
            };
            let key = ObjectKey::new(namespace.clone(), ObjectName::from(name));
            let path = entry.path();
            let object: T = load(&path, &key, class)?;
            check_location(&path, meta(&object), &key)?;
            result.push(object);
        }
        Ok(result)
    }
}

impl ObjectStore for FileStore {
    fn get_template(&self, key: &ObjectKey) -> Result<Template, StoreError> {
        let path = self.object_path(key, ObjectClass::Template);
        let template: Template = load(&path, key, ObjectClass::Template)?;
        check_location(&path, &template.metadata, key)?;
        Ok(template)
    }

    fn list_templates(&self, namespace: Option<&Namespace>) -> Result<Vec<Template>, StoreError> {
        let namespaces = match namespace {
            Some(ns) => vec![ns.clone()],
            None => self.list_namespaces()?,
        };
        let mut result = Vec::new();
        for ns in &namespaces {
            result.extend(self.list_class(ns, ObjectClass::Template, |t: &Template| {
                &t.metadata
            })?);
        }
        Ok(result)
    }

    fn list_instances(&self, namespace: &Namespace) -> Result<Vec<Instance>, StoreError> {
        self.list_class(namespace, ObjectClass::Instance, |i: &Instance| &i.metadata)
    }

    fn patch_instance(&self, instance: &Instance) -> Result<Instance, StoreError> {
        let key = instance.key();
        let current = self.load_instance(&key)?;
        if current.metadata.resource_version != instance.metadata.resource_version {
            return Err(StoreError::Conflict {
                key,
                expected: instance.metadata.resource_version,
                found: current.metadata.resource_version,
            });
        }
        let mut stored = instance.clone();
        stored.metadata.resource_version += 1;
        self.save_instance(&stored)?;
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn load<T: DeserializeOwned>(
    path: &Path,
    key: &ObjectKey,
    class: ObjectClass,
) -> Result<T, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(StoreError::NotFound {
                kind: class.kind(),
                key: key.clone(),
            });
        }
        Err(err) => return Err(io_err(path, err)),
    };
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn check_location(path: &Path, meta: &ObjectMeta, key: &ObjectKey) -> Result<(), StoreError> {
    if meta.name == key.name && meta.namespace == key.namespace {
        return Ok(());
    }
    Err(StoreError::Mismatch {
        path: path.to_path_buf(),
        detail: format!("manifest declares {}, file holds {}", meta.key(), key),
    })
}

/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn save_atomic<T: Serialize>(path: &Path, object: &T) -> Result<(), StoreError> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir)?;
    }
    let tmp_path = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(object)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(path, e));
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<std::fs::DirEntry>, StoreError> {
    let read = match std::fs::read_dir(dir) {
        Ok(read) => read,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(io_err(dir, err)),
    };
    let mut entries: Vec<_> = read.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

/// Create `dir` and any missing parents, each with mode `0700`.
fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    if dir.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    set_dir_permissions(dir)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> ObjectKey {
        ObjectKey::new("metal3", "tpl-a")
    }

    #[test]
    fn object_path_is_correct() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        let path = store.object_path(&key(), ObjectClass::Template);
        assert!(path.ends_with("namespaces/metal3/templates/tpl-a.yaml"));
    }

    #[test]
    fn classify_path_roundtrips_object_path() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        let path = store.object_path(&ObjectKey::new("metal3", "m-0"), ObjectClass::Instance);
        assert_eq!(
            store.classify_path(&path),
            Some((ObjectClass::Instance, ObjectKey::new("metal3", "m-0")))
        );
        assert_eq!(store.classify_path(&path.with_extension("yaml.tmp")), None);
        assert_eq!(store.classify_path(&store.namespaces_root().join("metal3")), None);
    }

    #[test]
    fn save_and_get_template_roundtrip() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        let mut template = Template::new("metal3", "tpl-a");
        template.spec.disable_automated_clean = true;
        store.save_template(&template).expect("save");

        let loaded = store.get_template(&key()).expect("load");
        assert_eq!(loaded, template);
    }

    #[test]
    fn namespace_dirs_created_with_perms() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        store
            .save_template(&Template::new("metal3", "tpl-a"))
            .expect("save");
        let dir = store.class_dir(&Namespace::from("metal3"), ObjectClass::Template);
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        store
            .save_template(&Template::new("metal3", "tpl-a"))
            .expect("save");
        let tmp = store
            .object_path(&key(), ObjectClass::Template)
            .with_file_name("tpl-a.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn get_missing_template_returns_not_found() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        let err = store.get_template(&key()).unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
    }

    #[test]
    fn list_on_empty_root_is_empty() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        assert!(store.list_templates(None).expect("list").is_empty());
        assert!(store
            .list_instances(&Namespace::from("metal3"))
            .expect("list")
            .is_empty());
    }

    #[test]
    fn patch_rejects_stale_version() {
        let root = TempDir::new().expect("tempdir");
        let store = FileStore::at(root.path());
        let instance = Instance::new("metal3", "m-0");
        store.save_instance(&instance).expect("save");

        let stored = store.patch_instance(&instance).expect("patch");
        assert_eq!(stored.metadata.resource_version, 1);
        let err = store.patch_instance(&instance).unwrap_err();
        assert!(err.is_conflict(), "got: {err}");
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(StoreError::HomeNotFound.to_string().contains("home directory"));
    }
}
