use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use templater::TemplateError;

/// Namespace of view names written without a `namespace:` prefix.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Where view sources come from.
#[derive(Debug, Clone)]
pub enum ViewSource {
    /// `<root>/<name>.<extension>` files, all in the default namespace.
    Directory(PathBuf),
    /// Directories per namespace, searched in order.
    Namespaces(BTreeMap<String, Vec<PathBuf>>),
    /// Sources keyed by normalized view name.
    Memory(BTreeMap<String, String>),
}

/// Split `namespace:view` into its parts. Names without a prefix belong to
/// the default namespace.
pub fn split_namespace(name: &str) -> (&str, &str) {
    match name.split_once(':') {
        Some((namespace, view)) if !namespace.is_empty() => (namespace, view),
        Some((_, view)) => (DEFAULT_NAMESPACE, view),
        None => (DEFAULT_NAMESPACE, name),
    }
}

/// Normalize a view name: `.` and `/` both separate segments and empty
/// segments are dropped, so `layouts.base`, `layouts/base` and
/// `/layouts//base` all name the same view. A `default:` prefix is dropped,
/// other namespaces are kept as `namespace:path`.
pub fn normalize_name(name: &str) -> String {
    let (namespace, view) = split_namespace(name);
    let path = view
        .split(['.', '/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if namespace == DEFAULT_NAMESPACE {
        path
    } else {
        format!("{}:{}", namespace, path)
    }
}

impl ViewSource {
    pub fn memory<I, K, V>(views: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        ViewSource::Memory(
            views
                .into_iter()
                .map(|(name, source)| (normalize_name(name.as_ref()), source.into()))
                .collect(),
        )
    }

    /// Directories rooted at `root`: `root` is the first directory of the
    /// default namespace, and relative paths in `namespaces` are resolved
    /// against it.
    pub fn namespaced(root: &Path, namespaces: &BTreeMap<String, Vec<PathBuf>>) -> Self {
        if namespaces.is_empty() {
            return ViewSource::Directory(root.to_path_buf());
        }

        let mut resolved: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        resolved.insert(DEFAULT_NAMESPACE.to_string(), vec![root.to_path_buf()]);
        for (namespace, dirs) in namespaces {
            let entry = resolved.entry(namespace.clone()).or_default();
            entry.extend(dirs.iter().map(|dir| root.join(dir)));
        }
        ViewSource::Namespaces(resolved)
    }

    /// Read a view, returning a display name for diagnostics and its source.
    pub fn read(&self, name: &str, extension: &str) -> Result<(String, String), TemplateError> {
        match self {
            ViewSource::Directory(root) => {
                let (namespace, view) = split_namespace(name);
                if namespace != DEFAULT_NAMESPACE {
                    return Err(TemplateError::UndefinedView(format!(
                        "{} (unknown namespace '{}')",
                        name, namespace
                    )));
                }
                read_file(name, view, std::slice::from_ref(root), extension)
            }
            ViewSource::Namespaces(namespaces) => {
                let (namespace, view) = split_namespace(name);
                let Some(dirs) = namespaces.get(namespace) else {
                    return Err(TemplateError::UndefinedView(format!(
                        "{} (unknown namespace '{}')",
                        name, namespace
                    )));
                };
                read_file(name, view, dirs, extension)
            }
            ViewSource::Memory(views) => views
                .get(name)
                .map(|source| (name.to_string(), source.clone()))
                .ok_or_else(|| TemplateError::UndefinedView(name.to_string())),
        }
    }
}

/// Read `view` from the first directory that has it.
fn read_file(
    name: &str,
    view: &str,
    dirs: &[PathBuf],
    extension: &str,
) -> Result<(String, String), TemplateError> {
    let file = format!("{}.{}", view, extension);
    let Some(path) = dirs.iter().map(|dir| dir.join(&file)).find(|path| path.is_file()) else {
        let looked: Vec<String> = dirs
            .iter()
            .map(|dir| dir.join(&file).display().to_string())
            .collect();
        return Err(TemplateError::UndefinedView(format!(
            "{} (looked for {})",
            name,
            looked.join(", ")
        )));
    };
    let source = std::fs::read_to_string(&path)
        .map_err(|e| TemplateError::Io(format!("cannot read '{}': {}", path.display(), e)))?;
    Ok((path.display().to_string(), source))
}
