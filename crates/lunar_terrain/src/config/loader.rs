//! Reading job configurations from disk.
//!
//! `!include <path>` nodes are replaced by the parsed file, resolved relative to the including
//! file. Override expressions are applied to the merged tree before it is deserialized.
use std::path::{Path, PathBuf};

use serde_yaml::Value;
use tracing::debug;

use crate::config::overrides::OverrideExpr;
use crate::config::DatasetConfig;
use crate::error::{Error, Result};

/// Nesting limit for `!include` chains; deeper chains are reported as cycles.
const MAX_INCLUDE_DEPTH: usize = 16;

/// Loads a YAML job configuration with includes and command-line overrides.
#[derive(Clone, Debug)]
pub struct ConfigLoader {
    path: PathBuf,
    overrides: Vec<OverrideExpr>,
}

impl ConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            overrides: Vec::new(),
        }
    }

    /// Parse override expressions. Malformed ones fail here, before anything is read.
    pub fn with_overrides<I, S>(mut self, exprs: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for expr in exprs {
            self.overrides.push(OverrideExpr::parse(expr.as_ref())?);
        }
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn overrides(&self) -> &[OverrideExpr] {
        &self.overrides
    }

    /// The merged configuration tree: includes resolved, overrides applied.
    pub fn load_value(&self) -> Result<Value> {
        let base_dir = parent_dir(&self.path);
        let mut root = read_yaml(&self.path)?;
        resolve_includes(&mut root, &base_dir, 0)?;
        for expr in &self.overrides {
            debug!("Applying override {} = {:?}", expr.path_string(), expr.value);
            expr.apply(&mut root)?;
        }
        // Overrides may themselves carry `!include` values.
        resolve_includes(&mut root, &base_dir, 0)?;
        Ok(root)
    }

    /// Load, deserialize and validate the configuration.
    pub fn load(&self) -> Result<DatasetConfig> {
        let config: DatasetConfig = serde_yaml::from_value(self.load_value()?).map_err(|e| {
            Error::Config(format!("{}: {e}", self.path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }
}

fn read_yaml(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

/// Replace every `!include <path>` node with the parsed content of that file.
pub fn resolve_includes(value: &mut Value, base_dir: &Path, depth: usize) -> Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(Error::Config(format!(
            "!include nested deeper than {MAX_INCLUDE_DEPTH} levels under {}",
            base_dir.display()
        )));
    }
    match value {
        Value::Tagged(tagged) if tagged.tag == "!include" => {
            let target = tagged.value.as_str().ok_or_else(|| {
                Error::Config(format!("!include expects a file path, got {:?}", tagged.value))
            })?;
            let path = base_dir.join(target);
            debug!("Including {}", path.display());
            let mut included = read_yaml(&path)?;
            resolve_includes(&mut included, &parent_dir(&path), depth + 1)?;
            *value = included;
        }
        Value::Tagged(tagged) => resolve_includes(&mut tagged.value, base_dir, depth)?,
        Value::Mapping(map) => {
            for (_, child) in map.iter_mut() {
                resolve_includes(child, base_dir, depth)?;
            }
        }
        Value::Sequence(seq) => {
            for child in seq.iter_mut() {
                resolve_includes(child, base_dir, depth)?;
            }
        }
        _ => {}
    }
    Ok(())
}
