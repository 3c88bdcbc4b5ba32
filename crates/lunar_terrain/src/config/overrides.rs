//! Dotted-path overrides applied to a loaded configuration tree.
//!
//! An expression reads `a.b.c=value` or `a.list[0].key=value`. Dots separate mapping keys, so
//! axis names such as `sun/elevation` stay single keys. The value is parsed as YAML: `[1, 2]` is a
//! list, `true` a bool, `0.5` a float, `{a: 1}` a mapping and `!include file.yaml` an include tag
//! resolved by the loader afterwards.
use std::fmt;
use std::str::FromStr;

use serde_yaml::Value;

use crate::error::{Error, Result};

/// One step of an override path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, ".{key}"),
            PathSegment::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// A parsed `path=value` override.
#[derive(Clone, Debug, PartialEq)]
pub struct OverrideExpr {
    pub path: Vec<PathSegment>,
    pub value: Value,
}

impl OverrideExpr {
    pub fn parse(expr: &str) -> Result<Self> {
        let (path, value) = expr
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("override '{expr}' has no '='")))?;
        let path = parse_path(path.trim())
            .map_err(|e| Error::Config(format!("override '{expr}': {e}")))?;
        let value: Value = serde_yaml::from_str(value.trim())
            .map_err(|e| Error::Config(format!("override '{expr}': bad value: {e}")))?;
        Ok(Self { path, value })
    }

    /// The path in `a.b[0]` form.
    pub fn path_string(&self) -> String {
        let joined: String = self.path.iter().map(ToString::to_string).collect();
        joined.strip_prefix('.').map(str::to_owned).unwrap_or(joined)
    }

    /// Replace the value at this path. Every segment, the last included, must already exist.
    pub fn apply(&self, root: &mut Value) -> Result<()> {
        let mut node = root;
        for (depth, segment) in self.path.iter().enumerate() {
            let next = match segment {
                PathSegment::Key(key) => node
                    .as_mapping_mut()
                    .and_then(|map| map.get_mut(key.as_str())),
                PathSegment::Index(index) => {
                    node.as_sequence_mut().and_then(|seq| seq.get_mut(*index))
                }
            };
            node = next.ok_or_else(|| {
                let prefix: String = self.path[..=depth].iter().map(ToString::to_string).collect();
                Error::Config(format!(
                    "override path '{}' does not resolve at '{}'",
                    self.path_string(),
                    prefix.trim_start_matches('.')
                ))
            })?;
        }
        *node = self.value.clone();
        Ok(())
    }
}

impl FromStr for OverrideExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn parse_path(path: &str) -> std::result::Result<Vec<PathSegment>, String> {
    if path.is_empty() {
        return Err("empty path".into());
    }
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(i) => part.split_at(i),
            None => (part, ""),
        };
        if key.is_empty() {
            return Err(format!("empty key in '{path}'"));
        }
        segments.push(PathSegment::Key(key.to_owned()));
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| format!("unclosed '[' in '{part}'"))?;
            let index = rest[1..close]
                .trim()
                .parse::<usize>()
                .map_err(|_| format!("bad list index '{}' in '{part}'", &rest[1..close]))?;
            segments.push(PathSegment::Index(index));
            rest = &rest[close + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(format!("unexpected '{rest}' after index in '{part}'"));
            }
        }
    }
    Ok(segments)
}
