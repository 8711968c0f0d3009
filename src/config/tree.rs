//! Hierarchical configuration tree
//!
//! Values are addressed with dotted key paths. A segment may carry an index
//! to select one of several repeated elements (`servers.server(2).port`) and
//! the last segment may be followed by an attribute (`network.connection[@version]`).
//! All values are stored as strings; typed getters parse leniently and fall
//! back to the supplied default.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ConfigError;

/// Key used to persist the value of a node that also has children or attributes
const VALUE_KEY: &str = "$value";

/// Prefix used to persist attributes
const ATTRIBUTE_PREFIX: char = '@';

/// A node of the configuration tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigNode {
    value: Option<String>,
    attributes: BTreeMap<String, String>,
    children: Vec<(String, ConfigNode)>,
}

impl ConfigNode {
    fn is_empty(&self) -> bool {
        self.value.is_none() && self.attributes.is_empty() && self.children.is_empty()
    }

    fn leaf(value: String) -> Self {
        Self {
            value: Some(value),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    name: String,
    index: Option<usize>,
}

/// Parsed form of a key such as `a.b(1).c[@attr]`
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeyPath {
    segments: Vec<Segment>,
    attribute: Option<String>,
}

impl KeyPath {
    fn parse(key: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidKey(key.to_string());

        let (path, attribute) = match key.find("[@") {
            Some(pos) => {
                let attr = key[pos + 2..].strip_suffix(']').ok_or_else(invalid)?;
                if attr.is_empty() {
                    return Err(invalid());
                }
                (&key[..pos], Some(attr.to_string()))
            }
            None => (key, None),
        };

        let mut segments = Vec::new();
        if !path.is_empty() {
            for part in path.split('.') {
                let segment = match part.find('(') {
                    Some(open) => {
                        let index = part[open + 1..]
                            .strip_suffix(')')
                            .and_then(|i| i.parse::<usize>().ok())
                            .ok_or_else(invalid)?;
                        Segment {
                            name: part[..open].to_string(),
                            index: Some(index),
                        }
                    }
                    None => Segment {
                        name: part.to_string(),
                        index: None,
                    },
                };
                if segment.name.is_empty() {
                    return Err(invalid());
                }
                segments.push(segment);
            }
        }

        if segments.is_empty() && attribute.is_none() {
            return Err(invalid());
        }

        Ok(Self {
            segments,
            attribute,
        })
    }
}

/// Ordered hierarchical store of string values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
    root: ConfigNode,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the tree holds no values at all
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    fn parse_key(key: &str) -> Option<KeyPath> {
        match KeyPath::parse(key) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!("{}", e);
                None
            }
        }
    }

    fn find(&self, path: &KeyPath) -> Vec<&ConfigNode> {
        let mut current: Vec<&ConfigNode> = vec![&self.root];
        for segment in &path.segments {
            let matches: Vec<&ConfigNode> = current
                .iter()
                .flat_map(|node| {
                    node.children
                        .iter()
                        .filter(|(name, _)| *name == segment.name)
                        .map(|(_, child)| child)
                })
                .collect();
            current = match segment.index {
                Some(i) => matches.get(i).copied().into_iter().collect(),
                None => matches,
            };
            if current.is_empty() {
                break;
            }
        }
        current
    }

    fn node_mut_or_create(&mut self, segments: &[Segment]) -> &mut ConfigNode {
        let mut node = &mut self.root;
        for segment in segments {
            let positions: Vec<usize> = node
                .children
                .iter()
                .enumerate()
                .filter(|(_, (name, _))| *name == segment.name)
                .map(|(i, _)| i)
                .collect();
            let pos = match segment.index {
                Some(i) if i < positions.len() => positions[i],
                None if !positions.is_empty() => positions[0],
                _ => {
                    node.children
                        .push((segment.name.clone(), ConfigNode::default()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[pos].1;
        }
        node
    }

    fn visit_mut(node: &mut ConfigNode, segments: &[Segment], f: &mut dyn FnMut(&mut ConfigNode)) {
        let Some((segment, rest)) = segments.split_first() else {
            f(node);
            return;
        };
        let mut seen = 0;
        for (name, child) in node.children.iter_mut() {
            if *name != segment.name {
                continue;
            }
            let selected = segment.index.map_or(true, |i| i == seen);
            seen += 1;
            if selected {
                Self::visit_mut(child, rest, f);
            }
        }
    }

    fn prune(node: &mut ConfigNode) {
        for (_, child) in node.children.iter_mut() {
            Self::prune(child);
        }
        node.children.retain(|(_, child)| !child.is_empty());
    }

    /// Get the first value stored under `key`
    pub fn get_string(&self, key: &str) -> Option<String> {
        let path = Self::parse_key(key)?;
        let nodes = self.find(&path);
        match &path.attribute {
            Some(attr) => nodes.iter().find_map(|n| n.attributes.get(attr).cloned()),
            None => nodes.iter().find_map(|n| n.value.clone()),
        }
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// Get a boolean, accepting true/false, yes/no and on/off
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        match self.get_string(key) {
            Some(value) => match parse_bool(&value) {
                Some(b) => b,
                None => {
                    tracing::warn!("Failed to read '{}', not a boolean: {:?}", key, value);
                    default
                }
            },
            None => default,
        }
    }

    /// Get an integer, falling back to `default` when absent, malformed or out of range
    pub fn get_int_or(&self, key: &str, default: i32) -> i32 {
        match self.get_string(key) {
            Some(value) => match value.trim().parse::<i32>() {
                Ok(i) => i,
                Err(_) => {
                    tracing::warn!("Failed to read '{}', not an integer: {:?}", key, value);
                    default
                }
            },
            None => default,
        }
    }

    /// Get all values stored under `key`
    pub fn get_list(&self, key: &str) -> Vec<String> {
        let Some(path) = Self::parse_key(key) else {
            return Vec::new();
        };
        let nodes = self.find(&path);
        match &path.attribute {
            Some(attr) => nodes
                .iter()
                .filter_map(|n| n.attributes.get(attr).cloned())
                .collect(),
            None => nodes.iter().filter_map(|n| n.value.clone()).collect(),
        }
    }

    /// Whether a value is stored under `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.get_string(key).is_some()
    }

    /// Whether any element (value or sub-tree) exists under `key`
    pub fn has_tree(&self, key: &str) -> bool {
        Self::parse_key(key)
            .map(|path| !self.find(&path).is_empty())
            .unwrap_or(false)
    }

    /// Set the value of `key`, creating intermediate elements as needed
    pub fn set_property<V: ToString>(&mut self, key: &str, value: V) {
        let Some(path) = Self::parse_key(key) else {
            return;
        };
        let value = value.to_string();
        let node = self.node_mut_or_create(&path.segments);
        match path.attribute {
            Some(attr) => {
                node.attributes.insert(attr, value);
            }
            None => node.value = Some(value),
        }
    }

    /// Append a new element named after the last segment of `key`
    pub fn add_property<V: ToString>(&mut self, key: &str, value: V) {
        let Some(path) = Self::parse_key(key) else {
            return;
        };
        if path.attribute.is_some() {
            self.set_property(key, value);
            return;
        }
        let Some((last, parents)) = path.segments.split_last() else {
            return;
        };
        let parent = self.node_mut_or_create(parents);
        parent
            .children
            .push((last.name.clone(), ConfigNode::leaf(value.to_string())));
    }

    /// Replace all elements under `key` with one element per value
    pub fn set_list<V: ToString>(&mut self, key: &str, values: &[V]) {
        self.clear_tree(key);
        for value in values {
            self.add_property(key, value.to_string());
        }
    }

    /// Remove the value (or attribute) stored under `key`
    pub fn clear_property(&mut self, key: &str) {
        let Some(path) = Self::parse_key(key) else {
            return;
        };
        let attribute = path.attribute.clone();
        Self::visit_mut(&mut self.root, &path.segments, &mut |node: &mut ConfigNode| match &attribute {
            Some(attr) => {
                node.attributes.remove(attr);
            }
            None => node.value = None,
        });
        Self::prune(&mut self.root);
    }

    /// Remove every element under `key`, including its sub-trees
    pub fn clear_tree(&mut self, key: &str) {
        let Some(path) = Self::parse_key(key) else {
            return;
        };
        if path.attribute.is_some() {
            self.clear_property(key);
            return;
        }
        let Some((last, parents)) = path.segments.split_last() else {
            return;
        };
        let last = last.clone();
        Self::visit_mut(&mut self.root, parents, &mut |node: &mut ConfigNode| {
            let mut seen = 0;
            node.children.retain(|(name, _)| {
                if *name != last.name {
                    return true;
                }
                let selected = last.index.map_or(true, |i| i == seen);
                seen += 1;
                !selected
            });
        });
    }

    /// Sub-trees for every element matched by `key`
    pub fn configurations_at(&self, key: &str) -> Vec<ConfigTree> {
        let Some(path) = Self::parse_key(key) else {
            return Vec::new();
        };
        self.find(&path)
            .into_iter()
            .map(|node| ConfigTree { root: node.clone() })
            .collect()
    }

    /// Parse a tree from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let table: toml::Table =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(Self {
            root: node_from_table(table),
        })
    }

    /// Serialize the tree as TOML text
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let table = table_from_node(&self.root);
        toml::to_string_pretty(&table).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load a tree from a file, returning an empty tree when the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No configuration file found at {:?}, using defaults", path);
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        let tree = Self::from_toml_str(&contents)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(tree)
    }

    /// Save the tree to a file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::WriteError {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let contents = self.to_toml_string()?;
        std::fs::write(path, contents).map_err(write_error)?;
        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(d) => Some(d.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn node_from_value(value: toml::Value) -> ConfigNode {
    match value {
        toml::Value::Table(table) => node_from_table(table),
        other => ConfigNode {
            value: scalar_to_string(&other),
            ..Default::default()
        },
    }
}

fn push_children(node: &mut ConfigNode, name: &str, value: toml::Value) {
    match value {
        toml::Value::Array(items) => {
            for item in items {
                push_children(node, name, item);
            }
        }
        other => node.children.push((name.to_string(), node_from_value(other))),
    }
}

fn node_from_table(table: toml::Table) -> ConfigNode {
    let mut node = ConfigNode::default();
    for (key, value) in table {
        if key == VALUE_KEY {
            node.value = scalar_to_string(&value);
        } else if let Some(attr) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            if let Some(v) = scalar_to_string(&value) {
                node.attributes.insert(attr.to_string(), v);
            }
        } else {
            push_children(&mut node, &key, value);
        }
    }
    node
}

fn value_from_node(node: &ConfigNode) -> toml::Value {
    if node.children.is_empty() && node.attributes.is_empty() {
        return toml::Value::String(node.value.clone().unwrap_or_default());
    }
    toml::Value::Table(table_from_node(node))
}

fn table_from_node(node: &ConfigNode) -> toml::Table {
    let mut table = toml::Table::new();
    if let Some(value) = &node.value {
        table.insert(VALUE_KEY.to_string(), toml::Value::String(value.clone()));
    }
    for (name, value) in &node.attributes {
        table.insert(
            format!("{}{}", ATTRIBUTE_PREFIX, name),
            toml::Value::String(value.clone()),
        );
    }

    let mut names: Vec<&str> = Vec::new();
    for (name, _) in &node.children {
        if !names.contains(&name.as_str()) {
            names.push(name);
        }
    }
    for name in names {
        let mut values: Vec<toml::Value> = node
            .children
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, child)| value_from_node(child))
            .collect();
        let value = if values.len() == 1 {
            values.remove(0)
        } else {
            toml::Value::Array(values)
        };
        table.insert(name.to_string(), value);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let path = KeyPath::parse("network.servers.server(2).port").unwrap();
        assert_eq!(path.segments.len(), 4);
        assert_eq!(path.segments[2].index, Some(2));
        assert!(path.attribute.is_none());

        let path = KeyPath::parse("network.connection[@version]").unwrap();
        assert_eq!(path.segments.len(), 2);
        assert_eq!(path.attribute.as_deref(), Some("version"));

        assert!(KeyPath::parse("").is_err());
        assert!(KeyPath::parse("a..b").is_err());
        assert!(KeyPath::parse("a.b(x)").is_err());
        assert!(KeyPath::parse("a[@]").is_err());
    }

    #[test]
    fn test_set_and_get() {
        let mut tree = ConfigTree::new();
        tree.set_property("network.connection.timeoutInSecs", 20);
        tree.set_property("network.connection[@version]", 1);

        assert_eq!(tree.get_int_or("network.connection.timeoutInSecs", 0), 20);
        assert_eq!(tree.get_string("network.connection[@version]").as_deref(), Some("1"));
        assert!(tree.contains_key("network.connection.timeoutInSecs"));
        assert!(!tree.contains_key("network.connection.missing"));
    }

    #[test]
    fn test_lenient_getters() {
        let mut tree = ConfigTree::new();
        tree.set_property("a.int", "not a number");
        tree.set_property("a.overflow", "2147483648");
        tree.set_property("a.bool", "maybe");
        tree.set_property("a.yes", "yes");

        assert_eq!(tree.get_int_or("a.int", 7), 7);
        assert_eq!(tree.get_int_or("a.overflow", 7), 7);
        assert!(tree.get_bool_or("a.bool", true));
        assert!(tree.get_bool_or("a.yes", false));
        assert_eq!(tree.get_string_or("a.missing", "x"), "x");
    }

    #[test]
    fn test_repeated_elements() {
        let mut tree = ConfigTree::new();
        tree.add_property("list.item", "a");
        tree.add_property("list.item", "b");
        tree.add_property("list.item", "c");

        assert_eq!(tree.get_list("list.item"), vec!["a", "b", "c"]);
        assert_eq!(tree.get_string("list.item(1)").as_deref(), Some("b"));

        tree.set_property("list.item(1)", "B");
        assert_eq!(tree.get_list("list.item"), vec!["a", "B", "c"]);

        tree.set_list("list.item", &["x"]);
        assert_eq!(tree.get_list("list.item"), vec!["x"]);
    }

    #[test]
    fn test_configurations_at() {
        let mut tree = ConfigTree::new();
        tree.set_property("aliases.alias(0).name", "example.org");
        tree.set_property("aliases.alias(0).enabled", true);
        tree.set_property("aliases.alias(1).name", "example.com");
        tree.set_property("aliases.alias(1).enabled", false);

        let subs = tree.configurations_at("aliases.alias");
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].get_string("name").as_deref(), Some("example.com"));
        assert!(!subs[1].get_bool_or("enabled", true));
    }

    #[test]
    fn test_clear_tree_and_property() {
        let mut tree = ConfigTree::new();
        tree.set_property("connection.timeoutInSecs", 10);
        tree.set_property("connection.proxyChain.enabled", true);
        tree.set_property("other.value", "x");

        tree.clear_property("other.value");
        assert!(!tree.has_tree("other"));

        tree.clear_tree("connection");
        assert!(!tree.has_tree("connection"));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_clear_tree_with_index() {
        let mut tree = ConfigTree::new();
        tree.add_property("list.item", "a");
        tree.add_property("list.item", "b");
        tree.clear_tree("list.item(0)");
        assert_eq!(tree.get_list("list.item"), vec!["b"]);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut tree = ConfigTree::new();
        tree.set_property("network.connection[@version]", 1);
        tree.set_property("network.connection.timeoutInSecs", 20);
        tree.add_property("network.connection.tlsProtocols.protocol", "TLSv1.2");
        tree.add_property("network.connection.tlsProtocols.protocol", "TLSv1.3");
        tree.set_property("network.localServers.aliases.alias(0).name", "a");
        tree.set_property("network.localServers.aliases.alias(1).name", "b");

        let text = tree.to_toml_string().unwrap();
        let loaded = ConfigTree::from_toml_str(&text).unwrap();

        assert_eq!(loaded.get_string("network.connection[@version]").as_deref(), Some("1"));
        assert_eq!(loaded.get_int_or("network.connection.timeoutInSecs", 0), 20);
        assert_eq!(
            loaded.get_list("network.connection.tlsProtocols.protocol"),
            vec!["TLSv1.2", "TLSv1.3"]
        );
        assert_eq!(loaded.configurations_at("network.localServers.aliases.alias").len(), 2);
    }

    #[test]
    fn test_native_toml_values() {
        let text = r#"
            [network.connection]
            "@version" = 1
            timeoutInSecs = 30
            useGlobalHttpState = true
        "#;
        let tree = ConfigTree::from_toml_str(text).unwrap();
        assert_eq!(tree.get_int_or("network.connection[@version]", -1), 1);
        assert_eq!(tree.get_int_or("network.connection.timeoutInSecs", 0), 30);
        assert!(tree.get_bool_or("network.connection.useGlobalHttpState", false));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ConfigTree::from_toml_str("not = [valid"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut tree = ConfigTree::new();
        tree.set_property("a.b", "c");
        tree.save(&path).unwrap();

        let loaded = ConfigTree::load(&path).unwrap();
        assert_eq!(loaded, tree);

        let missing = ConfigTree::load(&dir.path().join("missing.toml")).unwrap();
        assert!(missing.is_empty());
    }
}
