//! Database object selection trees and the expressions compiled over them.

use serde::{Deserialize, Deserializer, Serialize};

/// Level of a database object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetaType {
    Database,
    Schema,
    Table,
}

/// How a terminal match contributes to a compiled expression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SelectMode {
    /// Only objects selected in full (`isAll`) are emitted.
    #[default]
    Exactly,
    /// Every matching object is emitted.
    Involved,
}

impl<'de> Deserialize<'de> for SelectMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            Some("Involved") => SelectMode::Involved,
            _ => SelectMode::Exactly,
        })
    }
}

/// A node in the Database → Schema → Table selection tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataObject {
    #[serde(rename = "type")]
    pub meta_type: MetaType,
    #[serde(default)]
    pub name: String,
    /// Name used on the sink side, when it differs from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_name: Option<String>,
    #[serde(default)]
    pub is_all: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child: Vec<MetadataObject>,
}

impl MetadataObject {
    pub fn new(meta_type: MetaType, name: impl Into<String>) -> Self {
        Self {
            meta_type,
            name: name.into(),
            mapping_name: None,
            is_all: false,
            child: Vec::new(),
        }
    }

    pub fn all(mut self) -> Self {
        self.is_all = true;
        self
    }

    pub fn mapped_to(mut self, mapping_name: impl Into<String>) -> Self {
        self.mapping_name = Some(mapping_name.into());
        self
    }

    pub fn with_children(mut self, children: Vec<MetadataObject>) -> Self {
        self.child = children;
        self
    }

    /// Name as seen by the side being compiled.
    pub fn effective_name(&self, is_source: bool) -> &str {
        match self.mapping_name.as_deref() {
            Some(mapped) if !is_source && !mapped.is_empty() => mapped,
            _ => &self.name,
        }
    }
}

/// Template projecting a selection tree into a flat setting value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataExpression {
    pub name: String,
    pub meta_type_required: Vec<MetaType>,
    pub meta_type_connect_symbol: String,
    pub meta_obj_connect_symbol: String,
    pub select_mode: SelectMode,
    pub prefix: String,
    pub suffix: String,
}

impl MetadataExpression {
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() || self.meta_type_required.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_mode_defaults_to_exactly() {
        let expr: MetadataExpression =
            serde_json::from_str(r#"{"name":"tables","selectMode":""}"#).unwrap();
        assert_eq!(expr.select_mode, SelectMode::Exactly);

        let expr: MetadataExpression =
            serde_json::from_str(r#"{"name":"tables","selectMode":"Involved"}"#).unwrap();
        assert_eq!(expr.select_mode, SelectMode::Involved);

        let expr: MetadataExpression = serde_json::from_str(r#"{"name":"tables"}"#).unwrap();
        assert_eq!(expr.select_mode, SelectMode::Exactly);
    }

    #[test]
    fn test_effective_name_uses_mapping_on_sink_only() {
        let table = MetadataObject::new(MetaType::Table, "orders").mapped_to("orders_copy");
        assert_eq!(table.effective_name(true), "orders");
        assert_eq!(table.effective_name(false), "orders_copy");

        let unmapped = MetadataObject::new(MetaType::Table, "orders");
        assert_eq!(unmapped.effective_name(false), "orders");
    }

    #[test]
    fn test_metadata_object_from_yaml_shape() {
        let json = r#"{"type":"Database","name":"db1","child":[{"type":"Table","name":"t1","isAll":true}]}"#;
        let obj: MetadataObject = serde_json::from_str(json).unwrap();
        assert_eq!(obj.meta_type, MetaType::Database);
        assert_eq!(obj.child.len(), 1);
        assert!(obj.child[0].is_all);
    }
}
