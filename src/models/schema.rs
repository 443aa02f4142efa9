use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 单表的逻辑列名 -> 数据访问层字段名映射
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    pub columns: BTreeMap<String, String>,
}

impl TableSchema {
    pub fn new(table: &str, columns: &[&str]) -> Self {
        Self {
            table: table.to_string(),
            columns: columns
                .iter()
                .map(|c| (c.to_lowercase(), c.to_string()))
                .collect(),
        }
    }

    /// 按逻辑列名 (大小写不敏感) 查找字段
    pub fn field_for(&self, column: &str) -> Option<&str> {
        self.columns.get(&column.to_lowercase()).map(String::as_str)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.columns.values().any(|f| f == field)
    }
}

/// TableSchema 提供者
pub trait SchemaProvider: Send + Sync {
    fn schema(&self, table: &str) -> Option<&TableSchema>;
    fn tables(&self) -> Vec<&TableSchema>;
}

#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableSchema>,
}

impl SchemaRegistry {
    pub fn register(&mut self, schema: TableSchema) {
        self.tables.insert(schema.table.to_lowercase(), schema);
    }

    /// 仓库系统内置表结构
    pub fn warehouse() -> Self {
        let mut registry = Self::default();
        registry.register(TableSchema::new(
            "record_palletinfo",
            &["plt_num", "generate_time", "product_code", "product_qty", "series", "plt_remark", "pdf_url"],
        ));
        registry.register(TableSchema::new(
            "record_history",
            &["uuid", "id", "time", "action", "plt_num", "loc", "remark"],
        ));
        registry.register(TableSchema::new(
            "record_transfer",
            &["uuid", "tran_date", "f_loc", "t_loc", "plt_num", "operator_id"],
        ));
        registry.register(TableSchema::new(
            "record_inventory",
            &[
                "uuid", "product_code", "plt_num", "injection", "pipeline", "prebook", "await",
                "await_grn", "fold", "bulk", "backcarpark", "damage", "latest_update",
            ],
        ));
        registry.register(TableSchema::new(
            "record_grn",
            &[
                "uuid", "grn_ref", "plt_num", "sup_code", "material_code", "gross_weight",
                "net_weight", "pallet", "package", "pallet_count", "package_count", "creat_time",
            ],
        ));
        registry.register(TableSchema::new(
            "record_aco",
            &["uuid", "order_ref", "code", "required_qty", "finished_qty", "latest_update"],
        ));
        registry
    }

    /// 从 JSON 文件加载: { "<table>": { "<logical column>": "<field>" } }
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let raw: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(&text)?;
        let mut registry = Self::default();
        for (table, columns) in raw {
            registry.register(TableSchema {
                table,
                columns: columns
                    .into_iter()
                    .map(|(logical, field)| (logical.to_lowercase(), field))
                    .collect(),
            });
        }
        Ok(registry)
    }
}

impl SchemaProvider for SchemaRegistry {
    fn schema(&self, table: &str) -> Option<&TableSchema> {
        self.tables.get(&table.to_lowercase())
    }

    fn tables(&self) -> Vec<&TableSchema> {
        self.tables.values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = SchemaRegistry::warehouse();
        let schema = registry.schema("RECORD_PALLETINFO").unwrap();
        assert_eq!(schema.field_for("PLT_REMARK"), Some("plt_remark"));
        assert_eq!(schema.field_for("loc"), None);
        assert!(registry.schema("data_code").is_none());
    }

    #[test]
    fn json_file_overrides_mapping() {
        let path = std::env::temp_dir().join(format!("schema-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{ "pallets": { "Remark": "plt_remark" } }"#).unwrap();
        let registry = SchemaRegistry::from_json_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let schema = registry.schema("pallets").unwrap();
        assert_eq!(schema.field_for("remark"), Some("plt_remark"));
        assert!(schema.has_field("plt_remark"));
        assert_eq!(registry.tables().len(), 1);
    }
}
