// ==========================================
// 通用记录引擎 - 通用记录仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 按 EntitySchema 读写任意实体表（read / write / write_many）
// 约束: 所有值参数化绑定；表名与列名在 EntitySchema 构造时已校验
// ==========================================

use crate::domain::field_spec::EntitySchema;
use crate::domain::types::{FieldKind, FieldMap, FieldValue, Record, RecordId};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

// ==========================================
// RecordRepository Trait
// ==========================================
// 用途: 复制引擎 / 导入器所依赖的实体能力接口
// 实现者: SqliteRecordRepository（每种实体一个实例）
pub trait RecordRepository: Send + Sync {
    fn schema(&self) -> &EntitySchema;

    fn entity_name(&self) -> &str {
        self.schema().entity_name()
    }

    /// 复制时需要重新生成的唯一字段
    fn unique_fields(&self) -> &[String] {
        self.schema().unique_fields()
    }

    /// 按主键读取（字段不含主键）
    fn read(&self, conn: &Connection, id: RecordId) -> RepositoryResult<Option<Record>>;

    /// 写入一条新记录，返回带新主键的记录
    fn write(&self, conn: &Connection, fields: &FieldMap) -> RepositoryResult<Record>;

    /// 批量写入，返回值与输入一一对应（顺序一致）
    fn write_many(&self, conn: &Connection, rows: &[FieldMap]) -> RepositoryResult<Vec<Record>>;
}

// ==========================================
// SqliteRecordRepository - SQLite 实现
// ==========================================
pub struct SqliteRecordRepository {
    schema: EntitySchema,
    select_sql: String,
    insert_sql: String,
}

impl SqliteRecordRepository {
    pub fn new(schema: EntitySchema) -> Self {
        let columns: Vec<&str> = schema.fields().iter().map(|f| f.name.as_str()).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

        let select_sql = format!(
            "SELECT id, {} FROM {} WHERE id = ?1",
            columns.join(", "),
            schema.table_name()
        );
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
            schema.table_name(),
            columns.join(", "),
            placeholders.join(", ")
        );

        Self {
            schema,
            select_sql,
            insert_sql,
        }
    }

    /// 建表（幂等）
    pub fn ensure_table(&self, conn: &Connection) -> RepositoryResult<()> {
        conn.execute_batch(&self.schema.create_table_sql())?;
        Ok(())
    }

    /// 记录总数
    pub fn count(&self, conn: &Connection) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.schema.table_name());
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// 按字段值查找主键（字段名须在 schema 中声明）
    pub fn find_ids_by_field(
        &self,
        conn: &Connection,
        field: &str,
        value: &FieldValue,
    ) -> RepositoryResult<Vec<RecordId>> {
        if self.schema.field(field).is_none() {
            return Err(RepositoryError::FieldValueError {
                field: field.to_string(),
                message: format!("{} 未声明该字段", self.schema.entity_name()),
            });
        }

        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?1 ORDER BY id",
            self.schema.table_name(),
            field
        );
        let mut stmt = conn.prepare(&sql)?;
        let ids = stmt
            .query_map(params![value], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids.into_iter().map(RecordId).collect())
    }

    /// 按 schema 规整字段: 拒绝未知字段/类型不符，补齐缺省为 NULL
    fn normalize(&self, fields: &FieldMap) -> RepositoryResult<FieldMap> {
        if let Some(unknown) = fields.keys().find(|k| self.schema.field(k).is_none()) {
            return Err(RepositoryError::FieldValueError {
                field: unknown.clone(),
                message: format!("{} 未声明该字段", self.schema.entity_name()),
            });
        }

        let mut normalized = FieldMap::new();
        for spec in self.schema.fields() {
            let value = fields.get(&spec.name).cloned().unwrap_or(FieldValue::Null);
            let value = match (spec.kind, value) {
                (_, FieldValue::Null) if spec.required => {
                    return Err(RepositoryError::FieldValueError {
                        field: spec.name.clone(),
                        message: "必填字段不能为空".to_string(),
                    })
                }
                (_, FieldValue::Null) => FieldValue::Null,
                (FieldKind::String, v @ FieldValue::String(_)) => v,
                (FieldKind::Int, v @ FieldValue::Int(_)) => v,
                (FieldKind::Float, FieldValue::Int(i)) => FieldValue::Float(i as f64),
                (FieldKind::Float, v @ FieldValue::Float(_)) => v,
                (FieldKind::Bool, v @ FieldValue::Bool(_)) => v,
                (kind, other) => {
                    return Err(RepositoryError::FieldValueError {
                        field: spec.name.clone(),
                        message: format!("期望 {} 类型，实际值 {}", kind, other),
                    })
                }
            };
            normalized.insert(spec.name.clone(), value);
        }
        Ok(normalized)
    }

    fn insert_normalized(&self, conn: &Connection, fields: FieldMap) -> RepositoryResult<Record> {
        let mut stmt = conn.prepare_cached(&self.insert_sql)?;
        let values = self
            .schema
            .fields()
            .iter()
            .map(|spec| fields.get(&spec.name).unwrap_or(&FieldValue::Null));
        let id: i64 = stmt.query_row(params_from_iter(values), |row| row.get(0))?;

        Ok(Record {
            id: RecordId(id),
            fields,
        })
    }
}

impl RecordRepository for SqliteRecordRepository {
    fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    fn read(&self, conn: &Connection, id: RecordId) -> RepositoryResult<Option<Record>> {
        let mut stmt = conn.prepare_cached(&self.select_sql)?;
        let record = stmt
            .query_row(params![id.0], |row| {
                let mut fields = FieldMap::new();
                for (idx, spec) in self.schema.fields().iter().enumerate() {
                    let value = FieldValue::from_sql_ref(row.get_ref(idx + 1)?, spec.kind);
                    fields.insert(spec.name.clone(), value);
                }
                Ok(Record {
                    id: RecordId(row.get(0)?),
                    fields,
                })
            })
            .optional()?;
        Ok(record)
    }

    fn write(&self, conn: &Connection, fields: &FieldMap) -> RepositoryResult<Record> {
        let normalized = self.normalize(fields)?;
        self.insert_normalized(conn, normalized)
    }

    fn write_many(&self, conn: &Connection, rows: &[FieldMap]) -> RepositoryResult<Vec<Record>> {
        // 先整体校验，避免写入半批后才发现坏行
        let normalized = rows
            .iter()
            .map(|fields| self.normalize(fields))
            .collect::<RepositoryResult<Vec<_>>>()?;

        normalized
            .into_iter()
            .map(|fields| self.insert_normalized(conn, fields))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::field_spec::FieldSpec;

    fn contract_repo(conn: &Connection) -> SqliteRecordRepository {
        let schema = EntitySchema::new(
            "contract",
            "contract",
            vec![
                FieldSpec::required("code", FieldKind::String, "合同编号"),
                FieldSpec::optional("amount", FieldKind::Float, "金额"),
                FieldSpec::optional("archived", FieldKind::Bool, "归档"),
            ],
            &["code"],
        )
        .unwrap();
        let repo = SqliteRecordRepository::new(schema);
        repo.ensure_table(conn).unwrap();
        repo
    }

    fn fields(code: &str) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert("code".to_string(), FieldValue::from(code));
        fields.insert("amount".to_string(), FieldValue::Int(12));
        fields.insert("archived".to_string(), FieldValue::Bool(true));
        fields
    }

    #[test]
    fn test_write_then_read() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = contract_repo(&conn);

        let written = repo.write(&conn, &fields("HT001")).unwrap();
        let read = repo.read(&conn, written.id).unwrap().unwrap();

        assert_eq!(read, written);
        assert_eq!(read.get("amount"), Some(&FieldValue::Float(12.0)));
        assert_eq!(read.get("archived"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_read_missing_returns_none() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = contract_repo(&conn);
        assert!(repo.read(&conn, RecordId(42)).unwrap().is_none());
    }

    #[test]
    fn test_write_fills_missing_optional_with_null() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = contract_repo(&conn);

        let mut only_code = FieldMap::new();
        only_code.insert("code".to_string(), FieldValue::from("HT002"));
        let record = repo.write(&conn, &only_code).unwrap();

        assert_eq!(record.get("amount"), Some(&FieldValue::Null));
        assert_eq!(
            repo.read(&conn, record.id).unwrap().unwrap().get("archived"),
            Some(&FieldValue::Null)
        );
    }

    #[test]
    fn test_write_rejects_unknown_and_mistyped_fields() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = contract_repo(&conn);

        let mut unknown = fields("HT003");
        unknown.insert("password".to_string(), FieldValue::from("x"));
        assert!(matches!(
            repo.write(&conn, &unknown),
            Err(RepositoryError::FieldValueError { .. })
        ));

        let mut mistyped = fields("HT003");
        mistyped.insert("archived".to_string(), FieldValue::from("yes"));
        assert!(matches!(
            repo.write(&conn, &mistyped),
            Err(RepositoryError::FieldValueError { .. })
        ));
    }

    #[test]
    fn test_write_many_returns_ids_in_input_order() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = contract_repo(&conn);

        let records = repo
            .write_many(&conn, &[fields("B"), fields("A"), fields("C")])
            .unwrap();

        let codes: Vec<_> = records
            .iter()
            .map(|r| r.get("code").and_then(|v| v.as_str()).unwrap().to_string())
            .collect();
        assert_eq!(codes, vec!["B", "A", "C"]);
        assert_eq!(repo.count(&conn).unwrap(), 3);
        assert_eq!(
            repo.find_ids_by_field(&conn, "code", &FieldValue::from("A")).unwrap(),
            vec![records[1].id]
        );
    }

    #[test]
    fn test_unique_violation_surfaces() {
        let conn = crate::db::open_in_memory().unwrap();
        let repo = contract_repo(&conn);

        repo.write(&conn, &fields("DUP")).unwrap();
        assert!(matches!(
            repo.write(&conn, &fields("DUP")),
            Err(RepositoryError::UniqueConstraintViolation(_))
        ));
    }
}
