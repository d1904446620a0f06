// ==========================================
// 通用记录引擎 - 内置实体定义
// ==========================================
// 表头以 description 列出，列顺序即字段顺序
// 复制方案:
// - contract: 编号追加时间戳，状态重置为 draft
// - project:  编号追加时间戳，状态重置为 planning
// - product:  编号追加副本序号，下架、库存清零
// - person:   工号追加副本序号，清空手机号
// - user:     用户名追加副本序号，禁用、清空邮箱与最近登录时间
// ==========================================

use crate::domain::field_spec::{EntitySchema, FieldSpec, ImportConfig, SchemaError};
use crate::domain::types::{FieldKind, FieldValue};
use crate::engine::copy_plan::{CopyPlan, SuffixStrategy};
use crate::repository::{RepositoryResult, Session, SqliteRecordRepository};
use std::collections::BTreeMap;
use std::sync::Arc;

// ==========================================
// EntityDefinition - 单个实体
// ==========================================
#[derive(Debug, Clone)]
pub struct EntityDefinition {
    schema: EntitySchema,
    copy_plan: CopyPlan,
    max_import_rows: Option<usize>,
}

impl EntityDefinition {
    pub fn new(schema: EntitySchema, copy_plan: CopyPlan) -> Self {
        Self {
            schema,
            copy_plan,
            max_import_rows: None,
        }
    }

    pub fn with_max_import_rows(mut self, max_rows: usize) -> Self {
        self.max_import_rows = Some(max_rows);
        self
    }

    pub fn entity_name(&self) -> &str {
        self.schema.entity_name()
    }

    pub fn schema(&self) -> &EntitySchema {
        &self.schema
    }

    pub fn copy_plan(&self) -> &CopyPlan {
        &self.copy_plan
    }

    pub fn import_config(&self) -> Result<ImportConfig, SchemaError> {
        let config = self.schema.import_config()?;
        match self.max_import_rows {
            Some(max_rows) => config.with_max_rows(max_rows),
            None => Ok(config),
        }
    }

    pub fn repository(&self) -> Arc<SqliteRecordRepository> {
        Arc::new(SqliteRecordRepository::new(self.schema.clone()))
    }
}

// ==========================================
// EntityCatalog - 实体目录
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entries: BTreeMap<String, EntityDefinition>,
}

impl EntityCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置业务实体
    pub fn builtin() -> Result<Self, SchemaError> {
        let mut catalog = Self::new();
        catalog.register(contract()?);
        catalog.register(project()?);
        catalog.register(product()?);
        catalog.register(person()?);
        catalog.register(user()?);
        Ok(catalog)
    }

    /// 注册实体（同名覆盖）
    pub fn register(&mut self, definition: EntityDefinition) {
        self.entries
            .insert(definition.entity_name().to_string(), definition);
    }

    pub fn get(&self, entity_name: &str) -> Option<&EntityDefinition> {
        self.entries.get(entity_name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// 为全部实体建表（幂等）
    pub fn ensure_tables(&self, session: &Session) -> RepositoryResult<()> {
        let conn = session.get_conn();
        for definition in self.entries.values() {
            conn.execute_batch(&definition.schema.create_table_sql())?;
        }
        Ok(())
    }
}

fn contract() -> Result<EntityDefinition, SchemaError> {
    let schema = EntitySchema::new(
        "contract",
        "contract",
        vec![
            FieldSpec::required("code", FieldKind::String, "合同编号"),
            FieldSpec::required("name", FieldKind::String, "合同名称"),
            FieldSpec::optional("customer", FieldKind::String, "客户名称"),
            FieldSpec::optional("amount", FieldKind::Float, "合同金额"),
            FieldSpec::optional("sign_date", FieldKind::String, "签订日期"),
            FieldSpec::required("status", FieldKind::String, "状态"),
        ],
        &["code"],
    )?;
    let plan = CopyPlan::for_repository(&SqliteRecordRepository::new(schema.clone()))
        .reset("status", "draft");
    Ok(EntityDefinition::new(schema, plan))
}

fn project() -> Result<EntityDefinition, SchemaError> {
    let schema = EntitySchema::new(
        "project",
        "project",
        vec![
            FieldSpec::required("code", FieldKind::String, "项目编号"),
            FieldSpec::required("name", FieldKind::String, "项目名称"),
            FieldSpec::optional("contract_code", FieldKind::String, "关联合同编号"),
            FieldSpec::optional("manager", FieldKind::String, "项目经理"),
            FieldSpec::optional("budget", FieldKind::Float, "预算"),
            FieldSpec::required("status", FieldKind::String, "状态"),
        ],
        &["code"],
    )?;
    let plan = CopyPlan::new().rekey("code").reset("status", "planning");
    Ok(EntityDefinition::new(schema, plan))
}

fn product() -> Result<EntityDefinition, SchemaError> {
    let schema = EntitySchema::new(
        "product",
        "product",
        vec![
            FieldSpec::required("code", FieldKind::String, "产品编号"),
            FieldSpec::required("name", FieldKind::String, "产品名称"),
            FieldSpec::optional("category", FieldKind::String, "类别"),
            FieldSpec::required("price", FieldKind::Float, "单价"),
            FieldSpec::optional("stock", FieldKind::Int, "库存"),
            FieldSpec::optional("on_sale", FieldKind::Bool, "是否上架"),
        ],
        &["code"],
    )?;
    let plan = CopyPlan::new()
        .rekey("code")
        .with_suffix(SuffixStrategy::CopyIndex)
        .reset("on_sale", false)
        .reset("stock", FieldValue::Int(0));
    Ok(EntityDefinition::new(schema, plan).with_max_import_rows(500))
}

fn person() -> Result<EntityDefinition, SchemaError> {
    let schema = EntitySchema::new(
        "person",
        "person",
        vec![
            FieldSpec::required("employee_no", FieldKind::String, "工号"),
            FieldSpec::required("name", FieldKind::String, "姓名"),
            FieldSpec::optional("department", FieldKind::String, "部门"),
            FieldSpec::optional("phone", FieldKind::String, "手机号"),
            FieldSpec::optional("age", FieldKind::Int, "年龄"),
        ],
        &["employee_no"],
    )?;
    let plan = CopyPlan::new()
        .rekey("employee_no")
        .with_suffix(SuffixStrategy::CopyIndex)
        .clear("phone");
    Ok(EntityDefinition::new(schema, plan))
}

fn user() -> Result<EntityDefinition, SchemaError> {
    let schema = EntitySchema::new(
        "user",
        "app_user",
        vec![
            FieldSpec::required("username", FieldKind::String, "用户名"),
            FieldSpec::optional("email", FieldKind::String, "邮箱"),
            FieldSpec::optional("display_name", FieldKind::String, "显示名称"),
            FieldSpec::optional("enabled", FieldKind::Bool, "是否启用"),
            FieldSpec::optional("last_login_at", FieldKind::String, "最近登录时间"),
        ],
        &["username", "email"],
    )?;
    // email 为唯一字段但不追加后缀，直接清空（NULL 不参与唯一约束）
    let plan = CopyPlan::new()
        .rekey("username")
        .with_suffix(SuffixStrategy::CopyIndex)
        .reset("enabled", false)
        .clear("email")
        .clear("last_login_at");
    Ok(EntityDefinition::new(schema, plan))
}
