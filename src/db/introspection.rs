use crate::ai::{ColumnComment, ColumnContext, SchemaContext, TableContext};
use crate::config::SchemaRef;
use crate::db::{value_as_text, Connector, Cursor, QueryResult};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A `DATABASE.SCHEMA.TABLE` name, kept as written.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableName {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.trim().split('.').collect();
        match parts.as_slice() {
            [database, schema, table]
                if !database.is_empty() && !schema.is_empty() && !table.is_empty() =>
            {
                Ok(Self {
                    database: database.to_string(),
                    schema: schema.to_string(),
                    table: table.to_string(),
                })
            }
            _ => Err(Error::InvalidTableName(raw.to_string())),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

/// Fully qualified names of every table in `schema`, in catalog order.
pub async fn get_tables(cursor: &mut dyn Cursor, schema: &SchemaRef) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT TABLE_NAME FROM {}.INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = {} ORDER BY TABLE_NAME",
        quote_ident(&schema.database),
        quote_literal(&schema.schema)
    );
    let result = cursor.execute(&sql).await?;

    Ok(text_column(&result, "TABLE_NAME")?
        .into_iter()
        .map(|table| format!("{}.{}.{}", schema.database, schema.schema, table))
        .collect())
}

/// Catalog query listing each column of `table` with its comment.
pub fn column_comments_query(table: &TableName) -> String {
    format!(
        "SELECT COLUMN_NAME, COMMENT FROM {}.INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
        quote_ident(&table.database.to_uppercase()),
        quote_literal(&table.schema.to_uppercase()),
        quote_literal(&table.table.to_uppercase())
    )
}

/// Describe one table from the catalog views.
pub async fn get_table_context(
    cursor: &mut dyn Cursor,
    table_name: &str,
    metadata_query: Option<&str>,
) -> Result<TableContext> {
    let table = TableName::parse(table_name)?;
    let database = table.database.to_uppercase();
    let schema = table.schema.to_uppercase();
    let name = table.table.to_uppercase();

    let columns_sql = format!(
        "SELECT COLUMN_NAME, DATA_TYPE FROM {}.INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
        quote_ident(&database),
        quote_literal(&schema),
        quote_literal(&name)
    );
    let columns = pairs(&cursor.execute(&columns_sql).await?, "COLUMN_NAME", "DATA_TYPE")?
        .into_iter()
        .map(|(name, data_type)| ColumnContext { name, data_type })
        .collect();

    let description_sql = format!(
        "SELECT TABLE_NAME, COMMENT FROM {}.INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_CATALOG = {} AND TABLE_SCHEMA = {} AND TABLE_NAME = {}",
        quote_ident(&database),
        quote_literal(&database),
        quote_literal(&schema),
        quote_literal(&name)
    );
    let description = pairs(&cursor.execute(&description_sql).await?, "TABLE_NAME", "COMMENT")?
        .into_iter()
        .next()
        .map(|(_, comment)| comment)
        .ok_or_else(|| Error::TableNotFound(table.to_string()))?;

    let column_comments = match metadata_query {
        Some(sql) => Some(
            pairs(&cursor.execute(sql).await?, "COLUMN_NAME", "COMMENT")?
                .into_iter()
                .map(|(name, comment)| ColumnComment { name, comment })
                .collect(),
        ),
        None => None,
    };

    Ok(TableContext {
        table,
        description,
        columns,
        column_comments,
    })
}

type CacheKey = (String, Option<String>);

/// Table discovery plus a per-process cache of table contexts.
pub struct SchemaCatalog {
    connector: Arc<dyn Connector>,
    schemas: Vec<SchemaRef>,
    cache: Mutex<HashMap<CacheKey, TableContext>>,
}

impl SchemaCatalog {
    pub fn new(connector: Arc<dyn Connector>, schemas: Vec<SchemaRef>) -> Self {
        Self {
            connector,
            schemas,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn discover_tables(&self) -> Result<Vec<String>> {
        let mut all_tables = Vec::new();
        for schema in &self.schemas {
            let mut cursor = self.connector.cursor(None).await?;
            let tables = get_tables(cursor.as_mut(), schema).await?;
            tracing::debug!(%schema, count = tables.len(), "discovered tables");
            all_tables.extend(tables);
        }
        Ok(all_tables)
    }

    /// Cached per `(table_name, metadata_query)`; a hit issues no catalog query.
    pub async fn table_context(
        &self,
        table_name: &str,
        metadata_query: Option<&str>,
    ) -> Result<TableContext> {
        let key = (table_name.to_string(), metadata_query.map(str::to_string));
        if let Some(ctx) = self.cache.lock().await.get(&key) {
            return Ok(ctx.clone());
        }

        let mut cursor = self.connector.cursor(None).await?;
        let ctx = get_table_context(cursor.as_mut(), table_name, metadata_query).await?;
        self.cache.lock().await.insert(key, ctx.clone());
        Ok(ctx)
    }

    /// Contexts for every discovered table. Tables that vanish between
    /// discovery and description are skipped.
    pub async fn schema_context(&self) -> Result<SchemaContext> {
        let mut tables = Vec::new();

        for table_name in self.discover_tables().await? {
            let metadata_query = match TableName::parse(&table_name) {
                Ok(table) => column_comments_query(&table),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping table");
                    continue;
                }
            };

            match self.table_context(&table_name, Some(&metadata_query)).await {
                Ok(ctx) => tables.push(ctx),
                Err(Error::TableNotFound(name)) => {
                    tracing::warn!(table = %name, "table disappeared from the catalog, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(SchemaContext { tables })
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn text_column(result: &QueryResult, name: &str) -> Result<Vec<String>> {
    if result.rows.is_empty() {
        return Ok(Vec::new());
    }
    let idx = result
        .column_index(name)
        .ok_or_else(|| Error::Query(format!("catalog result has no {} column", name)))?;

    Ok(result
        .rows
        .iter()
        .map(|row| row.get(idx).map(value_as_text).unwrap_or_default())
        .collect())
}

fn pairs(result: &QueryResult, first: &str, second: &str) -> Result<Vec<(String, String)>> {
    let firsts = text_column(result, first)?;
    let seconds = text_column(result, second)?;
    Ok(firsts.into_iter().zip(seconds).collect())
}
