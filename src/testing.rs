//! In-memory stand-ins for the warehouse and the hosted model.

use crate::ai::{ChatMessage, ChatModel, FragmentStream};
use crate::db::{ColumnDef, Connector, Cursor, QueryResult};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FakeTable {
    database: String,
    schema: String,
    name: String,
    comment: String,
    columns: Vec<(String, String, String)>,
}

#[derive(Default)]
struct Inner {
    tables: Mutex<Vec<FakeTable>>,
    hidden: Mutex<HashSet<String>>,
    scripted: Mutex<HashMap<String, QueryResult>>,
    executed: Mutex<Vec<String>>,
    queries: AtomicUsize,
    refuse_connections: Mutex<bool>,
}

/// Answers the catalog queries issued by introspection and any scripted SQL.
#[derive(Clone, Default)]
pub struct FakeWarehouse {
    inner: Arc<Inner>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(
        self,
        database: &str,
        schema: &str,
        name: &str,
        comment: &str,
        columns: &[(&str, &str, &str)],
    ) -> Self {
        self.inner.tables.lock().unwrap().push(FakeTable {
            database: database.into(),
            schema: schema.into(),
            name: name.into(),
            comment: comment.into(),
            columns: columns
                .iter()
                .map(|(n, t, c)| (n.to_string(), t.to_string(), c.to_string()))
                .collect(),
        });
        self
    }

    pub fn with_result(self, sql: &str, result: QueryResult) -> Self {
        self.inner
            .scripted
            .lock()
            .unwrap()
            .insert(sql.to_string(), result);
        self
    }

    /// Keep the table discoverable but drop its catalog row.
    pub fn hide_description(&self, table: &str) {
        self.inner.hidden.lock().unwrap().insert(table.to_string());
    }

    pub fn refuse_connections(&self) {
        *self.inner.refuse_connections.lock().unwrap() = true;
    }

    pub fn query_count(&self) -> usize {
        self.inner.queries.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.inner.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeWarehouse {
    async fn cursor(&self, _role: Option<&str>) -> Result<Box<dyn Cursor>> {
        if *self.inner.refuse_connections.lock().unwrap() {
            return Err(Error::Connection("390100: incorrect username or password".into()));
        }
        Ok(Box::new(FakeCursor {
            inner: self.inner.clone(),
        }))
    }
}

struct FakeCursor {
    inner: Arc<Inner>,
}

#[async_trait]
impl Cursor for FakeCursor {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.inner.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.executed.lock().unwrap().push(sql.to_string());

        if let Some(scripted) = self.inner.scripted.lock().unwrap().get(sql) {
            return Ok(scripted.clone());
        }

        let tables = self.inner.tables.lock().unwrap();
        let schema = literal_after(sql, "TABLE_SCHEMA = ");
        let name = literal_after(sql, "TABLE_NAME = ");
        let find = || {
            tables
                .iter()
                .find(|t| Some(t.schema.as_str()) == schema && Some(t.name.as_str()) == name)
        };

        if sql.starts_with("SELECT TABLE_NAME FROM") {
            let mut names: Vec<&str> = tables
                .iter()
                .filter(|t| Some(t.schema.as_str()) == schema && sql.contains(&format!("\"{}\"", t.database)))
                .map(|t| t.name.as_str())
                .collect();
            names.sort();
            let rows: Vec<Vec<Value>> = names.into_iter().map(|n| vec![n.into()]).collect();
            return Ok(result(&["TABLE_NAME"], rows));
        }
        if sql.starts_with("SELECT COLUMN_NAME, DATA_TYPE") {
            let rows: Vec<Vec<Value>> = find()
                .map(|t| t.columns.iter().map(|(n, ty, _)| vec![n.as_str().into(), ty.as_str().into()]).collect())
                .unwrap_or_default();
            return Ok(result(&["COLUMN_NAME", "DATA_TYPE"], rows));
        }
        if sql.starts_with("SELECT TABLE_NAME, COMMENT") {
            let hidden = self.inner.hidden.lock().unwrap();
            let rows: Vec<Vec<Value>> = find()
                .filter(|t| !hidden.contains(&t.name))
                .map(|t| vec![vec![t.name.as_str().into(), t.comment.as_str().into()]])
                .unwrap_or_default();
            return Ok(result(&["TABLE_NAME", "COMMENT"], rows));
        }
        if sql.starts_with("SELECT COLUMN_NAME, COMMENT") {
            let rows: Vec<Vec<Value>> = find()
                .map(|t| t.columns.iter().map(|(n, _, c)| vec![n.as_str().into(), c.as_str().into()]).collect())
                .unwrap_or_default();
            return Ok(result(&["COLUMN_NAME", "COMMENT"], rows));
        }

        Err(Error::Query(format!(
            "SQL compilation error: syntax error line 1 at position 0 unexpected '{}'",
            sql.split_whitespace().next().unwrap_or_default()
        )))
    }
}

/// Mimics Snowflake: an empty result carries no column metadata.
pub fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryResult {
    let columns = if rows.is_empty() {
        Vec::new()
    } else {
        columns
            .iter()
            .map(|c| ColumnDef { name: c.to_string(), data_type: "text".into() })
            .collect()
    };
    QueryResult::new(columns, rows)
}

fn literal_after<'a>(sql: &'a str, marker: &str) -> Option<&'a str> {
    let start = sql.find(marker)? + marker.len();
    let rest = sql[start..].strip_prefix('\'')?;
    rest.find('\'').map(|end| &rest[..end])
}

/// Replays scripted replies, one per call, split into fragments.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<Vec<Result<Vec<String>>>>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, fragments: &[&str]) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push(Ok(fragments.iter().map(|f| f.to_string()).collect()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push(Err(Error::Model(message.to_string())));
        self
    }

    /// The transcripts sent so far, one entry per call.
    pub fn seen(&self) -> Vec<Vec<ChatMessage>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(Error::Model("no scripted reply left".into()));
        }
        let fragments = replies.remove(0)?;
        Ok(Box::pin(futures::stream::iter(fragments.into_iter().map(Ok))))
    }
}
