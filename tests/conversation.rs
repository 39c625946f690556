use async_trait::async_trait;
use serde_json::json;
use snowbot_lib::ai::{system_prompt, ChatMessage, ChatModel, FragmentStream};
use snowbot_lib::chat::ConversationDriver;
use snowbot_lib::db::{ColumnDef, Connector, Cursor, QueryResult};
use snowbot_lib::session::{Role, SessionStore};
use snowbot_lib::{Error, Result};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

const LAST_MENTIONS: &str =
    "SELECT MENTION_ID, CHANNEL\nFROM ABC.RAW.MENTIONS\nORDER BY CREATED_AT DESC\nLIMIT 10;";

// ── Fakes ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct MemoryWarehouse {
    answers: Arc<HashMap<String, QueryResult>>,
    executed: Arc<Mutex<Vec<String>>>,
}

struct MemoryCursor(MemoryWarehouse);

#[async_trait]
impl Connector for MemoryWarehouse {
    async fn cursor(&self, _role: Option<&str>) -> Result<Box<dyn Cursor>> {
        Ok(Box::new(MemoryCursor(self.clone())))
    }
}

#[async_trait]
impl Cursor for MemoryCursor {
    async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.0.executed.lock().unwrap().push(sql.to_string());
        self.0.answers.get(sql).cloned().ok_or_else(|| {
            Error::Query("SQL compilation error: syntax error line 1 at position 0".into())
        })
    }
}

struct CannedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl CannedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatModel for CannedModel {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Model("no reply scripted".into()))?;

        // Split on line boundaries to mimic incremental delivery
        let fragments: Vec<Result<String>> = reply
            .split_inclusive('\n')
            .map(|line| Ok(line.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(fragments)))
    }
}

fn mentions() -> QueryResult {
    QueryResult::new(
        vec![
            ColumnDef { name: "MENTION_ID".into(), data_type: "FIXED".into() },
            ColumnDef { name: "CHANNEL".into(), data_type: "TEXT".into() },
        ],
        (1..=10).map(|i| vec![json!(i), json!("news")]).collect(),
    )
}

// ── Scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn question_to_results_through_a_session() {
    let warehouse = MemoryWarehouse {
        answers: Arc::new(HashMap::from([(LAST_MENTIONS.to_string(), mentions())])),
        ..Default::default()
    };
    let model = Arc::new(CannedModel::new(&[
        "Hello! I'm Snow Bot. Ask me about mentions.",
        &format!("Here you go:\n```sql\n{LAST_MENTIONS}\n```\n"),
    ]));
    let driver = ConversationDriver::new(model.clone(), Arc::new(warehouse.clone()));

    let sessions = SessionStore::new();
    let id = sessions
        .create(system_prompt("<tableName>ABC.RAW.MENTIONS</tableName>"))
        .await;
    let session = sessions.get(&id).await.unwrap();
    let mut session = session.lock().await;

    // Opening cycle: the model introduces itself from the system prompt alone
    let intro = driver
        .interact(&mut session.transcript, "", |_| {})
        .await
        .unwrap()
        .unwrap();
    assert!(intro.content.starts_with("Hello!"));
    assert!(warehouse.executed.lock().unwrap().is_empty());

    let mut streamed = String::new();
    let answer = driver
        .interact(&mut session.transcript, "show me the last 10 mentions", |f| {
            streamed.push_str(f)
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(streamed, answer.content);
    let results = answer.results.expect("results attached");
    assert!(results.row_count <= 10);
    assert_eq!(results.columns[0].name, "MENTION_ID");
    assert_eq!(*warehouse.executed.lock().unwrap(), vec![LAST_MENTIONS.to_string()]);

    let visible = session.transcript.visible();
    let roles: Vec<Role> = visible.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);

    let prompts = model.prompts.lock().unwrap();
    assert_eq!(prompts[1][0].role, Role::System);
    assert!(prompts[1][0].content.contains("ABC.RAW.MENTIONS"));
}

#[tokio::test]
async fn failed_query_does_not_end_the_conversation() {
    let warehouse = MemoryWarehouse {
        answers: Arc::new(HashMap::from([(LAST_MENTIONS.to_string(), mentions())])),
        ..Default::default()
    };
    let model = Arc::new(CannedModel::new(&[
        "```sql\nSELEC * FROM ABC.RAW.MENTIONS\n```",
        &format!("Sorry, corrected:\n```sql\n{LAST_MENTIONS}\n```"),
    ]));
    let driver = ConversationDriver::new(model, Arc::new(warehouse));

    let sessions = SessionStore::new();
    let id = sessions.create(system_prompt("")).await;
    let session = sessions.get(&id).await.unwrap();
    let mut session = session.lock().await;

    let broken = driver
        .interact(&mut session.transcript, "latest mentions", |_| {})
        .await
        .unwrap()
        .unwrap();
    assert!(broken.results.is_none());
    assert!(broken
        .error
        .unwrap()
        .starts_with("That query could not be run: SQL compilation error"));

    let fixed = driver
        .interact(&mut session.transcript, "try again", |_| {})
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fixed.results.unwrap().row_count, 10);
    assert!(fixed.error.is_none());

    assert!(sessions.remove(&id).await);
    assert!(matches!(sessions.get(&id).await, Err(Error::SessionNotFound(_))));
}
