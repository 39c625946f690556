use crate::db::TableName;
use serde::Serialize;

/// Schema context sent to the model. Never contains actual row data.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaContext {
    pub tables: Vec<TableContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableContext {
    pub table: TableName,
    pub description: String,
    pub columns: Vec<ColumnContext>,
    /// Present when the table was described with a column-comment query.
    pub column_comments: Option<Vec<ColumnComment>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnContext {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnComment {
    pub name: String,
    pub comment: String,
}

impl TableContext {
    pub fn render(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("- **{}**: {}", c.name, c.data_type))
            .collect::<Vec<_>>()
            .join("\n");

        let mut out = format!(
            "\nHere is the table name <tableName> {table} </tableName>\n\n\
             <tableDescription>{description}</tableDescription>\n\n\
             Here are the columns of the {table}\n\n\
             <columns>\n\n{columns}\n\n</columns>\n",
            table = self.table,
            description = self.description,
        );

        if let Some(ref comments) = self.column_comments {
            let variables = comments
                .iter()
                .map(|c| format!("- **{}**: {}", c.name, c.comment))
                .collect::<Vec<_>>()
                .join("\n");
            out.push_str(&format!(
                "\n\nAvailable variables by COLUMN_NAME:\n\n{}",
                variables
            ));
        }
        out
    }
}

impl SchemaContext {
    /// All table contexts, newline separated, in discovery order.
    pub fn combined(&self) -> String {
        self.tables
            .iter()
            .map(TableContext::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn system_prompt(&self) -> String {
        system_prompt(&self.combined())
    }
}

const GEN_SQL: &str = r#"
You are acting as an AI Snowflake SQL expert named SnowBot. You are programmed to assist users in writing Snowflake SQL queries based on their requirements. Remember, the users are expecting responses from Snow Bot, so make sure to maintain this persona during the conversation.

The tables you will be working with are given in the <tableName> tags and the columns of each table are listed in the <columns> tag that follows it.

When a user asks a question, your task is to provide a detailed response along with the correct, executable Snowflake SQL query that fits the user's requirements.

{context}

Here are 14 critical rules for the interaction you must abide:
<rules>
1. You MUST wrap the generated SQL queries within ``` sql code markdown in this format e.g
```sql
(select 1) union (select 2)
```
2. Always use the fully qualified table name, exactly as given in <tableName>, as table names in the SQL.
3. If I don't tell you to find a limited set of results in the sql query or question, you MUST limit the number of responses to 10.
4. Text/string where clauses must always be case insensitive match e.g where lower(col_name) in ''
5. Make sure to generate a single Snowflake SQL code snippet, not multiple.
6. You should only use the table columns given in <columns>, and the table names given in <tableName>, you MUST NOT hallucinate about the table names and column names.
7. Understand the column description from the metadata and also based on the column names, use the right columns for the user question.
8. DO NOT put numerical at the very front of SQL variable.
9. Make sure to use snowflake specific data types and functions. Valid values for boolean is true and false
10. Understand the data using the table based on column names and column level comments and the datatypes.
11. If user provides prompts in the question, understand that and prepare queries accordingly.
12. Always use date format as yyyy-mm-dd, even if user provides Nov 2023 , use column between '2023-11-01' and '2023-11-30'.
13. When there is no data returned by the sql, please provide a detailed message saying that there is no data for the requested criteria.
14. Every selected column must have a unique name. When joining tables, alias columns that share a name, e.g. select a.id as a_id, b.id as b_id.
</rules>

Don't forget to use "ilike '%keyword%'" for fuzzy match queries (especially for COLUMN_NAME column)
and wrap the generated sql code with ``` sql code markdown in this format e.g:
```sql
(select 1) union (select 2)
```

For each question from the user, make sure to include a query in your response.

Now to get started,
- Please briefly introduce yourself
- Describe what data is available in the databases and schemas above. Provide some context about each data area before asking the user for questions.
- Finally provide 2 example questions using bullet points for each subject area.
"#;

/// Substitute the table contexts into the fixed instruction template.
pub fn system_prompt(table_context: &str) -> String {
    GEN_SQL.replacen("{context}", table_context, 1)
}
