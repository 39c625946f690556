use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not connect to Snowflake: {0}")]
    Connection(String),

    #[error("invalid table name `{0}`: expected DATABASE.SCHEMA.TABLE")]
    InvalidTableName(String),

    #[error("table {0} has no catalog entry")]
    TableNotFound(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("model request failed: {0}")]
    Model(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no chat session with id {0}")]
    SessionNotFound(String),
}

impl From<snowflake_connector_rs::Error> for Error {
    fn from(e: snowflake_connector_rs::Error) -> Self {
        Error::Query(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Model(e.to_string())
    }
}
