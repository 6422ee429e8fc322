// Database Connections
// Lazy connections with declared-role verification

use crate::db::dsn::Dsn;

use bytes::BytesMut;
use postgres_types::{to_sql_checked, Format, IsNull, ToSql, Type};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, warn};

use std::collections::HashMap;
use std::fmt;

/// Errors from the database boundary.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection {0} does not exist")]
    UnknownConnection(String),
    #[error("connection {name}: expected role {expected} but found {actual}")]
    RoleMismatch {
        name: String,
        expected: Role,
        actual: Role,
    },
    #[error("connection {name}: unrecognized role answer {answer}")]
    BadRoleAnswer { name: String, answer: String },
    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

/// Declared replication role of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Standby,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Standby => write!(f, "standby"),
        }
    }
}

#[derive(Default)]
struct ConnState {
    client: Option<Client>,
    driver: Option<JoinHandle<()>>,
}

/// One configured target connection.
///
/// Connects lazily on first use and reconnects when the session has been
/// closed underneath us. Access is serialized per connection; the engine
/// relies on this layer for that, not the other way around.
#[derive(Default, Serialize, Deserialize)]
pub struct Conn {
    #[serde(default)]
    pub conn_params: Dsn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip)]
    state: Mutex<ConnState>,
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conn")
            .field("conn_params", &self.conn_params)
            .field("role", &self.role)
            .finish()
    }
}

impl Conn {
    pub fn new(conn_params: Dsn, role: Option<Role>) -> Self {
        Self {
            conn_params,
            role,
            state: Mutex::default(),
        }
    }

    /// Run a statement and return each row as one tab-joined line.
    pub async fn query_all(
        &self,
        query: &str,
        params: &[String],
    ) -> Result<Vec<String>, DbError> {
        let mut state = self.state.lock().await;
        let client = Self::ensure_connected(&mut state, &self.conn_params).await?;
        let bound: Vec<TextParam<'_>> = params.iter().map(|p| TextParam(p)).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = client.query(query, &refs).await?;
        Ok(rows.iter().map(row_to_line).collect())
    }

    /// Observe the actual role of the target.
    pub async fn observed_role(&self, name: &str) -> Result<Role, DbError> {
        let answer = self
            .query_all(
                "select case pg_is_in_recovery() when true then 'standby' else 'primary' end",
                &[],
            )
            .await?;
        match answer.first().map(|line| line.as_str()) {
            Some("primary") => Ok(Role::Primary),
            Some("standby") => Ok(Role::Standby),
            other => Err(DbError::BadRoleAnswer {
                name: name.to_string(),
                answer: other.unwrap_or("").to_string(),
            }),
        }
    }

    /// Compare the declared role against the observed one.
    pub async fn verify_role(&self, name: &str) -> Result<(), DbError> {
        let Some(expected) = self.role else {
            return Ok(());
        };
        let actual = self.observed_role(name).await?;
        if actual != expected {
            return Err(DbError::RoleMismatch {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        debug!(connection = name, role = %actual, "role verified");
        Ok(())
    }

    /// Close the session and stop its driver task.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        state.client = None;
        if let Some(driver) = state.driver.take() {
            driver.abort();
        }
    }

    async fn ensure_connected<'a>(
        state: &'a mut ConnState,
        params: &Dsn,
    ) -> Result<&'a Client, DbError> {
        let stale = matches!(&state.client, Some(client) if client.is_closed());
        if stale {
            warn!(target = %params, "connection lost, reconnecting");
            state.client = None;
            if let Some(driver) = state.driver.take() {
                driver.abort();
            }
        }
        if state.client.is_none() {
            debug!(target = %params, "connecting");
            let (client, connection) =
                tokio_postgres::connect(&params.connection_string(), NoTls).await?;
            state.driver = Some(tokio::spawn(async move {
                if let Err(e) = connection.await {
                    warn!(error = %e, "connection driver terminated");
                }
            }));
            state.client = Some(client);
        }
        Ok(state.client.as_ref().expect("client just ensured"))
    }
}

/// Registry of configured connections, keyed by type name.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Connections(pub HashMap<String, Conn>);

impl Connections {
    pub fn get(&self, name: &str) -> Result<&Conn, DbError> {
        self.0
            .get(name)
            .ok_or_else(|| DbError::UnknownConnection(name.to_string()))
    }

    /// The single configured connection, if there is exactly one.
    pub fn sole(&self) -> Option<&str> {
        if self.0.len() == 1 {
            self.0.keys().next().map(|n| n.as_str())
        } else {
            None
        }
    }

    /// Verify every declared role before any work is scheduled.
    pub async fn verify_roles(&self) -> Result<(), DbError> {
        for (name, conn) in &self.0 {
            conn.verify_role(name).await?;
        }
        Ok(())
    }

    pub async fn close_all(&self) {
        for conn in self.0.values() {
            conn.close().await;
        }
    }
}

/// Sends a bound value in text format so the server coerces it to whatever
/// parameter type it inferred, mirroring how string arguments behave in psql.
#[derive(Debug)]
struct TextParam<'a>(&'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// Stringify one row the way the original tooling prints query results.
fn row_to_line(row: &Row) -> String {
    let mut cells = Vec::with_capacity(row.len());
    for idx in 0..row.len() {
        cells.push(cell_to_string(row, idx));
    }
    cells.join("\t")
}

fn cell_to_string(row: &Row, idx: usize) -> String {
    let ty = row.columns()[idx].type_();
    if *ty == Type::BOOL {
        render(row.try_get::<_, Option<bool>>(idx))
    } else if *ty == Type::INT2 {
        render(row.try_get::<_, Option<i16>>(idx))
    } else if *ty == Type::INT4 {
        render(row.try_get::<_, Option<i32>>(idx))
    } else if *ty == Type::INT8 {
        render(row.try_get::<_, Option<i64>>(idx))
    } else if *ty == Type::OID {
        render(row.try_get::<_, Option<u32>>(idx))
    } else if *ty == Type::FLOAT4 {
        render(row.try_get::<_, Option<f32>>(idx))
    } else if *ty == Type::FLOAT8 {
        render(row.try_get::<_, Option<f64>>(idx))
    } else {
        match row.try_get::<_, Option<String>>(idx) {
            Ok(value) => value.unwrap_or_default(),
            // Exotic column types degrade to a marker instead of failing the
            // whole row; operators cast in SQL when they need the value.
            Err(_) => "<unsupported>".to_string(),
        }
    }
}

fn render<T: ToString>(cell: Result<Option<T>, tokio_postgres::Error>) -> String {
    match cell {
        Ok(Some(value)) => value.to_string(),
        Ok(None) => String::new(),
        Err(_) => "<unsupported>".to_string(),
    }
}
