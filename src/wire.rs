use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::CalClashAuthSource;
use crate::boundary::{self, CONFLICT_MESSAGE, EventView, SlotView};
use crate::engine::{CheckOutcome, EngineError, Registry};
use crate::observability::{QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::sql::{self, Command, SqlError};
use crate::tenant::{CalendarError, CalendarManager};

const DEFAULT_CALENDAR: &str = "default";

pub struct CalClashHandler {
    calendars: Arc<CalendarManager>,
    query_parser: Arc<CalClashQueryParser>,
}

impl CalClashHandler {
    pub fn new(calendars: Arc<CalendarManager>) -> Self {
        Self {
            calendars,
            query_parser: Arc::new(CalClashQueryParser),
        }
    }

    fn resolve_registry<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Registry>> {
        let calendar = client
            .metadata()
            .get("database")
            .map(String::as_str)
            .unwrap_or(DEFAULT_CALENDAR);
        self.calendars.get_or_create(calendar).map_err(calendar_err)
    }

    async fn run(&self, registry: &Registry, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();

        let result = self.execute_command(registry, cmd).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label).record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, registry: &Registry, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::InsertEvent(req) => {
                let resp = boundary::check_conflicts(registry, req).await.map_err(engine_err)?;
                match resp.conflicts {
                    Some(conflicts) if resp.conflict => Err(conflict_err(&conflicts)),
                    _ => Ok(Response::Execution(Tag::new("INSERT").with_oid(0).with_rows(1))),
                }
            }
            Command::UpdateEvent {
                id,
                start_time,
                end_time,
                participants,
            } => {
                let span = boundary::parse_span(&start_time, &end_time).map_err(engine_err)?;
                let participants = match participants {
                    Some(input) => Some(boundary::participants(input).map_err(engine_err)?),
                    None => None,
                };
                match registry.update(id, span, participants).await.map_err(engine_err)? {
                    CheckOutcome::Accepted { .. } => Ok(Response::Execution(Tag::new("UPDATE").with_rows(1))),
                    CheckOutcome::Conflict { conflicts } => {
                        let views: Vec<EventView> = conflicts.iter().map(EventView::from).collect();
                        Err(conflict_err(&views))
                    }
                }
            }
            Command::DeleteEvent { id } => {
                registry.remove(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectEvents { participant } => {
                let events = registry.events(participant.as_deref()).await;
                let schema = Arc::new(events_schema());
                let rows: Vec<PgWireResult<_>> = events
                    .iter()
                    .map(|event| {
                        let view = EventView::from(event);
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&view.id)?;
                        encoder.encode_field(&view.start_time)?;
                        encoder.encode_field(&view.end_time)?;
                        encoder.encode_field(&view.participants.join(","))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectSuggestions(req) => {
                let resp = boundary::suggest_times(registry, req).await.map_err(engine_err)?;
                let schema = Arc::new(suggestions_schema());
                let rows: Vec<PgWireResult<_>> = resp
                    .suggestions
                    .iter()
                    .map(|SlotView { start_time, end_time }| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(start_time)?;
                        encoder.encode_field(end_time)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn events_schema() -> Vec<FieldInfo> {
    ["id", "start_time", "end_time", "participants"]
        .into_iter()
        .map(text_field)
        .collect()
}

fn suggestions_schema() -> Vec<FieldInfo> {
    vec![text_field("start_time"), text_field("end_time")]
}

/// Row shape of a statement, judged from its text since `$n` placeholders
/// keep it from parsing before the parameters are bound.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.trim_start().starts_with("SELECT") {
        vec![]
    } else if upper.contains("SUGGESTIONS") {
        suggestions_schema()
    } else if upper.contains("EVENTS") {
        events_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for CalClashHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let registry = self.resolve_registry(client)?;
        Ok(vec![self.run(&registry, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CalClashQueryParser;

#[async_trait]
impl QueryParser for CalClashQueryParser {
    type Statement = String;

    async fn parse_sql<C>(&self, _client: &C, sql: &str, _types: &[Option<Type>]) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(&self, stmt: &String, _column_format: Option<&Format>) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for CalClashHandler {
    type Statement = String;
    type QueryParser = CalClashQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let registry = self.resolve_registry(client)?;
        let sql = substitute_params(&portal.statement.statement, &portal.parameters);
        self.run(&registry, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, result_schema(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    sql.split('$')
        .skip(1)
        .filter_map(|rest| {
            let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<usize>().ok()
        })
        .max()
        .unwrap_or(0)
}

/// Inline bound text parameters as quoted literals. `$10` is replaced before `$1`.
fn substitute_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut result = sql.to_string();
    for (i, param) in params.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes.as_ref()).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        result = result.replace(&format!("${}", i + 1), &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CalClashFactory {
    handler: Arc<CalClashHandler>,
    auth_handler: Arc<CleartextPasswordAuthStartupHandler<CalClashAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CalClashFactory {
    pub fn new(calendars: Arc<CalendarManager>, password: String) -> Self {
        Self {
            handler: Arc::new(CalClashHandler::new(calendars)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                CalClashAuthSource::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CalClashFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    calendars: Arc<CalendarManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(CalClashFactory::new(calendars, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

/// The conflict message followed by the colliding events as a JSON array.
fn conflict_message(conflicts: &[EventView]) -> Result<String, serde_json::Error> {
    Ok(format!("{CONFLICT_MESSAGE} {}", serde_json::to_string(conflicts)?))
}

fn conflict_err(conflicts: &[EventView]) -> PgWireError {
    match conflict_message(conflicts) {
        Ok(message) => user_error("23P01", message),
        Err(e) => user_error("XX000", format!("{CONFLICT_MESSAGE} (unserializable conflicts: {e})")),
    }
}

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidInput(_) | EngineError::MalformedInterval { .. } => "22023",
        EngineError::NotFound(_) => "P0002",
        EngineError::LimitExceeded(_) => "54000",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}

fn calendar_err(e: CalendarError) -> PgWireError {
    user_error("08006", format!("calendar error: {e}"))
}
