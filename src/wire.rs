use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::{parse_actor, KinderSlotAuthSource};
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{self, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, Returning, SqlError};
use crate::tenant::TenantManager;

pub struct KinderSlotHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<KinderSlotQueryParser>,
}

impl KinderSlotHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(KinderSlotQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    fn resolve_actor<C: ClientInfo>(&self, client: &C) -> PgWireResult<Actor> {
        let user = client.metadata().get("user").cloned().unwrap_or_default();
        parse_actor(&user).ok_or_else(|| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "28000".into(),
                format!("unknown user {user:?}: connect as admin, teacher:<id> or parent:<id>"),
            )))
        })
    }

    /// Parse, authorize and execute one statement, recording query metrics.
    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Response> {
        let engine = self.resolve_engine(client)?;
        let actor = self.resolve_actor(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);

        let start = Instant::now();
        let result = self.execute_command(&engine, actor, cmd).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);

        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        actor: Actor,
        cmd: Command,
    ) -> PgWireResult<Response> {
        match cmd {
            Command::PublishAvailability { date, times } => {
                require_admin(actor, "publish availability")?;
                let slots = engine
                    .publish_availability(date, times.as_slice())
                    .await
                    .map_err(engine_err)?;
                tracing::debug!("{date} now has {} slots", slots.len());
                Ok(Response::Execution(Tag::new("INSERT").with_rows(times.len())))
            }
            Command::SelectAvailability { range } => {
                let days = engine.list_availability(range).await;
                let schema = Arc::new(availability_schema());
                let mut rows = Vec::new();
                for day in days {
                    let date = day.date.to_string();
                    for slot in day.slots {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&date)?;
                        encoder.encode_field(&slot.time.to_string())?;
                        encoder.encode_field(&slot.is_booked)?;
                        encoder.encode_field(&slot.is_free)?;
                        rows.push(Ok(encoder.take_row()));
                    }
                }
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SubmitTour { request, returning } => {
                let schema = returning_schema(&returning, tour_schema())?;
                let booking = engine.submit_tour(request).await.map_err(engine_err)?;
                tracing::debug!("{actor} submitted tour {}", booking.id);
                write_response("INSERT", schema, |s| encode_tour(s, &booking))
            }
            Command::ConfirmTour {
                id,
                option,
                returning,
            } => {
                require_admin(actor, "confirm tours")?;
                let schema = returning_schema(&returning, tour_schema())?;
                let booking = engine.confirm_tour(id, option).await.map_err(engine_err)?;
                write_response("UPDATE", schema, |s| encode_tour(s, &booking))
            }
            Command::CompleteTour { id, returning } => {
                require_admin(actor, "complete tours")?;
                let schema = returning_schema(&returning, tour_schema())?;
                let booking = engine.complete_tour(id).await.map_err(engine_err)?;
                write_response("UPDATE", schema, |s| encode_tour(s, &booking))
            }
            Command::CancelTour { id, returning } => {
                require_admin(actor, "cancel tours")?;
                let schema = returning_schema(&returning, tour_schema())?;
                let booking = engine.cancel_tour(id).await.map_err(engine_err)?;
                write_response("DELETE", schema, |s| encode_tour(s, &booking))
            }
            Command::SelectTours { id, status } => {
                let tours = match id {
                    Some(id) => vec![engine.get_tour(&id).await.map_err(engine_err)?],
                    None => engine.list_tours(status).await,
                };
                let schema = Arc::new(tour_schema());
                let rows: Vec<PgWireResult<_>> = tours
                    .iter()
                    .map(|b| encode_tour(&schema, b))
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::RequestAppointment { request, returning } => {
                let schema = returning_schema(&returning, appointment_schema())?;
                let appt = engine.request_appointment(actor, request).await.map_err(engine_err)?;
                tracing::debug!("{actor} requested appointment {}", appt.id);
                write_response("INSERT", schema, |s| encode_appointment(s, &appt))
            }
            Command::RespondToAppointment {
                id,
                action,
                expected,
                returning,
            } => {
                let schema = returning_schema(&returning, appointment_schema())?;
                let appt = engine
                    .respond_to_appointment(id, actor, action, expected)
                    .await
                    .map_err(engine_err)?;
                write_response("UPDATE", schema, |s| encode_appointment(s, &appt))
            }
            Command::DeleteAppointment { id } => {
                engine.delete_appointment(id, actor).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectAppointments { id, filter } => {
                let appointments = match id {
                    Some(id) => {
                        let appt = engine.get_appointment(&id).await.map_err(engine_err)?;
                        if filter.matches(&appt) { vec![appt] } else { vec![] }
                    }
                    None => engine.list_appointments(filter).await,
                };
                let schema = Arc::new(appointment_schema());
                let rows: Vec<PgWireResult<_>> = appointments
                    .iter()
                    .map(|a| encode_appointment(&schema, a))
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::ExportCalendar { teacher_id } => {
                let ics = engine.export_teacher_calendar(teacher_id).await;
                let schema = Arc::new(calendar_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&ics)?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

fn require_admin(actor: Actor, what: &str) -> PgWireResult<()> {
    match actor {
        Actor::Admin => Ok(()),
        other => Err(engine_err(EngineError::Unauthorized(format!(
            "{other} cannot {what}"
        )))),
    }
}

/// Resolve a `RETURNING` list against a record schema before the write runs.
fn returning_schema(
    returning: &Returning,
    full: Vec<FieldInfo>,
) -> PgWireResult<Option<Arc<Vec<FieldInfo>>>> {
    match returning {
        Returning::Nothing => Ok(None),
        _ => project(full, returning).map(|s| Some(Arc::new(s))).map_err(sql_err),
    }
}

fn project(full: Vec<FieldInfo>, returning: &Returning) -> Result<Vec<FieldInfo>, SqlError> {
    match returning {
        Returning::Nothing => Ok(vec![]),
        Returning::All => Ok(full),
        Returning::Columns(columns) => columns
            .iter()
            .map(|c| {
                full.iter()
                    .find(|f| f.name() == c)
                    .cloned()
                    .ok_or_else(|| SqlError::UnknownColumn(c.clone()))
            })
            .collect(),
    }
}

/// A bare command tag, or the written record as one row when `RETURNING` was given.
fn write_response(
    tag: &str,
    schema: Option<Arc<Vec<FieldInfo>>>,
    encode: impl FnOnce(&Arc<Vec<FieldInfo>>) -> PgWireResult<DataRow>,
) -> PgWireResult<Response> {
    let Some(schema) = schema else {
        return Ok(Response::Execution(Tag::new(tag).with_rows(1)));
    };
    let row = encode(&schema)?;
    let mut response = QueryResponse::new(schema, stream::iter(vec![Ok(row)]));
    response.set_command_tag(tag);
    Ok(Response::Query(response))
}

fn unknown_field(name: &str) -> PgWireError {
    sql_err(SqlError::UnknownColumn(name.to_string()))
}

/// Encode the columns `schema` names, in its order.
fn encode_tour(schema: &Arc<Vec<FieldInfo>>, b: &TourBooking) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    for field in schema.iter() {
        match field.name() {
            "id" => encoder.encode_field(&b.id.to_string())?,
            "parent_name" => encoder.encode_field(&b.requester.name)?,
            "email" => encoder.encode_field(&b.requester.email)?,
            "phone" => encoder.encode_field(&b.requester.phone)?,
            "child_name" => encoder.encode_field(&b.child_name)?,
            "notes" => encoder.encode_field(&b.notes)?,
            "preferred_date" => encoder.encode_field(&b.preferred.date.to_string())?,
            "preferred_time" => encoder.encode_field(&b.preferred.time.to_string())?,
            "alternate_date" => encoder.encode_field(&b.alternate.map(|s| s.date.to_string()))?,
            "alternate_time" => encoder.encode_field(&b.alternate.map(|s| s.time.to_string()))?,
            "status" => encoder.encode_field(&b.status.as_str().to_string())?,
            "confirmed_date" => encoder.encode_field(&b.confirmed.map(|s| s.date.to_string()))?,
            "confirmed_time" => encoder.encode_field(&b.confirmed.map(|s| s.time.to_string()))?,
            "created_at" => encoder.encode_field(&b.created_at)?,
            "updated_at" => encoder.encode_field(&b.updated_at)?,
            other => return Err(unknown_field(other)),
        }
    }
    Ok(encoder.take_row())
}

fn encode_appointment(schema: &Arc<Vec<FieldInfo>>, a: &Appointment) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    for field in schema.iter() {
        match field.name() {
            "id" => encoder.encode_field(&a.id.to_string())?,
            "parent_id" => encoder.encode_field(&a.parent_id.to_string())?,
            "student_id" => encoder.encode_field(&a.student_id.to_string())?,
            "teacher_id" => encoder.encode_field(&a.teacher_id.to_string())?,
            "topic" => encoder.encode_field(&a.topic)?,
            "date" => encoder.encode_field(&a.date.to_string())?,
            "time" => encoder.encode_field(&a.time.to_string())?,
            "status" => encoder.encode_field(&a.status.as_str().to_string())?,
            "reason" => encoder.encode_field(&a.reason)?,
            "proposed_date" => encoder.encode_field(&a.proposed.map(|s| s.date.to_string()))?,
            "proposed_time" => encoder.encode_field(&a.proposed.map(|s| s.time.to_string()))?,
            "created_at" => encoder.encode_field(&a.created_at)?,
            "updated_at" => encoder.encode_field(&a.updated_at)?,
            other => return Err(unknown_field(other)),
        }
    }
    Ok(encoder.take_row())
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn typed_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("date"),
        text_field("time"),
        typed_field("is_booked", Type::BOOL),
        typed_field("is_free", Type::BOOL),
    ]
}

fn tour_schema() -> Vec<FieldInfo> {
    let mut fields: Vec<FieldInfo> = [
        "id",
        "parent_name",
        "email",
        "phone",
        "child_name",
        "notes",
        "preferred_date",
        "preferred_time",
        "alternate_date",
        "alternate_time",
        "status",
        "confirmed_date",
        "confirmed_time",
    ]
    .into_iter()
    .map(text_field)
    .collect();
    fields.push(typed_field("created_at", Type::INT8));
    fields.push(typed_field("updated_at", Type::INT8));
    fields
}

fn appointment_schema() -> Vec<FieldInfo> {
    let mut fields: Vec<FieldInfo> = [
        "id",
        "parent_id",
        "student_id",
        "teacher_id",
        "topic",
        "date",
        "time",
        "status",
        "reason",
        "proposed_date",
        "proposed_time",
    ]
    .into_iter()
    .map(text_field)
    .collect();
    fields.push(typed_field("created_at", Type::INT8));
    fields.push(typed_field("updated_at", Type::INT8));
    fields
}

fn calendar_schema() -> Vec<FieldInfo> {
    vec![text_field("ics")]
}

/// Result columns for a statement: the table a SELECT reads, or a write's `RETURNING` list.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    if let Some((table, returning)) = sql::returning_of(sql) {
        let full = match table.as_str() {
            "tour_bookings" => tour_schema(),
            "appointments" => appointment_schema(),
            _ => return vec![],
        };
        return project(full, &returning).unwrap_or_default();
    }
    let upper = sql.to_uppercase();
    if !upper.trim_start().starts_with("SELECT") {
        return vec![];
    }
    if upper.contains("AVAILABILITY") {
        availability_schema()
    } else if upper.contains("TOUR_BOOKINGS") {
        tour_schema()
    } else if upper.contains("APPOINTMENTS") {
        appointment_schema()
    } else if upper.contains("CALENDAR") {
        calendar_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for KinderSlotHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(client, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct KinderSlotQueryParser;

#[async_trait]
impl QueryParser for KinderSlotQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for KinderSlotHandler {
    type Statement = String;
    type QueryParser = KinderSlotQueryParser;

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
        let sql = bind_params(&portal.statement.statement, &portal.parameters);
        self.run(client, &sql).await
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
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

enum SqlPiece<'a> {
    Text(&'a str),
    Param(usize),
}

/// Split SQL into text and `$N` placeholders. Quoted literals stay text.
fn split_placeholders(sql: &str) -> Vec<SqlPiece<'_>> {
    let bytes = sql.as_bytes();
    let mut pieces = Vec::new();
    let (mut start, mut i, mut quoted) = (0, 0, false);
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                quoted = !quoted;
                i += 1;
            }
            b'$' if !quoted => {
                let digits = bytes[i + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
                let end = i + 1 + digits;
                if let Ok(n @ 1..) = sql[i + 1..end].parse::<usize>() {
                    if start < i {
                        pieces.push(SqlPiece::Text(&sql[start..i]));
                    }
                    pieces.push(SqlPiece::Param(n));
                    start = end;
                }
                i = end;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        pieces.push(SqlPiece::Text(&sql[start..]));
    }
    pieces
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    split_placeholders(sql)
        .into_iter()
        .filter_map(|piece| match piece {
            SqlPiece::Param(n) => Some(n),
            SqlPiece::Text(_) => None,
        })
        .max()
        .unwrap_or(0)
}

/// Bind text-format parameters in one pass over the statement; bound values are never rescanned.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    for piece in split_placeholders(sql) {
        match piece {
            SqlPiece::Text(text) => out.push_str(text),
            SqlPiece::Param(n) => match params.get(n - 1) {
                Some(Some(bytes)) => {
                    let text = String::from_utf8_lossy(bytes.as_ref());
                    out.push('\'');
                    out.push_str(&text.replace('\'', "''"));
                    out.push('\'');
                }
                Some(None) => out.push_str("NULL"),
                None => {
                    out.push('$');
                    out.push_str(&n.to_string());
                }
            },
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct KinderSlotFactory {
    handler: Arc<KinderSlotHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<KinderSlotAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl KinderSlotFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = KinderSlotAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(KinderSlotHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for KinderSlotFactory {
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
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(KinderSlotFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    tracing::debug!(kind = e.kind(), "rejected: {e}");
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        e.sqlstate().into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(sql: &str, params: &[Option<&str>]) -> String {
        let params: Vec<Option<&[u8]>> = params.iter().map(|p| p.map(str::as_bytes)).collect();
        bind_params(sql, &params)
    }

    #[test]
    fn bound_values_are_not_rescanned() {
        let sql = bind(
            "INSERT INTO appointments (topic, date) VALUES ($2, $1)",
            &[Some("2025-03-10"), Some("Fee of $1 per term")],
        );
        assert_eq!(
            sql,
            "INSERT INTO appointments (topic, date) VALUES ('Fee of $1 per term', '2025-03-10')"
        );
    }

    #[test]
    fn two_digit_placeholders_and_nulls() {
        let params: Vec<Option<&str>> = (1..=11)
            .map(|i| if i == 2 { None } else { Some("v") })
            .collect();
        let sql = bind("SELECT $1, $2, $11", &params);
        assert_eq!(sql, "SELECT 'v', NULL, 'v'");
    }

    #[test]
    fn quotes_in_values_are_escaped() {
        assert_eq!(bind("VALUES ($1)", &[Some("O'Brien")]), "VALUES ('O''Brien')");
    }

    #[test]
    fn placeholders_inside_literals_stay_text() {
        assert_eq!(count_params("SELECT '$3' WHERE a = $1"), 1);
        assert_eq!(bind("SELECT '$1', $1", &[Some("x")]), "SELECT '$1', 'x'");
    }

    #[test]
    fn count_params_takes_the_highest() {
        assert_eq!(count_params("SELECT * FROM tour_bookings"), 0);
        assert_eq!(count_params("VALUES ($2, $10, $1)"), 10);
    }

    #[test]
    fn returning_projects_the_record_schema() {
        let columns = Returning::Columns(vec!["status".into(), "id".into()]);
        let names: Vec<String> = project(tour_schema(), &columns)
            .unwrap()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["status", "id"]);
        assert_eq!(project(tour_schema(), &Returning::All).unwrap().len(), tour_schema().len());

        let err = project(appointment_schema(), &Returning::Columns(vec!["email".into()])).unwrap_err();
        assert_eq!(err.sqlstate(), "42703");
    }

    #[test]
    fn describe_schema_for_returning_writes() {
        let schema = result_schema("UPDATE appointments SET action = $1 WHERE id = $2 RETURNING id, status");
        assert_eq!(schema.len(), 2);
        assert!(result_schema("UPDATE appointments SET action = $1 WHERE id = $2").is_empty());
        assert_eq!(result_schema("SELECT * FROM tour_bookings").len(), tour_schema().len());
    }
}
