use chrono::NaiveDate;
use sqlparser::ast::{
    self, AssignmentTarget, BinaryOperator, Expr, FromTable, ObjectNamePart, SelectItem, SetExpr,
    Statement, TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::{ActionKind, AppointmentAction};
use crate::model::*;

/// Record columns a write asks back for with `RETURNING`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Returning {
    #[default]
    Nothing,
    All,
    Columns(Vec<String>),
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    PublishAvailability {
        date: NaiveDate,
        times: Vec<String>,
    },
    SelectAvailability {
        range: DateRange,
    },
    SubmitTour {
        request: TourRequest,
        returning: Returning,
    },
    ConfirmTour {
        id: Ulid,
        option: BookingOption,
        returning: Returning,
    },
    CompleteTour {
        id: Ulid,
        returning: Returning,
    },
    CancelTour {
        id: Ulid,
        returning: Returning,
    },
    SelectTours {
        id: Option<Ulid>,
        status: Option<TourStatus>,
    },
    RequestAppointment {
        request: AppointmentRequest,
        returning: Returning,
    },
    RespondToAppointment {
        id: Ulid,
        action: AppointmentAction,
        expected: Option<AppointmentStatus>,
        returning: Returning,
    },
    DeleteAppointment {
        id: Ulid,
    },
    SelectAppointments {
        id: Option<Ulid>,
        filter: AppointmentFilter,
    },
    ExportCalendar {
        teacher_id: Ulid,
    },
}

const AVAILABILITY_COLUMNS: &[&str] = &["date", "time"];
const TOUR_COLUMNS: &[&str] = &[
    "parent_name",
    "email",
    "phone",
    "child_name",
    "notes",
    "preferred_date",
    "preferred_time",
    "alternate_date",
    "alternate_time",
];
const APPOINTMENT_COLUMNS: &[&str] = &["parent_id", "student_id", "teacher_id", "topic", "date", "time"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            returning,
            ..
        } => parse_update(
            &table.relation,
            assignments,
            selection.as_ref(),
            parse_returning(returning.as_deref())?,
        ),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

/// Target table and `RETURNING` list of a write, read without binding its values.
pub fn returning_of(sql: &str) -> Option<(String, Returning)> {
    let stmts = Parser::parse_sql(&PostgreSqlDialect {}, sql).ok()?;
    let (table, items) = match stmts.first()? {
        Statement::Insert(insert) => (insert_table_name(insert).ok()?, insert.returning.as_deref()),
        Statement::Update {
            table, returning, ..
        } => (table_factor_name(&table.relation).ok()?, returning.as_deref()),
        Statement::Delete(delete) => (delete_table_name(delete).ok()?, delete.returning.as_deref()),
        _ => return None,
    };
    Some((table, parse_returning(items).ok()?))
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_insert_rows(insert)?;
    let named: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    let returning = parse_returning(insert.returning.as_deref())?;

    match table.as_str() {
        "availability" => {
            no_returning("availability", &returning)?;
            let mut date = None;
            let mut times = Vec::with_capacity(rows.len());
            for row in &rows {
                let fields = Fields::from_row("availability", &named, AVAILABILITY_COLUMNS, row)?;
                fields.only(AVAILABILITY_COLUMNS)?;
                let row_date = fields.required_date("date")?;
                if date.is_some_and(|d| d != row_date) {
                    return Err(SqlError::BadValue(
                        "all rows of one publish must share a date".into(),
                    ));
                }
                date = Some(row_date);
                times.push(fields.required_text("time")?);
            }
            let date = date.ok_or_else(|| SqlError::Parse("empty VALUES".into()))?;
            Ok(Command::PublishAvailability { date, times })
        }
        "tour_bookings" => {
            let row = single_row("tour_bookings", &rows)?;
            let f = Fields::from_row("tour_bookings", &named, TOUR_COLUMNS, row)?;
            f.only(TOUR_COLUMNS)?;
            Ok(Command::SubmitTour {
                request: TourRequest {
                    requester: Requester {
                        name: f.required_text("parent_name")?,
                        email: f.required_text("email")?,
                        phone: f.text("phone")?,
                    },
                    child_name: f.required_text("child_name")?,
                    notes: f.text("notes")?,
                    preferred_date: f.required_date("preferred_date")?,
                    preferred_time: f.required_text("preferred_time")?,
                    alternate_date: f.date("alternate_date")?,
                    alternate_time: f.text("alternate_time")?,
                },
                returning,
            })
        }
        "appointments" => {
            let row = single_row("appointments", &rows)?;
            let f = Fields::from_row("appointments", &named, APPOINTMENT_COLUMNS, row)?;
            f.only(APPOINTMENT_COLUMNS)?;
            Ok(Command::RequestAppointment {
                request: AppointmentRequest {
                    parent_id: f.required_ulid("parent_id")?,
                    student_id: f.required_ulid("student_id")?,
                    teacher_id: f.required_ulid("teacher_id")?,
                    topic: f.required_text("topic")?,
                    date: f.required_date("date")?,
                    time: f.required_text("time")?,
                },
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_returning(items: Option<&[SelectItem]>) -> Result<Returning, SqlError> {
    let Some(items) = items else {
        return Ok(Returning::Nothing);
    };
    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        match item {
            SelectItem::Wildcard(_) => return Ok(Returning::All),
            SelectItem::UnnamedExpr(expr) => columns.push(
                expr_column_name(expr)
                    .ok_or_else(|| SqlError::Unsupported(format!("RETURNING {expr}")))?,
            ),
            other => return Err(SqlError::Unsupported(format!("RETURNING {other}"))),
        }
    }
    Ok(Returning::Columns(columns))
}

fn no_returning(what: &str, returning: &Returning) -> Result<(), SqlError> {
    match returning {
        Returning::Nothing => Ok(()),
        _ => Err(SqlError::Unsupported(format!("RETURNING on {what}"))),
    }
}

fn single_row<'a>(table: &'static str, rows: &'a [Vec<Expr>]) -> Result<&'a [Expr], SqlError> {
    match rows {
        [row] => Ok(row.as_slice()),
        _ => Err(SqlError::Unsupported(format!("{table}: one row per INSERT"))),
    }
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: Option<&Expr>,
    returning: Returning,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let f = Fields::from_assignments(&table, assignments)?;
    if f.get("status").is_some() {
        return Err(SqlError::BadValue(
            "status cannot be assigned; set action instead".into(),
        ));
    }
    let action = f.required_text("action")?.to_lowercase();
    let filters = Filters::collect(selection)?;

    match table.as_str() {
        "tour_bookings" => {
            filters.only_eq(&["id"])?;
            let id = filters.required_ulid("id")?;
            match action.as_str() {
                "confirm" => {
                    f.only_for("confirm", &["action", "option"])?;
                    let raw = f.required_text("option")?;
                    let option = BookingOption::parse(&raw)
                        .ok_or_else(|| SqlError::BadValue(format!("unknown option: {raw}")))?;
                    Ok(Command::ConfirmTour { id, option, returning })
                }
                "complete" => {
                    f.only_for("complete", &["action"])?;
                    Ok(Command::CompleteTour { id, returning })
                }
                "cancel" => {
                    f.only_for("cancel", &["action"])?;
                    Ok(Command::CancelTour { id, returning })
                }
                other => Err(SqlError::BadValue(format!("unknown tour action: {other}"))),
            }
        }
        "appointments" => {
            filters.only_eq(&["id", "status"])?;
            let id = filters.required_ulid("id")?;
            let expected = filters.appointment_status()?;
            let kind = ActionKind::parse(&action)
                .ok_or_else(|| SqlError::BadValue(format!("unknown appointment action: {action}")))?;
            let action = match kind {
                ActionKind::Confirm => {
                    f.only_for("confirm", &["action"])?;
                    AppointmentAction::Confirm
                }
                ActionKind::Accept => {
                    f.only_for("accept", &["action"])?;
                    AppointmentAction::Accept
                }
                ActionKind::Complete => {
                    f.only_for("complete", &["action"])?;
                    AppointmentAction::Complete
                }
                ActionKind::Reject => {
                    f.only_for("reject", &["action", "reason"])?;
                    AppointmentAction::Reject {
                        reason: f.text("reason")?.unwrap_or_default(),
                    }
                }
                ActionKind::Propose => {
                    f.only_for("propose", &["action", "date", "time", "reason"])?;
                    AppointmentAction::Propose {
                        date: f.required_date("date")?,
                        time: f.required_text("time")?,
                        reason: f.text("reason")?,
                    }
                }
            };
            Ok(Command::RespondToAppointment {
                id,
                action,
                expected,
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let filters = Filters::collect(delete.selection.as_ref())?;
    filters.only_eq(&["id"])?;
    let id = filters.required_ulid("id")?;
    let returning = parse_returning(delete.returning.as_deref())?;

    match table.as_str() {
        "tour_bookings" => Ok(Command::CancelTour { id, returning }),
        "appointments" => {
            no_returning("appointment delete", &returning)?;
            Ok(Command::DeleteAppointment { id })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = Filters::collect(select.selection.as_ref())?;

    match table.as_str() {
        "availability" => {
            filters.only(&["date"])?;
            let mut range = DateRange::default();
            for (op, expr) in filters.all("date") {
                let date = parse_date_expr(expr)?;
                match op {
                    BinaryOperator::GtEq => range.from = Some(date),
                    BinaryOperator::LtEq => range.to = Some(date),
                    BinaryOperator::Eq => {
                        range.from = Some(date);
                        range.to = Some(date);
                    }
                    other => return Err(SqlError::Unsupported(format!("date {other} filter"))),
                }
            }
            Ok(Command::SelectAvailability { range })
        }
        "tour_bookings" => {
            filters.only_eq(&["id", "status"])?;
            let status = match filters.eq("status") {
                Some(expr) => {
                    let raw = required(parse_text_expr(expr)?, "status")?;
                    Some(
                        TourStatus::parse(&raw)
                            .ok_or_else(|| SqlError::BadValue(format!("unknown tour status: {raw}")))?,
                    )
                }
                None => None,
            };
            Ok(Command::SelectTours {
                id: filters.ulid("id")?,
                status,
            })
        }
        "appointments" => {
            filters.only_eq(&["id", "teacher_id", "parent_id", "status"])?;
            Ok(Command::SelectAppointments {
                id: filters.ulid("id")?,
                filter: AppointmentFilter {
                    teacher_id: filters.ulid("teacher_id")?,
                    parent_id: filters.ulid("parent_id")?,
                    status: filters.appointment_status()?,
                },
            })
        }
        "calendar" => {
            filters.only_eq(&["teacher_id"])?;
            Ok(Command::ExportCalendar {
                teacher_id: filters.required_ulid("teacher_id")?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── Column/value maps ─────────────────────────────────────────

/// Column name → expression, from an INSERT row or UPDATE assignments.
struct Fields<'a> {
    table: String,
    pairs: Vec<(String, &'a Expr)>,
}

impl<'a> Fields<'a> {
    /// Unnamed INSERTs fill `defaults` positionally.
    fn from_row(
        table: &'static str,
        named: &[String],
        defaults: &[&str],
        row: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let names: Vec<String> = if named.is_empty() {
            defaults.iter().take(row.len()).map(|s| s.to_string()).collect()
        } else {
            named.to_vec()
        };
        if names.len() != row.len() {
            return Err(SqlError::WrongArity(table, names.len(), row.len()));
        }
        Ok(Self {
            table: table.to_string(),
            pairs: names.into_iter().zip(row.iter()).collect(),
        })
    }

    fn from_assignments(table: &str, assignments: &'a [ast::Assignment]) -> Result<Self, SqlError> {
        let mut pairs = Vec::with_capacity(assignments.len());
        for a in assignments {
            let name = match &a.target {
                AssignmentTarget::ColumnName(name) => object_name_last(name)
                    .ok_or_else(|| SqlError::Parse("empty column name".into()))?,
                AssignmentTarget::Tuple(_) => {
                    return Err(SqlError::Unsupported("tuple assignment".into()));
                }
            };
            pairs.push((name, &a.value));
        }
        Ok(Self {
            table: table.to_string(),
            pairs,
        })
    }

    fn get(&self, col: &str) -> Option<&'a Expr> {
        self.pairs.iter().find(|(n, _)| n == col).map(|(_, e)| *e)
    }

    fn only(&self, allowed: &[&str]) -> Result<(), SqlError> {
        match self.pairs.iter().find(|(n, _)| !allowed.contains(&n.as_str())) {
            Some((n, _)) => Err(SqlError::UnknownColumn(format!("{}.{n}", self.table))),
            None => Ok(()),
        }
    }

    /// Payload columns must belong to the action being performed.
    fn only_for(&self, action: &'static str, allowed: &[&str]) -> Result<(), SqlError> {
        match self.pairs.iter().find(|(n, _)| !allowed.contains(&n.as_str())) {
            Some((n, _)) => Err(SqlError::UnexpectedColumn {
                action,
                column: n.clone(),
            }),
            None => Ok(()),
        }
    }

    fn text(&self, col: &'static str) -> Result<Option<String>, SqlError> {
        self.get(col).map(parse_text_expr).transpose().map(Option::flatten)
    }

    fn required_text(&self, col: &'static str) -> Result<String, SqlError> {
        required(self.text(col)?, col)
    }

    fn date(&self, col: &'static str) -> Result<Option<NaiveDate>, SqlError> {
        match self.text(col)? {
            Some(s) => parse_date(&s).map(Some),
            None => Ok(None),
        }
    }

    fn required_date(&self, col: &'static str) -> Result<NaiveDate, SqlError> {
        required(self.date(col)?, col)
    }

    fn required_ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid(&self.required_text(col)?)
    }
}

fn required<T>(value: Option<T>, col: &'static str) -> Result<T, SqlError> {
    value.ok_or(SqlError::MissingColumn(col))
}

/// Flattened `col <op> value` conjuncts of a WHERE clause.
struct Filters<'a> {
    conds: Vec<(String, BinaryOperator, &'a Expr)>,
}

impl<'a> Filters<'a> {
    fn collect(selection: Option<&'a Expr>) -> Result<Self, SqlError> {
        let mut conds = Vec::new();
        if let Some(expr) = selection {
            flatten_and(expr, &mut conds)?;
        }
        Ok(Self { conds })
    }

    fn only(&self, allowed: &[&str]) -> Result<(), SqlError> {
        match self.conds.iter().find(|(c, _, _)| !allowed.contains(&c.as_str())) {
            Some((c, _, _)) => Err(SqlError::Unsupported(format!("filter on {c}"))),
            None => Ok(()),
        }
    }

    /// Key filters: every condition names an allowed column and uses `=`.
    fn only_eq(&self, allowed: &[&str]) -> Result<(), SqlError> {
        self.only(allowed)?;
        match self.conds.iter().find(|(_, op, _)| *op != BinaryOperator::Eq) {
            Some((c, op, _)) => Err(SqlError::Unsupported(format!("{c} {op} filter"))),
            None => Ok(()),
        }
    }

    fn all<'s>(&'s self, col: &'s str) -> impl Iterator<Item = (&'s BinaryOperator, &'a Expr)> + 's {
        self.conds
            .iter()
            .filter(move |(c, _, _)| c == col)
            .map(|(_, op, e)| (op, *e))
    }

    fn eq(&self, col: &str) -> Option<&'a Expr> {
        self.all(col)
            .find(|(op, _)| **op == BinaryOperator::Eq)
            .map(|(_, e)| e)
    }

    fn ulid(&self, col: &'static str) -> Result<Option<Ulid>, SqlError> {
        match self.eq(col) {
            Some(expr) => {
                let raw = required(parse_text_expr(expr)?, col)?;
                parse_ulid(&raw).map(Some)
            }
            None => Ok(None),
        }
    }

    fn required_ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        self.ulid(col)?.ok_or(SqlError::MissingFilter(col))
    }

    fn appointment_status(&self) -> Result<Option<AppointmentStatus>, SqlError> {
        match self.eq("status") {
            Some(expr) => {
                let raw = required(parse_text_expr(expr)?, "status")?;
                AppointmentStatus::parse(&raw)
                    .map(Some)
                    .ok_or_else(|| SqlError::BadValue(format!("unknown appointment status: {raw}")))
            }
            None => Ok(None),
        }
    }
}

fn flatten_and<'a>(
    expr: &'a Expr,
    out: &mut Vec<(String, BinaryOperator, &'a Expr)>,
) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => flatten_and(inner, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            flatten_and(left, out)?;
            flatten_and(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
            out.push((col, op.clone(), right));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

/// A string or number literal as text; `NULL` is `None`.
fn parse_text_expr(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) | Some(Value::Number(s, _)) => Ok(Some(s.clone())),
        Some(Value::Null) => Ok(None),
        Some(other) => Err(SqlError::BadValue(format!("expected text, got {other}"))),
        None => Err(SqlError::BadValue(format!("expected a literal, got {expr}"))),
    }
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let raw = parse_text_expr(expr)?.ok_or_else(|| SqlError::BadValue("date is NULL".into()))?;
    parse_date(&raw)
}

fn parse_date(s: &str) -> Result<NaiveDate, SqlError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| SqlError::BadValue(format!("bad date {s:?}: expected YYYY-MM-DD")))
}

fn parse_ulid(s: &str) -> Result<Ulid, SqlError> {
    Ulid::from_string(s.trim()).map_err(|e| SqlError::BadValue(format!("bad ULID {s:?}: {e}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    MissingColumn(&'static str),
    /// A payload column that the chosen action does not take.
    UnexpectedColumn {
        action: &'static str,
        column: String,
    },
    /// Well-formed SQL carrying a literal the domain cannot accept.
    BadValue(String),
}

impl SqlError {
    pub fn sqlstate(&self) -> &'static str {
        match self {
            SqlError::Parse(_)
            | SqlError::Empty
            | SqlError::Unsupported(_)
            | SqlError::WrongArity(..)
            | SqlError::MissingFilter(_) => "42601",
            SqlError::UnknownTable(_) => "42P01",
            SqlError::UnknownColumn(_) => "42703",
            SqlError::MissingColumn(_)
            | SqlError::UnexpectedColumn { .. }
            | SqlError::BadValue(_) => "22023",
        }
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::MissingColumn(col) => write!(f, "missing value for {col}"),
            SqlError::UnexpectedColumn { action, column } => {
                write!(f, "action {action} does not take {column}")
            }
            SqlError::BadValue(s) => write!(f, "bad value: {s}"),
        }
    }
}

impl std::error::Error for SqlError {}
