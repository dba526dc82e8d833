use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::boundary::{CheckRequest, SuggestRequest};
use crate::model::ParticipantsInput;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertEvent(CheckRequest),
    UpdateEvent {
        id: Ulid,
        start_time: String,
        end_time: String,
        /// `None` keeps the current participants; `Some(None)` resets to the default.
        participants: Option<Option<ParticipantsInput>>,
    },
    DeleteEvent {
        id: Ulid,
    },
    SelectEvents {
        participant: Option<String>,
    },
    SelectSuggestions(SuggestRequest),
}

const EVENT_COLUMNS: [&str; 3] = ["start_time", "end_time", "participants"];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "events" {
        return Err(SqlError::UnknownTable(table));
    }
    let values = extract_insert_values(insert)?;

    // Named columns map by name; otherwise values are positional.
    let columns: Vec<String> = if insert.columns.is_empty() {
        EVENT_COLUMNS.iter().take(values.len()).map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if columns.len() != values.len() {
        return Err(SqlError::WrongArity("events", columns.len(), values.len()));
    }

    let (mut start_time, mut end_time, mut participants) = (None, None, None);
    for (col, value) in columns.iter().zip(&values) {
        match col.as_str() {
            "start_time" => start_time = Some(parse_string_expr(value)?),
            "end_time" => end_time = Some(parse_string_expr(value)?),
            "participants" => participants = parse_participants_expr(value)?,
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::InsertEvent(CheckRequest {
        start_time: start_time.ok_or(SqlError::MissingColumn("start_time"))?,
        end_time: end_time.ok_or(SqlError::MissingColumn("end_time"))?,
        participants,
    }))
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let name = table_factor_name(&table.relation)?;
    if name != "events" {
        return Err(SqlError::UnknownTable(name));
    }
    let id = extract_where_id(selection)?;

    let (mut start_time, mut end_time, mut participants) = (None, None, None);
    for assignment in assignments {
        let col = match &assignment.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            AssignmentTarget::Tuple(_) => return Err(SqlError::Unsupported("tuple assignment".into())),
        };
        match col.as_str() {
            "start_time" => start_time = Some(parse_string_expr(&assignment.value)?),
            "end_time" => end_time = Some(parse_string_expr(&assignment.value)?),
            "participants" => participants = Some(parse_participants_expr(&assignment.value)?),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::UpdateEvent {
        id,
        start_time: start_time.ok_or(SqlError::MissingColumn("start_time"))?,
        end_time: end_time.ok_or(SqlError::MissingColumn("end_time"))?,
        participants,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "events" {
        return Err(SqlError::UnknownTable(table));
    }
    let id = extract_where_id(&delete.selection)?;
    Ok(Command::DeleteEvent { id })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "events" => Ok(Command::SelectEvents {
            participant: filters.participant,
        }),
        "suggestions" => Ok(Command::SelectSuggestions(SuggestRequest {
            start_time: filters.start_time.ok_or(SqlError::MissingFilter("start_time"))?,
            end_time: filters.end_time.ok_or(SqlError::MissingFilter("end_time"))?,
            participants: filters.participant.map(ParticipantsInput::One),
            count: filters.count,
            step_minutes: filters.step_minutes,
        })),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct Filters {
    start_time: Option<String>,
    end_time: Option<String>,
    participant: Option<String>,
    count: Option<usize>,
    step_minutes: Option<i64>,
}

fn collect_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_filters(left, filters)?;
                collect_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("start_time") => filters.start_time = Some(parse_string_expr(right)?),
                Some("end_time") => filters.end_time = Some(parse_string_expr(right)?),
                Some("participant") => filters.participant = Some(parse_string_expr(right)?),
                Some("count") => {
                    let n = parse_i64_expr(right)?;
                    filters.count =
                        Some(usize::try_from(n).map_err(|_| SqlError::Parse(format!("{n} out of range for count")))?);
                }
                Some("step_minutes") => filters.step_minutes = Some(parse_i64_expr(right)?),
                Some(other) => return Err(SqlError::UnknownColumn(other.to_string())),
                None => return Err(SqlError::Unsupported(format!("filter {expr}"))),
            },
            _ => return Err(SqlError::Unsupported(format!("operator {op}"))),
        },
        Expr::Nested(inner) => collect_filters(inner, filters)?,
        other => return Err(SqlError::Unsupported(format!("filter {other}"))),
    }
    Ok(())
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
        TableObject::TableName(name) => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
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
        TableFactor::Table { name, .. } => object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into())),
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert.source.as_ref().ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.len() {
            0 => Err(SqlError::Parse("empty VALUES".into())),
            1 => Ok(values.rows[0].clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right),
        _ => Err(SqlError::MissingFilter("id")),
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

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// `'user1'`, `ARRAY['a', 'b']` or `NULL`.
fn parse_participants_expr(expr: &Expr) -> Result<Option<ParticipantsInput>, SqlError> {
    match expr {
        Expr::Array(array) => {
            let ids = array.elem.iter().map(parse_string_expr).collect::<Result<Vec<_>, _>>()?;
            Ok(Some(ParticipantsInput::Many(ids)))
        }
        _ => match extract_value(expr) {
            Some(Value::Null) => Ok(None),
            Some(Value::SingleQuotedString(s)) => Ok(Some(ParticipantsInput::One(s.clone()))),
            Some(value) => Err(SqlError::Parse(format!("expected participant string or ARRAY, got {value}"))),
            None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
        },
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string_expr(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => {
                s.parse().map_err(|e| SqlError::Parse(format!("bad integer: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        parse_i64_expr(expr)?
            .checked_neg()
            .ok_or_else(|| SqlError::Parse(format!("integer out of range: -{expr}")))
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
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
    MissingColumn(&'static str),
    MissingFilter(&'static str),
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
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_event_with_named_columns() {
        let sql = "INSERT INTO events (start_time, end_time, participants) VALUES ('2024-01-01T10:00', '2024-01-01T11:00', 'user1')";
        let cmd = parse_sql(sql).unwrap();
        assert_eq!(
            cmd,
            Command::InsertEvent(CheckRequest {
                start_time: "2024-01-01T10:00".into(),
                end_time: "2024-01-01T11:00".into(),
                participants: Some(ParticipantsInput::One("user1".into())),
            })
        );
    }

    #[test]
    fn parse_insert_event_columns_in_any_order() {
        let sql = "INSERT INTO events (participants, end_time, start_time) VALUES ('u', 'E', 'S')";
        match parse_sql(sql).unwrap() {
            Command::InsertEvent(req) => {
                assert_eq!(req.start_time, "S");
                assert_eq!(req.end_time, "E");
            }
            other => panic!("expected InsertEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_event_positional_without_participants() {
        let sql = "INSERT INTO events VALUES ('2024-01-01T10:00', '2024-01-01T11:00')";
        match parse_sql(sql).unwrap() {
            Command::InsertEvent(req) => assert_eq!(req.participants, None),
            other => panic!("expected InsertEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_event_array_participants() {
        let sql = "INSERT INTO events (start_time, end_time, participants) VALUES ('a', 'b', ARRAY['user1', 'user2'])";
        match parse_sql(sql).unwrap() {
            Command::InsertEvent(req) => assert_eq!(
                req.participants,
                Some(ParticipantsInput::Many(vec!["user1".into(), "user2".into()]))
            ),
            other => panic!("expected InsertEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_event_null_participants() {
        let sql = "INSERT INTO events (start_time, end_time, participants) VALUES ('a', 'b', NULL)";
        match parse_sql(sql).unwrap() {
            Command::InsertEvent(req) => assert_eq!(req.participants, None),
            other => panic!("expected InsertEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_insert_missing_end_time() {
        let sql = "INSERT INTO events (start_time) VALUES ('a')";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingColumn("end_time"))));
    }

    #[test]
    fn parse_insert_unknown_column() {
        let sql = "INSERT INTO events (start_time, end_time, title) VALUES ('a', 'b', 'standup')";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownColumn(c)) if c == "title"));
    }

    #[test]
    fn parse_insert_multi_row_unsupported() {
        let sql = "INSERT INTO events (start_time, end_time) VALUES ('a', 'b'), ('c', 'd')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_update_event() {
        let sql = format!(
            "UPDATE events SET start_time = '2024-01-01T12:00', end_time = '2024-01-01T13:00' WHERE id = '{ID}'"
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateEvent {
                id,
                start_time,
                end_time,
                participants,
            } => {
                assert_eq!(id.to_string(), ID);
                assert_eq!(start_time, "2024-01-01T12:00");
                assert_eq!(end_time, "2024-01-01T13:00");
                assert_eq!(participants, None);
            }
            other => panic!("expected UpdateEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_event_participants() {
        let sql = format!(
            "UPDATE events SET start_time = 'a', end_time = 'b', participants = ARRAY['x'] WHERE id = '{ID}'"
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateEvent { participants, .. } => {
                assert_eq!(participants, Some(Some(ParticipantsInput::Many(vec!["x".into()]))));
            }
            other => panic!("expected UpdateEvent, got {other:?}"),
        }
        let sql = format!("UPDATE events SET start_time = 'a', end_time = 'b', participants = NULL WHERE id = '{ID}'");
        match parse_sql(&sql).unwrap() {
            Command::UpdateEvent { participants, .. } => assert_eq!(participants, Some(None)),
            other => panic!("expected UpdateEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_update_without_where_errors() {
        let sql = "UPDATE events SET start_time = 'a', end_time = 'b'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_delete_event() {
        let sql = format!("DELETE FROM events WHERE id = '{ID}'");
        match parse_sql(&sql).unwrap() {
            Command::DeleteEvent { id } => assert_eq!(id.to_string(), ID),
            other => panic!("expected DeleteEvent, got {other:?}"),
        }
    }

    #[test]
    fn parse_delete_bad_ulid() {
        let sql = "DELETE FROM events WHERE id = 'not-a-ulid'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_select_events() {
        assert_eq!(
            parse_sql("SELECT * FROM events").unwrap(),
            Command::SelectEvents { participant: None }
        );
        assert_eq!(
            parse_sql("SELECT * FROM events WHERE participant = 'user1'").unwrap(),
            Command::SelectEvents {
                participant: Some("user1".into())
            }
        );
    }

    #[test]
    fn parse_select_suggestions() {
        let sql = "SELECT * FROM suggestions WHERE start_time = '2024-01-01T10:00' AND end_time = '2024-01-01T11:00'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectSuggestions(SuggestRequest {
                start_time: "2024-01-01T10:00".into(),
                end_time: "2024-01-01T11:00".into(),
                participants: None,
                count: None,
                step_minutes: None,
            })
        );
    }

    #[test]
    fn parse_select_suggestions_with_options() {
        let sql = "SELECT * FROM suggestions WHERE start_time = 'a' AND end_time = 'b' AND participant = 'u' AND count = 5 AND step_minutes = 15";
        match parse_sql(sql).unwrap() {
            Command::SelectSuggestions(req) => {
                assert_eq!(req.participants, Some(ParticipantsInput::One("u".into())));
                assert_eq!(req.count, Some(5));
                assert_eq!(req.step_minutes, Some(15));
            }
            other => panic!("expected SelectSuggestions, got {other:?}"),
        }
    }

    #[test]
    fn parse_select_suggestions_missing_end() {
        let sql = "SELECT * FROM suggestions WHERE start_time = 'a'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("end_time"))));
    }

    #[test]
    fn parse_select_negative_count_errors() {
        let sql = "SELECT * FROM suggestions WHERE start_time = 'a' AND end_time = 'b' AND count = -1";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_negated_min_integer_errors() {
        let sql = "SELECT * FROM suggestions WHERE start_time = 'a' AND end_time = 'b' AND step_minutes = -'-9223372036854775808'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Parse(_))));
        let sql = "SELECT * FROM suggestions WHERE start_time = 'a' AND end_time = 'b' AND step_minutes = -'-15'";
        match parse_sql(sql).unwrap() {
            Command::SelectSuggestions(req) => assert_eq!(req.step_minutes, Some(15)),
            other => panic!("expected SelectSuggestions, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = "SELECT * FROM bookings";
        assert!(matches!(parse_sql(sql), Err(SqlError::UnknownTable(t)) if t == "bookings"));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
