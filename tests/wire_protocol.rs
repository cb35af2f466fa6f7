use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage, SimpleQueryRow};
use ulid::Ulid;

use kinderslot::tenant::TenantManager;
use kinderslot::wire;

const PASSWORD: &str = "kinderslot";

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("kinderslot_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, PASSWORD.to_string(), None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr, db: &str, user: &str) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(db)
        .user(user)
        .password(PASSWORD);

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn rows(client: &tokio_postgres::Client, sql: &str) -> Vec<SimpleQueryRow> {
    client
        .simple_query(sql)
        .await
        .unwrap()
        .into_iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(r) => Some(r),
            _ => None,
        })
        .collect()
}

/// Run a statement that must fail and return its SQLSTATE.
async fn error_code(client: &tokio_postgres::Client, sql: &str) -> String {
    let err = client
        .simple_query(sql)
        .await
        .expect_err("statement should fail");
    err.as_db_error()
        .map(|e| e.code().code().to_string())
        .unwrap_or_else(|| panic!("not a server error: {err}"))
}

struct Actors {
    admin: tokio_postgres::Client,
    parent: tokio_postgres::Client,
    teacher: tokio_postgres::Client,
    parent_id: Ulid,
    teacher_id: Ulid,
}

async fn actors(addr: SocketAddr, db: &str) -> Actors {
    let parent_id = Ulid::new();
    let teacher_id = Ulid::new();
    Actors {
        admin: connect(addr, db, "admin").await,
        parent: connect(addr, db, &format!("parent:{parent_id}")).await,
        teacher: connect(addr, db, &format!("teacher:{teacher_id}")).await,
        parent_id,
        teacher_id,
    }
}

fn submit_sql(email: &str, date: &str, time: &str) -> String {
    format!(
        "INSERT INTO tour_bookings (parent_name, email, child_name, preferred_date, preferred_time) \
         VALUES ('Ana Lima', '{email}', 'Leo', '{date}', '{time}')"
    )
}

/// Submit a tour and return the id the server assigned.
async fn submit_tour(client: &tokio_postgres::Client, email: &str, date: &str, time: &str) -> String {
    let returned = rows(client, &format!("{} RETURNING id", submit_sql(email, date, time))).await;
    assert_eq!(returned.len(), 1);
    returned[0].get("id").expect("id returned").to_string()
}

// ── Availability ─────────────────────────────────────────────

#[tokio::test]
async fn publish_and_list_availability() {
    let addr = start_test_server().await;
    let a = actors(addr, "avail").await;

    a.admin
        .batch_execute(
            "INSERT INTO availability (date, time) VALUES \
             ('2025-02-01', '09:30 AM'), ('2025-02-01', '09:00 AM'), ('2025-02-01', '10:00 AM')",
        )
        .await
        .unwrap();
    // Re-publishing merges instead of duplicating.
    a.admin
        .batch_execute("INSERT INTO availability (date, time) VALUES ('2025-02-01', '09:00 AM')")
        .await
        .unwrap();

    let listed = rows(&a.parent, "SELECT * FROM availability WHERE date = '2025-02-01'").await;
    let times: Vec<&str> = listed.iter().filter_map(|r| r.get("time")).collect();
    assert_eq!(times, vec!["09:00 AM", "09:30 AM", "10:00 AM"]);
    assert!(listed.iter().all(|r| r.get("date") == Some("2025-02-01")));

    let empty = rows(&a.parent, "SELECT * FROM availability WHERE date >= '2025-03-01'").await;
    assert!(empty.is_empty());
}

#[tokio::test]
async fn only_admin_publishes() {
    let addr = start_test_server().await;
    let a = actors(addr, "publish_auth").await;

    let sql = "INSERT INTO availability (date, time) VALUES ('2025-02-01', '09:00 AM')";
    assert_eq!(error_code(&a.parent, sql).await, "42501");
    assert_eq!(error_code(&a.teacher, sql).await, "42501");
}

#[tokio::test]
async fn publish_rejects_bad_times() {
    let addr = start_test_server().await;
    let a = actors(addr, "publish_bad").await;

    let code = error_code(
        &a.admin,
        "INSERT INTO availability (date, time) VALUES ('2025-02-01', '9am')",
    )
    .await;
    assert_eq!(code, "22023");
    let code = error_code(
        &a.admin,
        "INSERT INTO availability (date, time) VALUES ('2025-02-01', '11:00 PM')",
    )
    .await;
    assert_eq!(code, "22023");
}

// ── Tours ────────────────────────────────────────────────────

#[tokio::test]
async fn two_bookings_one_slot() {
    let addr = start_test_server().await;
    let a = actors(addr, "race").await;

    a.admin
        .batch_execute("INSERT INTO availability (date, time) VALUES ('2025-02-01', '09:00 AM')")
        .await
        .unwrap();
    let first = submit_tour(&a.parent, "first@example.com", "2025-02-01", "09:00 AM").await;
    let second = submit_tour(&a.parent, "second@example.com", "2025-02-01", "09:00 AM").await;
    assert_ne!(first, second);

    a.admin
        .batch_execute(&format!(
            "UPDATE tour_bookings SET action = 'confirm', option = 'preferred' WHERE id = '{first}'"
        ))
        .await
        .unwrap();
    let code = error_code(
        &a.admin,
        &format!("UPDATE tour_bookings SET action = 'confirm', option = 'preferred' WHERE id = '{second}'"),
    )
    .await;
    assert_eq!(code, "23505");

    let confirmed = rows(&a.admin, &format!("SELECT * FROM tour_bookings WHERE id = '{first}'")).await;
    assert_eq!(confirmed[0].get("status"), Some("confirmed"));
    assert_eq!(confirmed[0].get("confirmed_time"), Some("09:00 AM"));

    // Booked slots turn new submissions away.
    let code = error_code(&a.parent, &submit_sql("third@example.com", "2025-02-01", "09:00 AM")).await;
    assert_eq!(code, "23P01");
}

#[tokio::test]
async fn tour_lifecycle_over_wire() {
    let addr = start_test_server().await;
    let a = actors(addr, "lifecycle").await;

    a.admin
        .batch_execute("INSERT INTO availability (date, time) VALUES ('2025-02-03', '10:00 AM')")
        .await
        .unwrap();
    let id = submit_tour(&a.parent, "ana@example.com", "2025-02-03", "10:00 AM").await;

    // Parents cannot move their own booking along.
    let code = error_code(
        &a.parent,
        &format!("UPDATE tour_bookings SET action = 'confirm', option = 'preferred' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "42501");

    // Completing a pending tour skips a step.
    let code = error_code(
        &a.admin,
        &format!("UPDATE tour_bookings SET action = 'complete' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "55000");

    // Alternate was never given.
    let code = error_code(
        &a.admin,
        &format!("UPDATE tour_bookings SET action = 'confirm', option = 'alternate' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "22023");

    let confirmed = rows(
        &a.admin,
        &format!(
            "UPDATE tour_bookings SET action = 'confirm', option = 'preferred' WHERE id = '{id}' \
             RETURNING status, confirmed_date, confirmed_time"
        ),
    )
    .await;
    assert_eq!(confirmed[0].get("status"), Some("confirmed"));
    assert_eq!(confirmed[0].get("confirmed_date"), Some("2025-02-03"));
    assert_eq!(confirmed[0].get("confirmed_time"), Some("10:00 AM"));

    let cancelled = rows(&a.admin, &format!("DELETE FROM tour_bookings WHERE id = '{id}' RETURNING *")).await;
    assert_eq!(cancelled[0].get("id"), Some(id.as_str()));
    assert_eq!(cancelled[0].get("status"), Some("cancelled"));

    // Cancelling the confirmed tour handed the slot back.
    a.parent
        .batch_execute(&submit_sql("next@example.com", "2025-02-03", "10:00 AM"))
        .await
        .unwrap();
    let cancelled = rows(&a.admin, "SELECT * FROM tour_bookings WHERE status = 'cancelled'").await;
    assert_eq!(cancelled.len(), 1);
}

// ── Appointments ─────────────────────────────────────────────

async fn request_meeting(a: &Actors, topic: &str) -> String {
    let returned = rows(
        &a.parent,
        &format!(
            "INSERT INTO appointments (parent_id, student_id, teacher_id, topic, date, time) \
             VALUES ('{}', '{}', '{}', '{topic}', '2025-03-10', '02:00 PM') RETURNING id, status",
            a.parent_id,
            Ulid::new(),
            a.teacher_id
        ),
    )
    .await;
    assert_eq!(returned[0].get("status"), Some("requested"));
    returned[0].get("id").expect("id returned").to_string()
}

#[tokio::test]
async fn negotiation_and_calendar() {
    let addr = start_test_server().await;
    let a = actors(addr, "negotiate").await;
    let id = request_meeting(&a, "Reading progress").await;

    a.teacher
        .batch_execute(&format!(
            "UPDATE appointments SET action = 'propose', date = '2025-03-11', time = '03:30 PM', \
             reason = 'Staff meeting on the 10th' WHERE id = '{id}' AND status = 'requested'"
        ))
        .await
        .unwrap();

    // Only the parent accepts a proposal.
    let code = error_code(
        &a.teacher,
        &format!("UPDATE appointments SET action = 'accept' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "42501");

    a.parent
        .batch_execute(&format!("UPDATE appointments SET action = 'accept' WHERE id = '{id}'"))
        .await
        .unwrap();

    let appt = rows(&a.teacher, &format!("SELECT * FROM appointments WHERE id = '{id}'")).await;
    assert_eq!(appt[0].get("status"), Some("confirmed"));
    assert_eq!(appt[0].get("date"), Some("2025-03-11"));
    assert_eq!(appt[0].get("time"), Some("03:30 PM"));

    let cal = rows(
        &a.teacher,
        &format!("SELECT ics FROM calendar WHERE teacher_id = '{}'", a.teacher_id),
    )
    .await;
    let ics = cal[0].get("ics").unwrap();
    assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
    assert!(ics.contains("DTSTART:20250311T153000\r\n"));
    assert!(ics.contains("DTEND:20250311T160000\r\n"));
    assert!(ics.contains("SUMMARY:Reading progress\r\n"));
    assert!(ics.ends_with("END:VCALENDAR\r\n"));
}

#[tokio::test]
async fn negotiation_errors_have_distinct_codes() {
    let addr = start_test_server().await;
    let a = actors(addr, "negotiate_errors").await;
    let id = request_meeting(&a, "Lunch habits").await;

    // Stale view of the status.
    let code = error_code(
        &a.teacher,
        &format!("UPDATE appointments SET action = 'confirm' WHERE id = '{id}' AND status = 'proposed'"),
    )
    .await;
    assert_eq!(code, "40001");

    // Not an edge of the state machine.
    let code = error_code(
        &a.teacher,
        &format!("UPDATE appointments SET action = 'complete' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "55000");

    // A parent cannot confirm.
    let code = error_code(
        &a.parent,
        &format!("UPDATE appointments SET action = 'confirm' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "42501");

    // Teachers must say why they decline.
    let code = error_code(
        &a.teacher,
        &format!("UPDATE appointments SET action = 'reject' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "22023");

    // Payload that does not belong to the action.
    let code = error_code(
        &a.teacher,
        &format!("UPDATE appointments SET action = 'confirm', date = '2025-03-12' WHERE id = '{id}'"),
    )
    .await;
    assert_eq!(code, "22023");

    let code = error_code(
        &a.teacher,
        &format!("UPDATE appointments SET action = 'confirm' WHERE id = '{}'", Ulid::new()),
    )
    .await;
    assert_eq!(code, "P0002");

    a.teacher
        .batch_execute(&format!(
            "UPDATE appointments SET action = 'reject', reason = 'Out sick that week' WHERE id = '{id}'"
        ))
        .await
        .unwrap();
    let appt = rows(&a.parent, &format!("SELECT * FROM appointments WHERE id = '{id}'")).await;
    assert_eq!(appt[0].get("status"), Some("rejected"));
    assert_eq!(appt[0].get("reason"), Some("Out sick that week"));
}

#[tokio::test]
async fn parent_deletes_own_appointment() {
    let addr = start_test_server().await;
    let a = actors(addr, "delete_appt").await;
    let id = request_meeting(&a, "Allergies").await;

    let stranger = connect(addr, "delete_appt", &format!("parent:{}", Ulid::new())).await;
    let code = error_code(&stranger, &format!("DELETE FROM appointments WHERE id = '{id}'")).await;
    assert_eq!(code, "42501");

    a.parent
        .batch_execute(&format!("DELETE FROM appointments WHERE id = '{id}'"))
        .await
        .unwrap();
    let code = error_code(&a.parent, &format!("DELETE FROM appointments WHERE id = '{id}'")).await;
    assert_eq!(code, "P0002");
}

// ── Protocol edges ───────────────────────────────────────────

#[tokio::test]
async fn syntax_and_literal_errors() {
    let addr = start_test_server().await;
    let a = actors(addr, "syntax").await;

    assert_eq!(error_code(&a.admin, "SELEC * FROM availability").await, "42601");
    assert_eq!(error_code(&a.admin, "SELECT * FROM nothing").await, "42P01");
    assert_eq!(
        error_code(&a.admin, "SELECT * FROM availability WHERE date = 'soon'").await,
        "22023"
    );
    assert_eq!(
        error_code(&a.admin, "UPDATE appointments SET status = 'confirmed' WHERE id = '01ARZ3NDEKTSV4RRFFQ69G5FAV'").await,
        "22023"
    );
}

#[tokio::test]
async fn unknown_user_is_refused() {
    let addr = start_test_server().await;
    let client = connect(addr, "strangers", "postgres").await;
    assert_eq!(error_code(&client, "SELECT * FROM availability").await, "28000");
}

#[tokio::test]
async fn tenants_are_isolated() {
    let addr = start_test_server().await;
    let sunflower = connect(addr, "sunflower", "admin").await;
    let bluebell = connect(addr, "bluebell", "admin").await;

    sunflower
        .batch_execute("INSERT INTO availability (date, time) VALUES ('2025-02-01', '09:00 AM')")
        .await
        .unwrap();
    assert_eq!(rows(&sunflower, "SELECT * FROM availability").await.len(), 1);
    assert!(rows(&bluebell, "SELECT * FROM availability").await.is_empty());
}

#[tokio::test]
async fn extended_protocol_with_params() {
    let addr = start_test_server().await;
    let admin = connect(addr, "extended", "admin").await;

    admin
        .execute(
            "INSERT INTO availability (date, time) VALUES ($1, $2)",
            &[&"2025-02-05", &"11:00 AM"],
        )
        .await
        .unwrap();

    let listed = admin
        .query("SELECT * FROM availability WHERE date = $1", &[&"2025-02-05"])
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    let time: String = listed[0].get("time");
    assert_eq!(time, "11:00 AM");
}

#[tokio::test]
async fn bound_text_keeps_placeholder_lookalikes() {
    let addr = start_test_server().await;
    let a = actors(addr, "bound_text").await;
    let student = Ulid::new().to_string();
    let parent = a.parent_id.to_string();
    let teacher = a.teacher_id.to_string();

    let returned = a
        .parent
        .query(
            "INSERT INTO appointments (parent_id, student_id, teacher_id, topic, date, time) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id, topic",
            &[&parent, &student, &teacher, &"Fee of $1 per term", &"2025-03-10", &"02:00 PM"],
        )
        .await
        .unwrap();
    assert_eq!(returned.len(), 1);
    let topic: String = returned[0].get("topic");
    assert_eq!(topic, "Fee of $1 per term");

    let listed = rows(&a.teacher, &format!("SELECT * FROM appointments WHERE teacher_id = '{teacher}'")).await;
    let topics: Vec<Option<&str>> = listed.iter().map(|r| r.get("topic")).collect();
    assert_eq!(topics, vec![Some("Fee of $1 per term")]);
}

#[tokio::test]
async fn unknown_returning_column_writes_nothing() {
    let addr = start_test_server().await;
    let a = actors(addr, "returning_unknown").await;
    a.admin
        .batch_execute("INSERT INTO availability (date, time) VALUES ('2025-02-04', '09:00 AM')")
        .await
        .unwrap();

    let code = error_code(
        &a.parent,
        &format!("{} RETURNING nickname", submit_sql("ana@example.com", "2025-02-04", "09:00 AM")),
    )
    .await;
    assert_eq!(code, "42703");
    assert!(rows(&a.admin, "SELECT * FROM tour_bookings").await.is_empty());
}
