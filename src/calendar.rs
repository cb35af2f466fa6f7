//! iCalendar export of confirmed/completed appointments.
//!
//! Output is ASCII with CRLF line endings, one `VEVENT` per appointment
//! inside a single `VCALENDAR`. `DTSTART`/`DTEND` are floating local
//! times (no `Z`, no `TZID`); `DTSTAMP` is the appointment's last update in UTC.

use chrono::{DateTime, Duration, NaiveDateTime};

use crate::model::{Appointment, AppointmentStatus};

/// Every exported appointment is a fixed block of this length.
pub const EVENT_DURATION_MINUTES: i64 = 30;

const PRODID: &str = "-//kinderslot//appointments//EN";
const MAX_LINE_OCTETS: usize = 75;

/// Pure and deterministic: same appointments in, same bytes out.
pub fn export(appointments: &[Appointment]) -> String {
    let mut selected: Vec<&Appointment> = appointments
        .iter()
        .filter(|a| {
            matches!(
                a.status,
                AppointmentStatus::Confirmed | AppointmentStatus::Completed
            )
        })
        .collect();
    selected.sort_by_key(|a| (a.date, a.time, a.id));

    let mut out = String::new();
    push_line(&mut out, "BEGIN:VCALENDAR");
    push_line(&mut out, "VERSION:2.0");
    push_line(&mut out, &format!("PRODID:{PRODID}"));
    push_line(&mut out, "CALSCALE:GREGORIAN");
    for a in selected {
        push_event(&mut out, a);
    }
    push_line(&mut out, "END:VCALENDAR");
    out
}

pub fn event_start(a: &Appointment) -> NaiveDateTime {
    a.date
        .and_hms_opt(u32::from(a.time.hour()), u32::from(a.time.minute()), 0)
        .unwrap_or_else(|| a.date.and_time(chrono::NaiveTime::MIN))
}

fn push_event(out: &mut String, a: &Appointment) {
    let start = event_start(a);
    let end = start + Duration::minutes(EVENT_DURATION_MINUTES);
    let stamp = DateTime::from_timestamp_millis(a.updated_at).unwrap_or_default();

    push_line(out, "BEGIN:VEVENT");
    push_line(out, &format!("UID:{}@kinderslot", a.id));
    push_line(out, &format!("DTSTAMP:{}", stamp.format("%Y%m%dT%H%M%SZ")));
    push_line(out, &format!("DTSTART:{}", start.format("%Y%m%dT%H%M%S")));
    push_line(out, &format!("DTEND:{}", end.format("%Y%m%dT%H%M%S")));
    push_line(out, &format!("SUMMARY:{}", escape_text(&a.topic)));

    let mut description = format!("Parent-teacher meeting. Student {}.", a.student_id);
    if let Some(reason) = &a.reason {
        description.push_str("\nNote: ");
        description.push_str(reason);
    }
    push_line(out, &format!("DESCRIPTION:{}", escape_text(&description)));
    push_line(out, "END:VEVENT");
}

/// RFC 5545 TEXT escaping, restricted to ASCII.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            c if c.is_ascii_control() => {}
            c if c.is_ascii() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Append a content line, folded at 75 octets, terminated by CRLF.
fn push_line(out: &mut String, line: &str) {
    let mut rest = line;
    let mut first = true;
    loop {
        // Continuation lines spend one octet on the leading space.
        let budget = if first { MAX_LINE_OCTETS } else { MAX_LINE_OCTETS - 1 };
        if !first {
            out.push(' ');
        }
        if rest.len() <= budget {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        // Input is ASCII by construction, so every byte index is a char boundary.
        let (head, tail) = rest.split_at(budget);
        out.push_str(head);
        out.push_str("\r\n");
        rest = tail;
        first = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimeOfDay;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn appt(date: (i32, u32, u32), time: &str, topic: &str, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Ulid::new(),
            parent_id: Ulid::new(),
            student_id: Ulid::new(),
            teacher_id: Ulid::new(),
            topic: topic.into(),
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            time: time.parse::<TimeOfDay>().unwrap(),
            status,
            reason: None,
            proposed: None,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
        }
    }

    fn field<'a>(ics: &'a str, name: &str) -> Vec<&'a str> {
        ics.split("\r\n")
            .filter_map(|l| l.strip_prefix(name).and_then(|r| r.strip_prefix(':')))
            .collect()
    }

    #[test]
    fn single_confirmed_appointment_round_trip() {
        let a = appt((2025, 3, 10), "14:00", "Math progress", AppointmentStatus::Confirmed);
        let ics = export(std::slice::from_ref(&a));

        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 1);
        assert_eq!(field(&ics, "DTSTART"), vec!["20250310T140000"]);
        assert_eq!(field(&ics, "DTEND"), vec!["20250310T143000"]);
        assert_eq!(field(&ics, "SUMMARY"), vec!["Math progress"]);
        assert_eq!(field(&ics, "UID"), vec![format!("{}@kinderslot", a.id).as_str()]);
        assert_eq!(field(&ics, "DTSTAMP"), vec!["20231114T221320Z"]);
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn only_confirmed_and_completed_are_exported() {
        let all = [
            appt((2025, 3, 10), "09:00", "a", AppointmentStatus::Requested),
            appt((2025, 3, 10), "10:00", "b", AppointmentStatus::Proposed),
            appt((2025, 3, 10), "11:00", "c", AppointmentStatus::Confirmed),
            appt((2025, 3, 10), "12:00", "d", AppointmentStatus::Rejected),
            appt((2025, 3, 10), "13:00", "e", AppointmentStatus::Completed),
        ];
        let ics = export(&all);
        assert_eq!(field(&ics, "SUMMARY"), vec!["c", "e"]);
    }

    #[test]
    fn empty_input_is_header_and_footer() {
        let ics = export(&[]);
        assert!(!ics.contains("VEVENT"));
        assert!(ics.contains("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("END:VCALENDAR\r\n"));
    }

    #[test]
    fn deterministic_regardless_of_input_order() {
        let a = appt((2025, 3, 11), "09:00", "later", AppointmentStatus::Confirmed);
        let b = appt((2025, 3, 10), "09:00", "earlier", AppointmentStatus::Confirmed);
        let one = export(&[a.clone(), b.clone()]);
        let two = export(&[b, a]);
        assert_eq!(one, two);
        assert_eq!(field(&one, "SUMMARY"), vec!["earlier", "later"]);
    }

    #[test]
    fn end_crosses_midnight() {
        let a = appt((2025, 3, 10), "23:45", "late", AppointmentStatus::Confirmed);
        let ics = export(&[a]);
        assert_eq!(field(&ics, "DTEND"), vec!["20250311T001500"]);
    }

    #[test]
    fn text_is_escaped_and_ascii() {
        let mut a = appt((2025, 3, 10), "14:00", "Reading; writing, and naïveté", AppointmentStatus::Confirmed);
        a.reason = Some("bring\nnotes".into());
        let ics = export(&[a]);
        assert!(ics.is_ascii());
        assert_eq!(field(&ics, "SUMMARY"), vec!["Reading\\; writing\\, and na?vet?"]);
        assert!(ics.replace("\r\n ", "").contains("Note: bring\\nnotes"));
    }

    #[test]
    fn long_lines_are_folded() {
        let topic = "x".repeat(200);
        let a = appt((2025, 3, 10), "14:00", &topic, AppointmentStatus::Confirmed);
        let ics = export(&[a]);
        for line in ics.split("\r\n") {
            assert!(line.len() <= MAX_LINE_OCTETS, "line too long: {}", line.len());
        }
        let unfolded = ics.replace("\r\n ", "");
        assert!(unfolded.contains(&format!("SUMMARY:{topic}\r\n")));
    }
}
