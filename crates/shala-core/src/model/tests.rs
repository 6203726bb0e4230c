use chrono::{NaiveTime, TimeZone, Utc, Weekday};
use uuid::Uuid;

use crate::error::ShalaError;
use crate::model::*;

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn student(id: &str, first: &str, last: &str) -> StudentInfo {
    StudentInfo {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!("{id}@example.com"),
        phone: String::new(),
    }
}

fn class(title: &str, weekday: Weekday, hour: u32) -> Class {
    Class::new(NewClass {
        session_id: Uuid::now_v7(),
        title: title.to_string(),
        description: String::new(),
        teacher_id: None,
        weekday,
        start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        duration_minutes: 60,
        capacity: 10,
        drop_in_only: false,
    })
}

#[test]
fn test_session_registration_always_active() {
    let kind = RegistrationKind::Session;
    assert!(kind.is_active(at(0)));
    assert!(kind.is_active(at(i64::from(i32::MAX))));
    assert!(kind.drop_in_date().is_none());
}

#[test]
fn test_drop_in_expiry_boundary() {
    let kind = RegistrationKind::DropIn { date: at(1000) };
    assert!(kind.is_active(at(999)));
    assert!(kind.is_active(at(1000)));
    assert!(!kind.is_active(at(1001)));
    assert_eq!(kind.drop_in_date(), Some(at(1000)));
}

#[test]
fn test_occupancy_excludes_expired_drop_ins() {
    let class_id = Uuid::now_v7();
    let regs = vec![
        Registration::new(class_id, student("a", "A", "A"), RegistrationKind::Session, at(0)),
        Registration::new(
            class_id,
            student("b", "B", "B"),
            RegistrationKind::DropIn { date: at(1000) },
            at(0),
        ),
        Registration::new(
            class_id,
            student("c", "C", "C"),
            RegistrationKind::DropIn { date: at(2000) },
            at(0),
        ),
    ];
    assert_eq!(occupancy(&regs, at(500)), 3);
    assert_eq!(occupancy(&regs, at(1500)), 2);
    assert_eq!(occupancy(&regs, at(2500)), 1);
}

#[test]
fn test_registration_kind_serde_tagged() {
    let json = serde_json::to_value(RegistrationKind::DropIn { date: at(0) }).unwrap();
    assert_eq!(json["type"], "drop_in");
    let session: RegistrationKind = serde_json::from_str(r#"{"type":"session"}"#).unwrap();
    assert_eq!(session, RegistrationKind::Session);
}

#[test]
fn test_admission_serializes_status() {
    let reg = Registration::new(
        Uuid::now_v7(),
        student("a", "Ann", "Lee"),
        RegistrationKind::Session,
        at(0),
    );
    let json = serde_json::to_value(Admission::AlreadyRegistered(reg.clone())).unwrap();
    assert_eq!(json["status"], "already_registered");
    assert_eq!(json["registration"]["student"]["id"], "a");
    assert!(Admission::Registered(reg).is_new());
}

#[test]
fn test_validate_student() {
    assert!(validate_student(&student("s1", "Ann", "Lee")).is_ok());

    let mut bad = student("s1", "Ann", "Lee");
    bad.email = "not-an-email".into();
    assert!(matches!(
        validate_student(&bad),
        Err(ShalaError::InvalidInput(_))
    ));

    let mut blank = student("s1", "Ann", "Lee");
    blank.id = "  ".into();
    assert!(validate_student(&blank).is_err());
}

#[test]
fn test_normalized_trims_contact_fields() {
    let mut padded = student(" s1 ", " Ann ", "Lee\n");
    padded.email = "\tann@example.com  ".into();
    let clean = padded.normalized();
    assert_eq!(clean.id, " s1 ");
    assert_eq!(clean.first_name, "Ann");
    assert_eq!(clean.last_name, "Lee");
    assert_eq!(clean.email, "ann@example.com");
    assert!(validate_student(&clean).is_ok());
}

#[test]
fn test_sort_roster_by_last_then_first() {
    let class_id = Uuid::now_v7();
    let names = [("1", "Zoe", "Adams"), ("2", "amy", "Baker"), ("3", "Al", "adams")];
    let mut regs: Vec<Registration> = names
        .into_iter()
        .map(|(id, f, l)| {
            Registration::new(class_id, student(id, f, l), RegistrationKind::Session, at(0))
        })
        .collect();
    sort_roster(&mut regs);
    let ids: Vec<&str> = regs.iter().map(|r| r.student_id()).collect();
    assert_eq!(ids, vec!["3", "1", "2"]);
}

#[test]
fn test_validate_session_input() {
    assert!(validate_session_input("Spring", at(0), at(10)).is_ok());
    assert!(validate_session_input("Spring", at(10), at(10)).is_ok());
    assert!(validate_session_input("Spring", at(11), at(10)).is_err());
    assert!(validate_session_input("   ", at(0), at(10)).is_err());
}

#[test]
fn test_validate_class_fields() {
    assert!(validate_class_fields("Hatha", "", 60, 12).is_ok());
    assert!(validate_class_fields("Hatha", "", 60, 0).is_err());
    assert!(validate_class_fields("Hatha", "", 0, 12).is_err());
    assert!(validate_class_fields("", "", 60, 12).is_err());
}

#[test]
fn test_sort_classes_by_title_and_start() {
    let mut classes = vec![
        class("Yin", Weekday::Mon, 18),
        class("ashtanga", Weekday::Wed, 7),
        class("Hatha", Weekday::Mon, 9),
    ];

    sort_classes(&mut classes, ClassOrder::Title);
    let titles: Vec<&str> = classes.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["ashtanga", "Hatha", "Yin"]);

    sort_classes(&mut classes, ClassOrder::StartTime);
    let titles: Vec<&str> = classes.iter().map(|c| c.title.as_str()).collect();
    assert_eq!(titles, vec!["Hatha", "Yin", "ashtanga"]);
}

#[test]
fn test_class_order_parse() {
    assert_eq!("title".parse::<ClassOrder>().unwrap(), ClassOrder::Title);
    assert_eq!("start".parse::<ClassOrder>().unwrap(), ClassOrder::StartTime);
    assert!("weekday".parse::<ClassOrder>().is_err());
}

#[test]
fn test_class_dates_within_session() {
    // 2026-01-05 is a Monday.
    let session = Session::new(
        "Winter".into(),
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap(),
    );
    let monday = class("Hatha", Weekday::Mon, 9);

    let all = monday.dates(&session, session.starts_at);
    assert_eq!(all.len(), 4);
    assert_eq!(all[0], Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap());
    assert_eq!(all[3], Utc.with_ymd_and_hms(2026, 1, 26, 9, 0, 0).unwrap());

    // Starting mid-morning on the 12th skips that day's class.
    let later = monday.dates(&session, Utc.with_ymd_and_hms(2026, 1, 12, 10, 0, 0).unwrap());
    assert_eq!(later.len(), 2);
    assert_eq!(later[0], Utc.with_ymd_and_hms(2026, 1, 19, 9, 0, 0).unwrap());
}

#[test]
fn test_class_dates_after_session_end() {
    let session = Session::new("Short".into(), at(0), at(86_400));
    let c = class("Hatha", Weekday::Fri, 9);
    assert!(c.dates(&session, at(10 * 86_400)).is_empty());
}

#[test]
fn test_class_new_drops_blank_teacher() {
    let mut input = NewClass {
        session_id: Uuid::now_v7(),
        title: "  Vinyasa ".into(),
        description: String::new(),
        teacher_id: Some(" ".into()),
        weekday: Weekday::Tue,
        start_time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
        duration_minutes: 75,
        capacity: 15,
        drop_in_only: false,
    };
    let c = Class::new(input.clone());
    assert_eq!(c.title, "Vinyasa");
    assert!(c.teacher_id.is_none());

    input.teacher_id = Some("t-7".into());
    assert_eq!(Class::new(input).teacher_id.as_deref(), Some("t-7"));
}

#[test]
fn test_session_is_active() {
    let s = Session::new("Spring".into(), at(0), at(100));
    assert!(s.is_active(at(100)));
    assert!(!s.is_active(at(101)));
}
