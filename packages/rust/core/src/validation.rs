//! Structural and business validation of a parsed [`ImportRow`].
//!
//! Every rule runs; a row collects all of its problems rather than stopping at
//! the first one. Date *parsing* errors are raised earlier, by the parser, so
//! the date rules here only look at dates that parsed.

use std::sync::LazyLock;

use chrono::{Datelike, Months, NaiveDate};
use regex::Regex;
use tracing::debug;

use staffload_shared::{ImportRow, ValidationRules, limits};

/// `local@domain` with no whitespace, quoting, or display-name decoration.
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[^\s@<>()\[\]\\,;:"]+@[^\s@<>()\[\]\\,;:"]+$"#).expect("email regex")
});

/// Apply every row rule, appending messages to `row`.
pub fn validate_row(row: &mut ImportRow, rules: &ValidationRules) {
    let mut errors = field_errors(row);

    if let Some(dob) = row.date_of_birth {
        check_date_of_birth(&mut errors, dob, rules);
    }
    if let Some(start) = row.start_date {
        check_start_date(&mut errors, start, row.date_of_birth, rules);
    }

    record(row, errors);
}

/// Apply only the text field rules (presence, length, email shape).
///
/// Used when re-checking an edited record, whose dates cannot change.
pub fn validate_fields(row: &mut ImportRow) {
    let errors = field_errors(row);
    record(row, errors);
}

fn field_errors(row: &ImportRow) -> Vec<String> {
    let mut errors = Vec::new();

    required(&mut errors, "Payroll Number", &row.payroll_number, limits::PAYROLL_NUMBER);
    required(&mut errors, "Forenames", &row.forenames, limits::FORENAMES);
    required(&mut errors, "Surname", &row.surname, limits::SURNAME);
    required(&mut errors, "Address", &row.address_line1, limits::ADDRESS_LINE1);
    required(&mut errors, "Postcode", &row.postcode, limits::POSTCODE);
    check_email(&mut errors, &row.email);

    optional(&mut errors, "Telephone", &row.telephone, limits::TELEPHONE);
    optional(&mut errors, "Mobile", &row.mobile, limits::MOBILE);
    optional(&mut errors, "Address 2", &row.address_line2, limits::ADDRESS_LINE2);

    errors
}

fn record(row: &mut ImportRow, errors: Vec<String>) {
    if !errors.is_empty() {
        debug!(row = row.row_number, errors = errors.len(), "row failed validation");
    }
    for message in errors {
        row.add_error(message);
    }
}

/// Whether `value` is a single bare email address.
pub fn is_valid_email(value: &str) -> bool {
    if !EMAIL_RE.is_match(value) {
        return false;
    }
    // The regex guarantees exactly one '@'.
    value.split('@').all(|part| {
        !part.starts_with('.') && !part.ends_with('.') && !part.contains("..")
    })
}

/// Whole years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

fn required(errors: &mut Vec<String>, label: &str, value: &Option<String>, max: usize) {
    match value.as_deref() {
        None | Some("") => errors.push(format!("{label} is required")),
        Some(v) if char_len(v) > max => {
            errors.push(format!("{label} must not exceed {max} characters"))
        }
        Some(_) => {}
    }
}

fn optional(errors: &mut Vec<String>, label: &str, value: &Option<String>, max: usize) {
    if let Some(v) = value.as_deref() {
        if char_len(v) > max {
            errors.push(format!("{label} must not exceed {max} characters"));
        }
    }
}

fn check_email(errors: &mut Vec<String>, value: &Option<String>) {
    match value.as_deref() {
        None | Some("") => errors.push("Email is required".into()),
        Some(v) => {
            if !is_valid_email(v) {
                errors.push("Email is not a valid email address".into());
            }
            if char_len(v) > limits::EMAIL {
                errors.push(format!("Email must not exceed {} characters", limits::EMAIL));
            }
        }
    }
}

fn check_date_of_birth(errors: &mut Vec<String>, dob: NaiveDate, rules: &ValidationRules) {
    if dob > rules.today {
        errors.push("Date of Birth cannot be in the future".into());
        return;
    }

    let age = age_on(dob, rules.today);
    if age < rules.min_age as i32 {
        errors.push(format!(
            "Employee must be at least {} years old",
            rules.min_age
        ));
    } else if age > rules.max_age as i32 {
        errors.push(format!(
            "Employee must not be older than {} years",
            rules.max_age
        ));
    }
}

fn check_start_date(
    errors: &mut Vec<String>,
    start: NaiveDate,
    dob: Option<NaiveDate>,
    rules: &ValidationRules,
) {
    if start > rules.today {
        errors.push("Start Date cannot be in the future".into());
    }

    let earliest = rules
        .today
        .checked_sub_months(Months::new(rules.max_service_years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN);
    if start < earliest {
        errors.push(format!(
            "Start Date cannot be more than {} years in the past",
            rules.max_service_years
        ));
    }

    if let Some(dob) = dob {
        if start < dob {
            errors.push("Start Date cannot be before Date of Birth".into());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rules() -> ValidationRules {
        ValidationRules::default().with_today(ymd(2024, 6, 15))
    }

    fn valid_row() -> ImportRow {
        let mut row = ImportRow::new(1);
        row.payroll_number = Some("COOP08".into());
        row.forenames = Some("Ann".into());
        row.surname = Some("Cooper".into());
        row.address_line1 = Some("1 Mill Lane".into());
        row.postcode = Some("LS1 4AB".into());
        row.email = Some("ann.cooper@example.com".into());
        row.date_of_birth = Some(ymd(1955, 1, 26));
        row.start_date = Some(ymd(2013, 4, 18));
        row
    }

    #[test]
    fn clean_row_stays_valid() {
        let mut row = valid_row();
        validate_row(&mut row, &rules());
        assert!(row.is_valid(), "errors: {:?}", row.errors());
    }

    #[test]
    fn blank_payroll_number_is_required() {
        let mut row = valid_row();
        row.payroll_number = None;
        validate_row(&mut row, &rules());
        assert!(!row.is_valid());
        assert!(row.errors()[0].contains("Payroll Number is required"));
    }

    #[test]
    fn errors_accumulate_in_rule_order() {
        let mut row = valid_row();
        row.payroll_number = Some("X".repeat(51));
        row.surname = None;
        row.postcode = Some("P".repeat(21));
        row.email = Some("Ann <ann@example.com>".into());
        row.telephone = Some("0".repeat(21));
        validate_row(&mut row, &rules());

        assert_eq!(
            row.errors(),
            [
                "Payroll Number must not exceed 50 characters",
                "Surname is required",
                "Postcode must not exceed 20 characters",
                "Email is not a valid email address",
                "Telephone must not exceed 20 characters",
            ]
        );
    }

    #[test]
    fn length_limits_at_and_over_max() {
        type Setter = fn(&mut ImportRow, String);
        let cases: [(&str, usize, Setter); 9] = [
            ("Payroll Number", 50, |r, v| r.payroll_number = Some(v)),
            ("Forenames", 100, |r, v| r.forenames = Some(v)),
            ("Surname", 100, |r, v| r.surname = Some(v)),
            ("Address", 200, |r, v| r.address_line1 = Some(v)),
            ("Postcode", 20, |r, v| r.postcode = Some(v)),
            ("Telephone", 20, |r, v| r.telephone = Some(v)),
            ("Mobile", 20, |r, v| r.mobile = Some(v)),
            ("Address 2", 100, |r, v| r.address_line2 = Some(v)),
            ("Email", 100, |r, v| r.email = Some(v)),
        ];

        // 'é' is two bytes, so a byte count would trip the limit early.
        let value = |len: usize, label: &str| {
            if label == "Email" {
                format!("{}@example.com", "é".repeat(len - "@example.com".len()))
            } else {
                "é".repeat(len)
            }
        };

        for (label, max, set) in cases {
            let mut row = valid_row();
            set(&mut row, value(max, label));
            validate_row(&mut row, &rules());
            assert!(row.is_valid(), "{label} at {max}: {:?}", row.errors());

            let mut row = valid_row();
            set(&mut row, value(max + 1, label));
            validate_row(&mut row, &rules());
            assert_eq!(
                row.errors(),
                [format!("{label} must not exceed {max} characters")],
                "{label} at {}",
                max + 1
            );
        }
    }

    #[test]
    fn long_malformed_email_reports_both_problems() {
        let mut row = valid_row();
        row.email = Some("x".repeat(101));
        validate_row(&mut row, &rules());
        assert_eq!(
            row.errors(),
            [
                "Email is not a valid email address",
                "Email must not exceed 100 characters",
            ]
        );
    }

    #[test]
    fn field_rules_ignore_dates() {
        let mut row = valid_row();
        row.date_of_birth = Some(ymd(1900, 1, 1));
        row.start_date = Some(ymd(1950, 1, 1));
        validate_fields(&mut row);
        assert!(row.is_valid(), "errors: {:?}", row.errors());

        row.postcode = None;
        validate_fields(&mut row);
        assert_eq!(row.errors(), ["Postcode is required"]);
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let mut row = valid_row();
        row.telephone = None;
        row.mobile = None;
        row.address_line2 = None;
        validate_row(&mut row, &rules());
        assert!(row.is_valid());
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b"));
        assert!(is_valid_email("first.last+tag@mail.example.co.uk"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("a@b@c"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("with space@example.com"));
        assert!(!is_valid_email("\"Ann\" <ann@example.com>"));
        assert!(!is_valid_email(".ann@example.com"));
        assert!(!is_valid_email("ann@example..com"));
    }

    #[test]
    fn age_boundary_at_sixteen() {
        let today = ymd(2024, 6, 15);
        let rules = rules();

        let mut row = valid_row();
        row.date_of_birth = Some(ymd(2008, 6, 15));
        row.start_date = Some(today);
        validate_row(&mut row, &rules);
        assert!(row.is_valid(), "errors: {:?}", row.errors());

        let mut row = valid_row();
        row.date_of_birth = Some(ymd(2008, 6, 16));
        row.start_date = Some(today);
        validate_row(&mut row, &rules);
        assert!(!row.is_valid());
        assert!(row.errors()[0].contains("must be at least 16 years old"));
    }

    #[test]
    fn age_upper_bound() {
        let mut row = valid_row();
        row.date_of_birth = Some(ymd(1924, 6, 15));
        row.start_date = Some(ymd(2000, 1, 1));
        validate_row(&mut row, &rules());
        assert!(row.is_valid(), "exactly 100 is allowed: {:?}", row.errors());

        let mut row = valid_row();
        row.date_of_birth = Some(ymd(1923, 6, 15));
        row.start_date = Some(ymd(2000, 1, 1));
        validate_row(&mut row, &rules());
        assert_eq!(row.errors(), ["Employee must not be older than 100 years"]);
    }

    #[test]
    fn future_dates_rejected() {
        let mut row = valid_row();
        row.date_of_birth = Some(ymd(2030, 1, 1));
        row.start_date = Some(ymd(2024, 6, 16));
        validate_row(&mut row, &rules());
        assert!(row.errors().contains(&"Date of Birth cannot be in the future".to_string()));
        assert!(row.errors().contains(&"Start Date cannot be in the future".to_string()));
    }

    #[test]
    fn start_date_window() {
        let mut row = valid_row();
        row.date_of_birth = Some(ymd(1950, 1, 1));
        row.start_date = Some(ymd(1974, 6, 14));
        validate_row(&mut row, &rules());
        assert_eq!(
            row.errors(),
            ["Start Date cannot be more than 50 years in the past"]
        );

        let mut row = valid_row();
        row.date_of_birth = Some(ymd(1950, 1, 1));
        row.start_date = Some(ymd(1974, 6, 15));
        validate_row(&mut row, &rules());
        assert!(row.is_valid());
    }

    #[test]
    fn start_before_birth_rejected() {
        let mut row = valid_row();
        row.date_of_birth = Some(ymd(1990, 5, 1));
        row.start_date = Some(ymd(1989, 5, 1));
        validate_row(&mut row, &rules());
        assert!(
            row.errors()
                .contains(&"Start Date cannot be before Date of Birth".to_string())
        );
    }

    #[test]
    fn age_handles_leap_day_birthdays() {
        let dob = ymd(2008, 2, 29);
        assert_eq!(age_on(dob, ymd(2024, 2, 28)), 15);
        assert_eq!(age_on(dob, ymd(2024, 2, 29)), 16);
        assert_eq!(age_on(dob, ymd(2025, 3, 1)), 17);
    }
}
