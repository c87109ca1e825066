use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fake::Fake;
use fake::faker::address::en::{CityName, CountryName, StreetName, ZipCode};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::{SafeEmail, Username};
use fake::faker::lorem::en::Sentence;
use fake::faker::name::en::{FirstName, LastName, Name};
use fake::faker::phone_number::en::PhoneNumber;
use rand::Rng;
use relsynth_core::{Column, SemanticType};

use crate::value::{GeneratedValue, truncate};

/// Deterministic value for a unique column at `row_index`.
pub(crate) fn unique_value(column: &Column, row_index: u64, base_date: NaiveDate) -> GeneratedValue {
    match column.semantic() {
        SemanticType::Uuid => {
            GeneratedValue::Uuid(uuid::Uuid::from_u128(row_index as u128 + 1).to_string())
        }
        SemanticType::Integer | SemanticType::Decimal => GeneratedValue::Int(row_index as i64 + 1),
        SemanticType::Date => GeneratedValue::Date(base_date + Duration::days(row_index as i64)),
        SemanticType::Timestamp => GeneratedValue::Timestamp(NaiveDateTime::new(
            base_date + Duration::days(row_index as i64),
            noon(),
        )),
        SemanticType::Time => GeneratedValue::Time(time_from_seconds((row_index % 86_400) as u32)),
        SemanticType::Boolean => GeneratedValue::Bool(row_index % 2 == 0),
        SemanticType::Text | SemanticType::Json => {
            let value = if is_email_column(&column.name) {
                format!("user{:05}@example.com", row_index + 1)
            } else {
                format!("{}_{:05}", column.name, row_index + 1)
            };
            GeneratedValue::Text(truncate(value, column))
        }
    }
}

/// Type-driven value for columns nothing else describes.
pub(crate) fn fallback_for_type<R: Rng + ?Sized>(
    column: &Column,
    base_date: NaiveDate,
    rng: &mut R,
) -> GeneratedValue {
    match column.semantic() {
        SemanticType::Uuid => GeneratedValue::Uuid(random_uuid(rng)),
        SemanticType::Integer => GeneratedValue::Int(rng.random_range(1..=100_000)),
        SemanticType::Decimal => {
            if column.column_type.numeric_scale.unwrap_or(0) > 0 {
                GeneratedValue::from_number(rng.random_range(0.0..=100_000.0), column)
            } else {
                GeneratedValue::Int(rng.random_range(1..=100_000))
            }
        }
        SemanticType::Boolean => GeneratedValue::Bool(rng.random_bool(0.5)),
        SemanticType::Date => {
            let offset = rng.random_range(0..=365);
            GeneratedValue::Date(base_date + Duration::days(offset))
        }
        SemanticType::Timestamp => {
            let offset = rng.random_range(0..=365);
            let seconds = rng.random_range(0..86_400);
            GeneratedValue::Timestamp(NaiveDateTime::new(
                base_date + Duration::days(offset),
                time_from_seconds(seconds),
            ))
        }
        SemanticType::Time => GeneratedValue::Time(time_from_seconds(rng.random_range(0..86_400))),
        SemanticType::Json => GeneratedValue::Text(format!("{{\"id\":{}}}", rng.random::<u32>())),
        SemanticType::Text => {
            let value = format!("{}_{}", column.name, rng.random::<u32>());
            GeneratedValue::Text(truncate(value, column))
        }
    }
}

/// Value for a SQL column default such as `now()` or `'pending'::text`.
pub(crate) fn column_default<R: Rng + ?Sized>(
    column: &Column,
    base_date: NaiveDate,
    rng: &mut R,
) -> Option<GeneratedValue> {
    let normalized = normalize_default(column.default.as_deref()?);
    let value = match normalized.to_lowercase().as_str() {
        "gen_random_uuid()" | "uuid_generate_v4()" => GeneratedValue::Uuid(random_uuid(rng)),
        "now()" | "current_timestamp" => {
            GeneratedValue::Timestamp(NaiveDateTime::new(base_date, noon()))
        }
        "current_date" => GeneratedValue::Date(base_date),
        "true" => GeneratedValue::Bool(true),
        "false" => GeneratedValue::Bool(false),
        _ => {
            if normalized.len() >= 2 && normalized.starts_with('\'') && normalized.ends_with('\'')
            {
                let literal = &normalized[1..normalized.len() - 1];
                return GeneratedValue::parse_label(literal, column);
            }
            return GeneratedValue::parse_label(&normalized, column);
        }
    };
    value.fits(column.semantic()).then_some(value)
}

fn normalize_default(default: &str) -> String {
    let mut value = default.trim().to_string();
    if let Some((left, _)) = value.split_once("::") {
        value = left.trim().to_string();
    }
    while value.starts_with('(') && value.ends_with(')') && value.len() >= 2 {
        value = value[1..value.len() - 1].trim().to_string();
    }
    value
}

/// Realistic text for well-known column names.
pub(crate) fn semantic_text<R: Rng + ?Sized>(column: &Column, rng: &mut R) -> Option<String> {
    let name = column.name.to_lowercase();
    let value: String = if is_email_column(&name) {
        SafeEmail().fake_with_rng(rng)
    } else if name == "first_name" || name == "firstname" || name == "given_name" {
        FirstName().fake_with_rng(rng)
    } else if name == "last_name" || name == "lastname" || name == "surname" {
        LastName().fake_with_rng(rng)
    } else if name == "name" || name == "full_name" || (name.ends_with("_name") && name != "user_name")
    {
        if name.starts_with("company") {
            CompanyName().fake_with_rng(rng)
        } else if name.starts_with("city") {
            CityName().fake_with_rng(rng)
        } else if name.starts_with("country") {
            CountryName().fake_with_rng(rng)
        } else {
            Name().fake_with_rng(rng)
        }
    } else if name == "username" || name == "user_name" || name == "login" {
        Username().fake_with_rng(rng)
    } else if name.contains("phone") {
        PhoneNumber().fake_with_rng(rng)
    } else if name == "city" {
        CityName().fake_with_rng(rng)
    } else if name == "country" {
        CountryName().fake_with_rng(rng)
    } else if name == "street" || name == "address" || name == "street_address" {
        StreetName().fake_with_rng(rng)
    } else if name == "zip" || name == "zip_code" || name == "postal_code" {
        ZipCode().fake_with_rng(rng)
    } else if name == "company" {
        CompanyName().fake_with_rng(rng)
    } else if name == "description" || name == "notes" || name == "comment" {
        Sentence(3..8).fake_with_rng(rng)
    } else {
        return None;
    };
    Some(truncate(value, column))
}

fn is_email_column(name: &str) -> bool {
    let name = name.to_lowercase();
    name == "email" || name.ends_with("_email") || name.starts_with("email_")
}

pub(crate) fn random_uuid<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes: [u8; 16] = rng.random();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes).to_string()
}

/// Date or timestamp value for a point in time, following the column type.
pub(crate) fn temporal_value(column: &Column, at: NaiveDateTime) -> GeneratedValue {
    match column.semantic() {
        SemanticType::Date => GeneratedValue::Date(at.date()),
        _ => GeneratedValue::Timestamp(at),
    }
}

fn noon() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()
}

fn time_from_seconds(seconds: u32) -> NaiveTime {
    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default()
}
