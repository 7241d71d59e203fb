//! Raw portal text -> typed values.

use std::collections::HashSet;

use crate::{ComponentType, Degree, ExternallyIdentified, IngestError, IngestResult, Shift};

const DEGREE_TABLE: &[(&str, Degree)] = &[
    ("BACHAREL", Degree::Bachelor),
    ("BACHARELADO", Degree::Bachelor),
    ("LICENCIADO", Degree::Licentiate),
    ("LICENCIATURA", Degree::Licentiate),
];

const SHIFT_TABLE: &[(&str, Shift)] = &[("DIURNO", Shift::Day), ("NOTURNO", Shift::Night)];

/// Collapse every whitespace run (including NBSP) to a single space and trim.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `"360h"` -> 360. The unit suffix is optional; anything else non-numeric is rejected.
pub fn parse_workload(raw: &str) -> IngestResult<i32> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_suffix(&['h', 'H'][..])
        .unwrap_or(trimmed)
        .trim_end();
    parse_digits(digits).ok_or_else(|| IngestError::malformed("workload", raw))
}

/// Plain integer cell such as a period count.
pub fn parse_count(raw: &str) -> IngestResult<i32> {
    parse_digits(raw.trim()).ok_or_else(|| IngestError::malformed("count", raw))
}

fn parse_digits(value: &str) -> Option<i32> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// `"2017.1"` -> (2017, 1).
pub fn parse_year_period(raw: &str) -> IngestResult<(i32, i32)> {
    let (year, period) = raw
        .trim()
        .split_once('.')
        .ok_or_else(|| IngestError::malformed("start year/period", raw))?;
    let year = parse_digits(year.trim()).ok_or_else(|| IngestError::malformed("start year", raw))?;
    let period =
        parse_digits(period.trim()).ok_or_else(|| IngestError::malformed("start period", raw))?;
    Ok((year, period))
}

/// Listing marker "Ativa" -> true; anything else (notably "Inativa") -> false.
pub fn parse_active(raw: &str) -> bool {
    collapse_whitespace(raw).eq_ignore_ascii_case("ativa")
}

pub fn map_degree(raw: &str) -> Degree {
    let key = collapse_whitespace(raw).to_uppercase();
    DEGREE_TABLE
        .iter()
        .find(|(label, _)| *label == key)
        .map(|(_, degree)| *degree)
        .unwrap_or(Degree::Unknown)
}

pub fn map_shift(raw: &str) -> Shift {
    let key = collapse_whitespace(raw).to_uppercase();
    SHIFT_TABLE
        .iter()
        .find(|(label, _)| *label == key)
        .map(|(_, shift)| *shift)
        .unwrap_or(Shift::Unknown)
}

pub fn map_component_type(raw: &str) -> IngestResult<ComponentType> {
    match collapse_whitespace(raw).to_uppercase().as_str() {
        "DISCIPLINA" => Ok(ComponentType::Course),
        "ATIVIDADE" => Ok(ComponentType::Activity),
        _ => Err(IngestError::UnknownComponentType(raw.trim().to_string())),
    }
}

/// Split `"ACRONYM - TITLE"` on the first delimiter; the title keeps any later `" - "`.
pub fn split_acronym_title(raw: &str) -> IngestResult<(String, String)> {
    let text = collapse_whitespace(raw);
    let (acronym, title) = text
        .split_once(" - ")
        .ok_or_else(|| IngestError::malformed("department header", raw))?;
    let (acronym, title) = (acronym.trim(), title.trim());
    if acronym.is_empty() || title.is_empty() {
        return Err(IngestError::malformed("department header", raw));
    }
    Ok((acronym.to_string(), title.to_string()))
}

/// Leading whitespace-delimited token, e.g. the code in `"FGA0158 - ORIENTACAO ..."`.
pub fn first_token(raw: &str) -> Option<&str> {
    raw.split_whitespace().next()
}

/// All-or-nothing gate run before any write: every record needs a non-empty,
/// batch-unique external identifier.
pub fn validate_batch<T: ExternallyIdentified>(records: &[T]) -> IngestResult<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        let id = match record.external_id() {
            Some(id) if !id.trim().is_empty() => id,
            _ => {
                return Err(IngestError::MissingIdentifier {
                    entity: T::ENTITY,
                    record: record.describe(),
                })
            }
        };
        if !seen.insert(id.clone()) {
            return Err(IngestError::DuplicateIdentifier {
                entity: T::ENTITY,
                sigaa_id: id,
            });
        }
    }
    Ok(())
}
