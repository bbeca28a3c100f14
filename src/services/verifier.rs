// src/services/verifier.rs
//! Credential predicate evaluation.
//!
//! Answers yes/no eligibility questions from an encrypted credential
//! subject without returning the underlying attributes. The subject is
//! decrypted on demand for each check and nothing is cached.

use crate::error::Result;
use crate::services::selective_encryption::open_claims;
use chrono::{DateTime, Datelike, Local, NaiveDate};
use k256::SecretKey;
use serde_json::{Map, Value};
use std::fmt;

/// Minimum age in whole years for [`Predicate::Adult`].
pub const AGE_OF_MAJORITY: i32 = 18;

/// Nationalities the evaluator can check for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nationality {
    French,
    Italian,
    English,
}

impl Nationality {
    /// Exact claim value this nationality matches.
    pub fn as_str(&self) -> &'static str {
        match self {
            Nationality::French => "French",
            Nationality::Italian => "Italian",
            Nationality::English => "English",
        }
    }
}

/// A boolean eligibility question about the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predicate {
    /// At least 18 whole years old today
    Adult,
    Nationality(Nationality),
}

impl Predicate {
    /// Every supported predicate, in report order.
    pub const ALL: [Predicate; 4] = [
        Predicate::Adult,
        Predicate::Nationality(Nationality::French),
        Predicate::Nationality(Nationality::Italian),
        Predicate::Nationality(Nationality::English),
    ];
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Adult => write!(f, "age >= {}", AGE_OF_MAJORITY),
            Predicate::Nationality(n) => write!(f, "nationality == {}", n.as_str()),
        }
    }
}

/// Result of a session-level predicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateOutcome {
    Satisfied,
    NotSatisfied,
    /// The check could not run: no stored subject, no key, or decryption failed
    Unavailable(String),
}

impl PredicateOutcome {
    pub fn from_bool(satisfied: bool) -> Self {
        if satisfied {
            PredicateOutcome::Satisfied
        } else {
            PredicateOutcome::NotSatisfied
        }
    }

    /// Collapses to a plain answer; anything unavailable counts as `false`.
    pub fn as_bool(&self) -> bool {
        matches!(self, PredicateOutcome::Satisfied)
    }
}

impl fmt::Display for PredicateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateOutcome::Satisfied => f.write_str("Yes"),
            PredicateOutcome::NotSatisfied => f.write_str("No"),
            PredicateOutcome::Unavailable(reason) => write!(f, "Unavailable ({})", reason),
        }
    }
}

/// Evaluates `predicate` against an encrypted subject as of today (local time).
///
/// # Errors
/// `Decryption` if the subject cannot be opened with `secret`.
pub fn evaluate(ciphertext: &str, secret: &SecretKey, predicate: Predicate) -> Result<bool> {
    evaluate_at(ciphertext, secret, predicate, Local::now().date_naive())
}

/// Same as [`evaluate`] with a fixed calendar date for "today".
pub fn evaluate_at(
    ciphertext: &str,
    secret: &SecretKey,
    predicate: Predicate,
    today: NaiveDate,
) -> Result<bool> {
    let claims = open_claims(ciphertext, secret)?;
    Ok(check_claims(&claims, predicate, today))
}

/// Evaluates `predicate` against plaintext claims.
pub fn check_claims(claims: &Map<String, Value>, predicate: Predicate, today: NaiveDate) -> bool {
    match predicate {
        Predicate::Adult => claims
            .get("birthDate")
            .and_then(Value::as_str)
            .and_then(parse_birth_date)
            .map(|birth| age_on(birth, today) >= AGE_OF_MAJORITY)
            .unwrap_or(false),
        Predicate::Nationality(nationality) => {
            claims.get("nationality").and_then(Value::as_str) == Some(nationality.as_str())
        }
    }
}

/// Whole years between `birth` and `today`.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years - 1
    } else {
        years
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
fn parse_birth_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}
