//! Enumerated values shared across models.
//!
//! Every enum serializes as its display text (`"Slow Learner"`, `"N/A"`, ...)
//! and is stored in SQLite as that same text.

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use std::str::FromStr;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($text) {
                        return Ok($name::$variant);
                    }
                )+
                Err(format!(
                    "Invalid {}. Must be one of: {}",
                    $label,
                    Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join(", ")
                ))
            }
        }
    };
}

text_enum! {
    /// User role
    Role, "role" {
        /// Full access to every class
        Admin => "admin",
        /// Limited to assigned classes and own records
        Teacher => "teacher",
    }
}

text_enum! {
    /// Pre-primary class
    ClassName, "class" {
        Nursery => "Nursery",
        Lkg => "LKG",
        Ukg => "UKG",
    }
}

text_enum! {
    LearningAbility, "learning ability" {
        Talented => "Talented",
        Average => "Average",
        SlowLearner => "Slow Learner",
    }
}

text_enum! {
    /// Writing speed; always `N/A` for Nursery students
    WritingSpeed, "writing speed" {
        SpeedWriting => "Speed Writing",
        SlowWriting => "Slow Writing",
        NotApplicable => "N/A",
    }
}

text_enum! {
    /// Rating used for every progress dimension
    Rating, "rating" {
        Excellent => "Excellent",
        Good => "Good",
        NeedsImprovement => "Needs Improvement",
    }
}

text_enum! {
    PlanType, "plan type" {
        Annual => "Annual",
        Monthly => "Monthly",
        Weekly => "Weekly",
    }
}

/// Current time in the format stored in `created_at`/`updated_at` columns.
///
/// Fixed-width UTC so that timestamps compare correctly as text.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Decode a text column into one of the enums above.
pub(crate) fn decode_text<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

pub(crate) fn decode_date(row: &SqliteRow, column: &str) -> Result<NaiveDate, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn encode_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
