use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static UUID_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex")
});

#[derive(Clone, Debug, PartialEq)]
pub struct StrC {
    /// Distinct values, until [`StrC::overflow`].
    pub lits: BTreeSet<String>,
    /// More than the literal cap was seen; `lits` is no longer meaningful.
    pub overflow: bool,
    /// Strings observed, counting repeats.
    pub seen: u64,
    pub all_dates: bool,
    pub all_uuids: bool,
    /// Decided by `normalize`.
    pub is_enum: bool,
}

impl StrC {
    pub(super) fn observe(s: &str) -> Self {
        Self {
            lits: BTreeSet::from([s.to_string()]),
            overflow: false,
            seen: 1,
            all_dates: looks_like_date(s),
            all_uuids: looks_like_uuid(s),
            is_enum: false,
        }
    }
}

pub fn join_str(a: &StrC, b: &StrC) -> StrC {
    let mut lits = &a.lits | &b.lits;
    let overflow = a.overflow || b.overflow || lits.len() > super::MAX_STR_LITS;
    if overflow {
        lits.clear();
    }
    StrC {
        lits,
        overflow,
        seen: a.seen + b.seen,
        all_dates: a.all_dates && b.all_dates,
        all_uuids: a.all_uuids && b.all_uuids,
        is_enum: false,
    }
}

pub fn looks_like_date(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
}

pub fn looks_like_uuid(s: &str) -> bool {
    UUID_LIKE.is_match(s)
}

pub fn looks_humanish(s: &str) -> bool {
    // lightweight: letters/digits/space/dash/underscore and not too long
    s.len() <= super::STRING_ENUM_MAX_LEN
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == ' ' || c == '-' || c == '_')
}
