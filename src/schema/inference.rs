//! Type inference from column fingerprints
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. all-null sample: unbounded text
//! 2. date role: `DATE`, `DATE` with auxiliary column when repair was needed, or text
//! 3. amount role: `NUMERIC` when every sample is numeric, else text
//! 4. leading zeros or code role: text
//! 5. boolean tokens only: `BOOLEAN`
//! 6. numbers only: narrowest integer width, or `NUMERIC` for decimals
//! 7. mixed representations: unbounded text
//! 8. sized text
//!
//! Every "text" outcome of rules 2-4 is sized the same way as rule 8.

use super::roles::RoleTable;
use super::types::{AuxiliaryPolicy, ColumnDecision, ColumnRole, TargetType, TypeDecision, MAX_VARCHAR_WIDTH};
use crate::coerce::{classify_number, is_all_digits, parse_bool_token, parse_yyyymmdd, DateParse, NumberKind};
use crate::profile::ColumnFingerprint;

/// Deterministic type inferrer
#[derive(Debug, Clone, Default)]
pub struct TypeInferrer {
    roles: RoleTable,
    policy: AuxiliaryPolicy,
}

impl TypeInferrer {
    /// Inferrer using the built-in role table and the date-repair policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the role table
    #[must_use]
    pub fn with_roles(mut self, roles: RoleTable) -> Self {
        self.roles = roles;
        self
    }

    /// Set the auxiliary column policy
    #[must_use]
    pub fn with_auxiliary_policy(mut self, policy: AuxiliaryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Infer a column's type from its name and fingerprint
    pub fn infer(&self, column_name: &str, fingerprint: &ColumnFingerprint) -> TypeDecision {
        self.decide(None, column_name, fingerprint)
    }

    /// Infer within a record group, consulting the group's role entries
    pub fn infer_in_group(
        &self,
        record_group: &str,
        column_name: &str,
        fingerprint: &ColumnFingerprint,
    ) -> TypeDecision {
        self.decide(Some(record_group), column_name, fingerprint)
    }

    /// Infer every fingerprint of a record group, preserving order
    pub fn infer_all(&self, record_group: &str, fingerprints: &[ColumnFingerprint]) -> Vec<ColumnDecision> {
        fingerprints
            .iter()
            .map(|fp| ColumnDecision::new(&fp.column, self.infer_in_group(record_group, &fp.column, fp)))
            .collect()
    }

    fn decide(&self, record_group: Option<&str>, column_name: &str, fp: &ColumnFingerprint) -> TypeDecision {
        let decision = self.apply_rules(record_group, column_name, fp);
        match self.policy {
            AuxiliaryPolicy::AllTyped if !decision.target_type.is_text() => {
                TypeDecision::with_auxiliary(decision.target_type)
            }
            _ => decision,
        }
    }

    fn apply_rules(&self, record_group: Option<&str>, column_name: &str, fp: &ColumnFingerprint) -> TypeDecision {
        // Rule 1, and the degenerate empty sample
        if fp.is_all_null() || fp.sample_values.is_empty() {
            return TypeDecision::new(TargetType::Text);
        }

        let samples = &fp.sample_values;
        let role = self.roles.role_for(record_group, column_name);

        match role {
            ColumnRole::Date => return infer_date(fp),
            ColumnRole::Amount => {
                return if samples.iter().all(|v| classify_number(v).is_some()) {
                    TypeDecision::new(TargetType::Numeric)
                } else {
                    TypeDecision::new(sized_text(fp))
                };
            }
            ColumnRole::Code => return TypeDecision::new(sized_text(fp)),
            ColumnRole::Plain => {}
        }

        if fp.has_leading_zeros {
            return TypeDecision::new(sized_text(fp));
        }

        if samples.iter().all(|v| parse_bool_token(v).is_some()) {
            return TypeDecision::new(TargetType::Boolean);
        }

        if let Some(numeric) = infer_numeric(samples) {
            return TypeDecision::new(numeric);
        }

        if fp.has_mixed_representations {
            return TypeDecision::new(TargetType::Text);
        }

        TypeDecision::new(sized_text(fp))
    }
}

/// Rule 2
fn infer_date(fp: &ColumnFingerprint) -> TypeDecision {
    let samples = &fp.sample_values;

    // Year-month values are kept as text
    if samples.iter().all(|v| v.len() == 6 && is_all_digits(v)) {
        return TypeDecision::new(sized_text(fp));
    }

    let mut repaired = false;
    for value in samples {
        match parse_yyyymmdd(value) {
            DateParse::Valid(_) | DateParse::NoDate => {}
            DateParse::Repaired(_) => repaired = true,
            DateParse::Invalid => return TypeDecision::new(sized_text(fp)),
        }
    }

    if repaired {
        TypeDecision::with_auxiliary(TargetType::Date)
    } else {
        TypeDecision::new(TargetType::Date)
    }
}

/// Rule 6: `None` unless every sample is numeric
fn infer_numeric(samples: &[String]) -> Option<TargetType> {
    let mut widest = TargetType::SmallInt;
    for value in samples {
        match classify_number(value)? {
            NumberKind::Decimal | NumberKind::WholeOverflow => widest = TargetType::Numeric,
            NumberKind::Whole(n) => {
                let width = integer_width(n);
                widest = match (widest, width) {
                    (TargetType::Numeric, _) => TargetType::Numeric,
                    (TargetType::BigInt, _) | (_, TargetType::BigInt) => TargetType::BigInt,
                    (TargetType::Integer, _) | (_, TargetType::Integer) => TargetType::Integer,
                    _ => TargetType::SmallInt,
                };
            }
        }
    }
    Some(widest)
}

fn integer_width(n: i64) -> TargetType {
    if i16::try_from(n).is_ok() {
        TargetType::SmallInt
    } else if i32::try_from(n).is_ok() {
        TargetType::Integer
    } else {
        TargetType::BigInt
    }
}

/// Rule 8
fn sized_text(fp: &ColumnFingerprint) -> TargetType {
    let Ok(max) = u16::try_from(fp.max_length) else {
        return TargetType::Text;
    };
    if max > 0 && fp.max_length == fp.min_length {
        TargetType::FixedText(max)
    } else if max > 0 && max <= MAX_VARCHAR_WIDTH {
        TargetType::VarText(max)
    } else {
        TargetType::Text
    }
}
