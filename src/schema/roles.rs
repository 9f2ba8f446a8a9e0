//! Column role table
//!
//! Roles come from an explicit versioned table of canonical columns per
//! record group. Columns missing from the table fall back to name markers.

use super::types::ColumnRole;
use std::collections::HashMap;

/// Name markers for `YYYYMMDD` date columns
const DATE_MARKERS: &[&str] = &["data", "dt_", "date"];

/// Name markers for amount columns
const AMOUNT_MARKERS: &[&str] = &["val", "vl_"];

/// Columns whose values are codes with significant leading zeros
const CODE_COLUMNS: &[&str] = &[
    "cnes",
    "proc_rea",
    "proc_solic",
    "cid",
    "diag_princ",
    "diag_secun",
    "munic_res",
    "munic_mov",
    "cep",
    "cbo",
    "cbor",
    "n_aih",
];

/// Built-in canonical roles: (record group, column, role)
const BUILTIN_ROLES: &[(&str, &str, ColumnRole)] = &[
    // Hospital admissions (reduced AIH)
    ("RD", "dt_inter", ColumnRole::Date),
    ("RD", "dt_saida", ColumnRole::Date),
    ("RD", "nasc", ColumnRole::Date),
    ("RD", "val_sh", ColumnRole::Amount),
    ("RD", "val_sp", ColumnRole::Amount),
    ("RD", "val_tot", ColumnRole::Amount),
    ("RD", "val_uti", ColumnRole::Amount),
    ("RD", "us_tot", ColumnRole::Amount),
    ("RD", "n_aih", ColumnRole::Code),
    ("RD", "cnes", ColumnRole::Code),
    ("RD", "proc_rea", ColumnRole::Code),
    ("RD", "proc_solic", ColumnRole::Code),
    ("RD", "diag_princ", ColumnRole::Code),
    ("RD", "munic_res", ColumnRole::Code),
    ("RD", "munic_mov", ColumnRole::Code),
    ("RD", "cep", ColumnRole::Code),
    // Rejected admissions
    ("ER", "dt_inter", ColumnRole::Date),
    ("ER", "dt_saida", ColumnRole::Date),
    ("ER", "n_aih", ColumnRole::Code),
    ("ER", "cnes", ColumnRole::Code),
    // Professional services
    ("SP", "sp_dtinter", ColumnRole::Date),
    ("SP", "sp_dtsaida", ColumnRole::Date),
    ("SP", "sp_valato", ColumnRole::Amount),
    ("SP", "sp_naih", ColumnRole::Code),
    ("SP", "sp_cnes", ColumnRole::Code),
    ("SP", "sp_procrea", ColumnRole::Code),
    ("SP", "sp_atoprof", ColumnRole::Code),
    ("SP", "sp_m_hosp", ColumnRole::Code),
    ("SP", "sp_m_pac", ColumnRole::Code),
    // Outpatient production; `pa_cmp` is a YYYYMM competence, not a date
    ("PA", "pa_cmp", ColumnRole::Plain),
    ("PA", "pa_mvm", ColumnRole::Plain),
    ("PA", "pa_valapr", ColumnRole::Amount),
    ("PA", "pa_valpro", ColumnRole::Amount),
    ("PA", "pa_coduni", ColumnRole::Code),
    ("PA", "pa_proc_id", ColumnRole::Code),
    ("PA", "pa_ufmun", ColumnRole::Code),
    ("PA", "pa_munpcn", ColumnRole::Code),
    ("PA", "pa_cidpri", ColumnRole::Code),
    ("PA", "pa_cbocod", ColumnRole::Code),
];

/// Current version of the built-in role table
pub const ROLE_TABLE_VERSION: u32 = 1;

/// Versioned mapping of (record group, column) to role
#[derive(Debug, Clone)]
pub struct RoleTable {
    version: u32,
    entries: HashMap<(String, String), ColumnRole>,
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RoleTable {
    /// Empty table: every lookup falls back to name markers
    pub fn empty() -> Self {
        Self {
            version: 0,
            entries: HashMap::new(),
        }
    }

    /// The built-in table of canonical columns
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.version = ROLE_TABLE_VERSION;
        for (group, column, role) in BUILTIN_ROLES {
            table.insert(group, column, *role);
        }
        table
    }

    /// Table version
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Add or override an entry
    pub fn insert(&mut self, record_group: &str, column: &str, role: ColumnRole) {
        self.entries.insert(
            (record_group.to_ascii_uppercase(), column.to_ascii_lowercase()),
            role,
        );
    }

    /// Add every role of one record group
    #[must_use]
    pub fn with_group_roles<'a>(
        mut self,
        record_group: &str,
        roles: impl IntoIterator<Item = (&'a String, &'a ColumnRole)>,
    ) -> Self {
        for (column, role) in roles {
            self.insert(record_group, column, *role);
        }
        self
    }

    /// Explicit entry, if any
    pub fn get(&self, record_group: &str, column: &str) -> Option<ColumnRole> {
        self.entries
            .get(&(record_group.to_ascii_uppercase(), column.to_ascii_lowercase()))
            .copied()
    }

    /// Role for a column: table entry first, then name markers
    pub fn role_for(&self, record_group: Option<&str>, column: &str) -> ColumnRole {
        record_group
            .and_then(|group| self.get(group, column))
            .unwrap_or_else(|| heuristic_role(column))
    }
}

/// Fallback role from name markers alone
pub fn heuristic_role(column: &str) -> ColumnRole {
    let name = column.to_ascii_lowercase();
    if DATE_MARKERS.iter().any(|m| name.contains(m)) {
        ColumnRole::Date
    } else if AMOUNT_MARKERS.iter().any(|m| name.contains(m)) {
        ColumnRole::Amount
    } else if CODE_COLUMNS.contains(&name.as_str()) {
        ColumnRole::Code
    } else {
        ColumnRole::Plain
    }
}
