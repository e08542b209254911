use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::Serialize;

use crate::bits;
use crate::error::MiningError;

/// On-disk token for a missing cell slot.
pub const MISSING_TOKEN: &str = "inf";

/// Joins the data-field slots of one pivot cell on disk.
pub const FIELD_SEPARATOR: &str = "|||";

/// Prefix marking key columns in the pivot header row.
pub const KEY_MARKER: &str = "K_";

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One uploaded batch: header names plus raw rows.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

// ---------------------------------------------------------------------------
// Entity identity
// ---------------------------------------------------------------------------

/// One component of an entity key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    /// IPv4 field reduced to its subnet bits.
    Subnet(String),
    /// Any other field, verbatim.
    Text(String),
}

impl KeyPart {
    pub fn from_field(raw: &str) -> Self {
        match bits::subnet_bits(raw) {
            Some(b) => Self::Subnet(b),
            None => Self::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subnet(b) => write!(f, "{}", bits::bits_to_cidr(b)),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Composite key of a pivot row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(pub Vec<KeyPart>);

impl EntityKey {
    pub fn from_fields<S: AsRef<str>>(fields: &[S]) -> Self {
        Self(fields.iter().map(|f| KeyPart::from_field(f.as_ref())).collect())
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.to_string()).collect()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.to_strings().join(", "))
    }
}

/// A mining column: one pivot row, one data field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnKey {
    pub entity: EntityKey,
    pub data_index: usize,
}

impl ColumnKey {
    /// Key components followed by the data index, as written to output tables.
    pub fn to_fields(&self) -> Vec<String> {
        let mut out = self.entity.to_strings();
        out.push(self.data_index.to_string());
        out
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.data_index)
    }
}

// ---------------------------------------------------------------------------
// Pivot table
// ---------------------------------------------------------------------------

/// One slot per configured data field; `None` is the missing sentinel.
pub type Cell = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub key: EntityKey,
    pub cells: Vec<Cell>,
}

/// Wide table: one row per entity, one column per reporting instance.
///
/// Rows keep first-seen order. Every row has one cell per instance and every
/// cell has `data_width` slots.
#[derive(Debug, Clone, Default)]
pub struct PivotTable {
    key_names: Vec<String>,
    instances: Vec<String>,
    data_width: usize,
    rows: Vec<PivotRow>,
    index: HashMap<EntityKey, usize>,
}

impl PivotTable {
    pub fn new(key_names: Vec<String>, data_width: usize) -> Self {
        Self {
            key_names,
            data_width,
            ..Self::default()
        }
    }

    /// Rebuild a table from persisted parts, checking the shape invariants.
    pub fn from_parts(
        key_names: Vec<String>,
        instances: Vec<String>,
        data_width: usize,
        rows: Vec<PivotRow>,
    ) -> Result<Self, MiningError> {
        let mut table = Self {
            key_names,
            instances,
            data_width,
            rows: Vec::with_capacity(rows.len()),
            index: HashMap::with_capacity(rows.len()),
        };
        for row in rows {
            if row.key.0.len() != table.key_names.len() {
                return Err(MiningError::PivotFormat(format!(
                    "key {} has {} component(s), header names {}",
                    row.key,
                    row.key.0.len(),
                    table.key_names.len()
                )));
            }
            if row.cells.len() != table.instances.len() {
                return Err(MiningError::PivotFormat(format!(
                    "row {} has {} cell(s), header names {} instance(s)",
                    row.key,
                    row.cells.len(),
                    table.instances.len()
                )));
            }
            if let Some(cell) = row.cells.iter().find(|c| c.len() != data_width) {
                return Err(MiningError::PivotFormat(format!(
                    "row {} has a cell with {} slot(s), expected {data_width}",
                    row.key,
                    cell.len()
                )));
            }
            if table.index.contains_key(&row.key) {
                return Err(MiningError::PivotFormat(format!("duplicate key {}", row.key)));
            }
            table.index.insert(row.key.clone(), table.rows.len());
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.instances.is_empty()
    }

    pub fn key_names(&self) -> &[String] {
        &self.key_names
    }

    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    pub fn data_width(&self) -> usize {
        self.data_width
    }

    pub fn rows(&self) -> &[PivotRow] {
        &self.rows
    }

    pub fn row(&self, key: &EntityKey) -> Option<&PivotRow> {
        self.index.get(key).map(|&i| &self.rows[i])
    }

    pub fn instance_index(&self, name: &str) -> Option<usize> {
        self.instances.iter().position(|i| i == name)
    }

    pub fn missing_cell(&self) -> Cell {
        vec![None; self.data_width]
    }

    /// Register an instance column, extending every row with a missing cell.
    /// Returns the column position (existing position for known names).
    pub fn add_instance(&mut self, name: &str) -> usize {
        if let Some(pos) = self.instance_index(name) {
            return pos;
        }
        let missing = self.missing_cell();
        for row in &mut self.rows {
            row.cells.push(missing.clone());
        }
        self.instances.push(name.to_string());
        self.instances.len() - 1
    }

    /// Write `cell` at (key, instance column), creating the row if needed.
    pub fn set_cell(&mut self, key: EntityKey, instance: usize, cell: Cell) {
        let row_idx = match self.index.get(&key) {
            Some(&i) => i,
            None => {
                let cells = vec![self.missing_cell(); self.instances.len()];
                self.index.insert(key.clone(), self.rows.len());
                self.rows.push(PivotRow { key, cells });
                self.rows.len() - 1
            }
        };
        self.rows[row_idx].cells[instance] = cell;
    }

    /// Header names for output tables: key names plus the data index column.
    pub fn column_heads(&self) -> Vec<String> {
        let mut heads: Vec<String> =
            self.key_names.iter().map(|k| format!("{KEY_MARKER}{k}")).collect();
        heads.push("Data Index".to_string());
        heads
    }
}

// ---------------------------------------------------------------------------
// Typed columns
// ---------------------------------------------------------------------------

/// Inferred semantic type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Float,
    Percentage,
    UnitFloat(String),
    IpPrefixBits,
    Categorical,
}

impl TypeTag {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Float | Self::Percentage | Self::UnitFloat(_))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float => write!(f, "float"),
            Self::Percentage => write!(f, "percentage"),
            Self::UnitFloat(unit) => write!(f, "unit_float({unit})"),
            Self::IpPrefixBits => write!(f, "ip_prefix"),
            Self::Categorical => write!(f, "categorical"),
        }
    }
}

/// A cell value after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedValue {
    Missing,
    Number(f64),
    Bits(String),
    Text(String),
}

impl ParsedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&str> {
        match self {
            Self::Bits(b) => Some(b),
            _ => None,
        }
    }
}

/// Raw values of one column, its tag, and the parallel parsed values.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedColumn {
    pub raw: Vec<Option<String>>,
    pub tag: TypeTag,
    pub parsed: Vec<ParsedValue>,
}

impl TypedColumn {
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn non_missing(&self) -> usize {
        self.raw.iter().filter(|v| v.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationKind {
    /// a and b occur together.
    CcPos,
    /// b occurs whenever a occurs.
    CcAs0,
    /// a occurs whenever b occurs.
    CcAs1,
    /// a and b are both frequent but rarely together.
    CcNeg,
    /// Every address paired with category a shares prefix b (category first).
    CiPrf,
    /// Same as `CiPrf`, category column second.
    IcPrf,
    /// All / 80% / 60% of address pairs share at least this many bits.
    Ii1008060,
    /// y = m·x + c with the given r².
    FfLinReg,
    IcPos,
    IcAs0,
    IcAs1,
    IcNeg,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CcPos => "CC_Pos",
            Self::CcAs0 => "CC_As_0",
            Self::CcAs1 => "CC_As_1",
            Self::CcNeg => "CC_Neg",
            Self::CiPrf => "CI_Prf",
            Self::IcPrf => "IC_Prf",
            Self::Ii1008060 => "II_100_80_60",
            Self::FfLinReg => "FF_LinReg",
            Self::IcPos => "IC_Pos",
            Self::IcAs0 => "IC_As_0",
            Self::IcAs1 => "IC_As_1",
            Self::IcNeg => "IC_Neg",
        }
    }

    /// Rename a categorical kind found on the host bits of two address
    /// columns. Other kinds are returned unchanged.
    pub fn within_subnet(self) -> Self {
        match self {
            Self::CcPos => Self::IcPos,
            Self::CcAs0 => Self::IcAs0,
            Self::CcAs1 => Self::IcAs1,
            Self::CcNeg => Self::IcNeg,
            other => other,
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Number(f64),
    Count(usize),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Count(c) => write!(f, "{c}"),
        }
    }
}

/// A relation between two columns, before the column keys are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub kind: RelationKind,
    pub params: Vec<Param>,
}

impl Relation {
    pub fn new(kind: RelationKind, params: Vec<Param>) -> Self {
        Self { kind, params }
    }

    pub fn param(&self, i: usize) -> Option<&Param> {
        self.params.get(i)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationRecord {
    pub left: ColumnKey,
    pub right: ColumnKey,
    pub relation: Relation,
}

// ---------------------------------------------------------------------------
// Golden values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct GoldenValue {
    pub value: String,
    pub confidence: f64,
}

/// Golden values of one column; may be empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnGolden {
    pub column: ColumnKey,
    pub values: Vec<GoldenValue>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MiningSummary {
    pub columns: usize,
    pub retained: usize,
    pub pairs_mined: usize,
    pub pairs_skipped: usize,
    pub golden_values: usize,
    pub relations: usize,
    pub type_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct MiningResult {
    pub heads: Vec<String>,
    pub golden: Vec<ColumnGolden>,
    pub relations: Vec<RelationRecord>,
    pub summary: MiningSummary,
}

impl MiningResult {
    /// Flattened (column, value) golden records.
    pub fn golden_records(&self) -> impl Iterator<Item = (&ColumnKey, &GoldenValue)> {
        self.golden
            .iter()
            .flat_map(|g| g.values.iter().map(move |v| (&g.column, v)))
    }
}
