#![forbid(unsafe_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use bt_frame::{Record, RespondentTable};
use bt_runtime::{Diagnostic, DiagnosticLedger, IssueKind};
use bt_types::{Cell, format_number, parse_number, try_numeric};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl CompareOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    #[must_use]
    pub fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }

    fn apply(self, left: f64, right: f64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Gt => left > right,
            Self::Lt => left < right,
            Self::Ge => left >= right,
            Self::Le => left <= right,
        }
    }
}

/// A value token as written in the equation, with its numeric reading if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Literal {
    pub text: String,
    pub number: Option<f64>,
}

impl Literal {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let text = text.trim();
        Self {
            text: text.to_owned(),
            number: parse_number(text),
        }
    }

    /// String match first, then numeric match when both sides parse.
    fn matches(&self, cell: &Cell) -> bool {
        if cell.label().as_deref() == Some(self.text.as_str()) {
            return true;
        }
        matches!((try_numeric(cell), self.number), (Some(a), Some(b)) if a == b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueSpec {
    /// `min-max`, inclusive on both ends.
    Range { min: f64, max: f64 },
    /// `v1,v2,v3`
    List { items: Vec<Literal> },
    Scalar { value: Literal },
}

impl ValueSpec {
    /// Classify the text right of the operator. A range is accepted under
    /// every operator; a list only under `=` and `!=`.
    fn parse(text: &str, op: CompareOp) -> Option<Self> {
        if let Some((min, max)) = parse_range(text) {
            return Some(Self::Range { min, max });
        }
        if text.contains(',') {
            let items = text.split(',').map(Literal::new).collect();
            return op.is_equality().then_some(Self::List { items });
        }
        Some(Self::Scalar {
            value: Literal::new(text),
        })
    }

    /// The token a checkbox column would be suffixed with, e.g. `2` in `S7r2`.
    fn checkbox_code(&self) -> Option<&str> {
        match self {
            Self::Scalar { value } if value.number.is_some() => Some(value.text.as_str()),
            _ => None,
        }
    }

    fn matches(&self, op: CompareOp, cell: &Cell) -> bool {
        if cell.is_missing() {
            return false;
        }
        match self {
            // Inclusive membership whatever the operator.
            Self::Range { min, max } => {
                try_numeric(cell).is_some_and(|number| *min <= number && number <= *max)
            }
            Self::List { items } => {
                let hit = items.iter().any(|item| item.matches(cell));
                match op {
                    CompareOp::Eq => hit,
                    CompareOp::Ne => !hit,
                    _ => false,
                }
            }
            Self::Scalar { value } => match (try_numeric(cell), value.number) {
                (Some(left), Some(right)) => op.apply(left, right),
                _ => match op {
                    CompareOp::Eq => cell.label().as_deref() == Some(value.text.as_str()),
                    CompareOp::Ne => cell.label().as_deref() != Some(value.text.as_str()),
                    _ => false,
                },
            },
        }
    }
}

impl fmt::Display for ValueSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => {
                write!(f, "{}-{}", format_number(*min), format_number(*max))
            }
            Self::List { items } => {
                let joined = items
                    .iter()
                    .map(|item| item.text.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                f.write_str(&joined)
            }
            Self::Scalar { value } => f.write_str(&value.text),
        }
    }
}

fn parse_range(text: &str) -> Option<(f64, f64)> {
    if text.starts_with('-') {
        return None;
    }
    let (min, max) = text.split_once('-')?;
    Some((parse_number(min)?, parse_number(max)?))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaf {
    pub variable: String,
    pub op: CompareOp,
    pub value: ValueSpec,
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.variable, self.op.symbol(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    Or { children: Vec<Predicate> },
    And { children: Vec<Predicate> },
    Leaf { leaf: Leaf },
    /// An atom no grammar rule accepts. Matches nothing.
    Malformed { source: String },
}

impl Predicate {
    /// Leaves and malformed atoms in left-to-right order.
    #[must_use]
    pub fn atoms(&self) -> Vec<&Predicate> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a Predicate>) {
        match self {
            Self::Or { children } | Self::And { children } => {
                for child in children {
                    child.collect_atoms(out);
                }
            }
            Self::Leaf { .. } | Self::Malformed { .. } => out.push(self),
        }
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self
            .atoms()
            .iter()
            .any(|atom| matches!(atom, Self::Malformed { .. }))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (children, sep) = match self {
            Self::Or { children } => (children, " | "),
            Self::And { children } => (children, " & "),
            Self::Leaf { leaf } => return write!(f, "{leaf}"),
            Self::Malformed { source } => return f.write_str(source),
        };
        for (idx, child) in children.iter().enumerate() {
            if idx > 0 {
                f.write_str(sep)?;
            }
            write!(f, "{child}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    #[error("banner equation is empty")]
    EmptyEquation,
    #[error("equation {equation:?} contains malformed leaf {leaf:?}")]
    MalformedLeaf { equation: String, leaf: String },
}

// ── Normalization ───────────────────────────────────────────────────────
//
// BETWEEN is rewritten before the word operators so that the AND inside
// `BETWEEN a AND b` never reads as a conjunction.

static BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([A-Za-z0-9_]+)\s+BETWEEN\s+(-?\d+(?:\.\d+)?)\s+AND\s+(-?\d+(?:\.\d+)?)")
        .expect("BETWEEN pattern is valid")
});
static WORD_AND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").expect("AND pattern is valid"));
static WORD_OR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+OR\s+").expect("OR pattern is valid"));

/// Rewrite word forms into the symbolic grammar.
#[must_use]
pub fn normalize(equation: &str) -> String {
    let rewritten = BETWEEN.replace_all(equation.trim(), "${1}>=${2} & ${1}<=${3}");
    let rewritten = WORD_AND.replace_all(&rewritten, " & ");
    WORD_OR.replace_all(&rewritten, " | ").into_owned()
}

/// `TOTAL` (any case) or an empty equation selects every respondent.
#[must_use]
pub fn is_total_equation(equation: &str) -> bool {
    let trimmed = equation.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("TOTAL")
}

// ── Parser ──────────────────────────────────────────────────────────────

/// Ordered first-match-wins operator rules. Two-character operators come
/// first so `=` never matches inside `>=`.
const LEAF_RULES: [(&str, CompareOp); 6] = [
    (">=", CompareOp::Ge),
    ("<=", CompareOp::Le),
    ("!=", CompareOp::Ne),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
    ("=", CompareOp::Eq),
];

/// Parse a banner equation into a predicate tree.
///
/// `|` splits first (lowest precedence), then `&`. Parsing never fails:
/// atoms outside the grammar become [`Predicate::Malformed`].
#[must_use]
pub fn parse(equation: &str) -> Predicate {
    let normalized = normalize(equation);
    let branches = normalized
        .split('|')
        .map(|branch| {
            let parts = branch.split('&').map(parse_atom).collect::<Vec<_>>();
            collapse(parts, |children| Predicate::And { children })
        })
        .collect::<Vec<_>>();
    collapse(branches, |children| Predicate::Or { children })
}

/// Like [`parse`], but rejects empty equations and malformed leaves.
pub fn parse_strict(equation: &str) -> Result<Predicate, ExprError> {
    if equation.trim().is_empty() {
        return Err(ExprError::EmptyEquation);
    }
    let predicate = parse(equation);
    if let Some(Predicate::Malformed { source }) = predicate
        .atoms()
        .into_iter()
        .find(|atom| matches!(atom, Predicate::Malformed { .. }))
    {
        return Err(ExprError::MalformedLeaf {
            equation: equation.to_owned(),
            leaf: source.clone(),
        });
    }
    Ok(predicate)
}

fn collapse(mut children: Vec<Predicate>, wrap: fn(Vec<Predicate>) -> Predicate) -> Predicate {
    if children.len() == 1 {
        return children.swap_remove(0);
    }
    wrap(children)
}

fn parse_atom(atom: &str) -> Predicate {
    let atom = atom.trim();
    parse_leaf(atom).map_or_else(
        || Predicate::Malformed {
            source: atom.to_owned(),
        },
        |leaf| Predicate::Leaf { leaf },
    )
}

fn parse_leaf(atom: &str) -> Option<Leaf> {
    let ident_len = atom
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(atom.len());
    if ident_len == 0 {
        return None;
    }
    let (variable, rest) = atom.split_at(ident_len);
    let rest = rest.trim_start();

    let (op, value) = LEAF_RULES
        .iter()
        .find_map(|(symbol, op)| rest.strip_prefix(symbol).map(|value| (*op, value.trim())))?;
    if value.is_empty() {
        return None;
    }

    Some(Leaf {
        variable: variable.to_owned(),
        op,
        value: ValueSpec::parse(value, op)?,
    })
}

// ── Column resolution ───────────────────────────────────────────────────

/// Anything that can answer "does this column exist".
pub trait ColumnLookup {
    fn has_column(&self, name: &str) -> bool;
}

impl ColumnLookup for BTreeSet<String> {
    fn has_column(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl ColumnLookup for HashSet<String> {
    fn has_column(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl ColumnLookup for Record {
    fn has_column(&self, name: &str) -> bool {
        self.contains(name)
    }
}

impl ColumnLookup for RespondentTable {
    fn has_column(&self, name: &str) -> bool {
        RespondentTable::has_column(self, name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The variable exists as written.
    Literal(String),
    /// One-hot fallback: `S7=2` reads `S7r2`, compared against 1.
    Checkbox(String),
    Absent,
}

impl Resolution {
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Literal(name) | Self::Checkbox(name) => Some(name),
            Self::Absent => None,
        }
    }
}

/// Resolve a leaf's variable against the available columns.
pub fn resolve<C: ColumnLookup + ?Sized>(leaf: &Leaf, columns: &C) -> Resolution {
    if columns.has_column(&leaf.variable) {
        return Resolution::Literal(leaf.variable.clone());
    }
    if leaf.op.is_equality() {
        if let Some(code) = leaf.value.checkbox_code() {
            let checkbox = format!("{}r{}", leaf.variable, code);
            if columns.has_column(&checkbox) {
                return Resolution::Checkbox(checkbox);
            }
        }
    }
    Resolution::Absent
}

/// One-time resolution pass over a predicate for a whole filter call.
///
/// Resolutions are memoized per variable and checkbox code, so a variable
/// repeated across leaves is looked up once.
pub struct ColumnResolver<'a, C: ColumnLookup + ?Sized> {
    columns: &'a C,
    cache: HashMap<(String, Option<String>), Resolution>,
}

impl<'a, C: ColumnLookup + ?Sized> ColumnResolver<'a, C> {
    pub fn new(columns: &'a C) -> Self {
        Self {
            columns,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, leaf: &Leaf) -> Resolution {
        let code = leaf
            .op
            .is_equality()
            .then(|| leaf.value.checkbox_code().map(str::to_owned))
            .flatten();
        let columns = self.columns;
        self.cache
            .entry((leaf.variable.clone(), code))
            .or_insert_with(|| resolve(leaf, columns))
            .clone()
    }

    pub fn compile(&mut self, predicate: &Predicate) -> CompiledPredicate {
        let mut diagnostics = Vec::new();
        let root = self.compile_node(predicate, &mut diagnostics);
        CompiledPredicate { root, diagnostics }
    }

    fn compile_node(&mut self, predicate: &Predicate, diagnostics: &mut Vec<Diagnostic>) -> Node {
        match predicate {
            Predicate::Or { children } => Node::Or(
                children
                    .iter()
                    .map(|child| self.compile_node(child, diagnostics))
                    .collect(),
            ),
            Predicate::And { children } => Node::And(
                children
                    .iter()
                    .map(|child| self.compile_node(child, diagnostics))
                    .collect(),
            ),
            Predicate::Malformed { source } => {
                #[cfg(feature = "tracing")]
                tracing::warn!(leaf = %source, "banner equation leaf matches no grammar rule");
                diagnostics.push(Diagnostic::new(
                    IssueKind::MalformedLeaf,
                    source.clone(),
                    "leaf matches no grammar rule; treated as never matching",
                ));
                Node::Never
            }
            Predicate::Leaf { leaf } => match self.resolve(leaf) {
                Resolution::Literal(column) => Node::Leaf {
                    column,
                    op: leaf.op,
                    value: leaf.value.clone(),
                },
                Resolution::Checkbox(column) => Node::Leaf {
                    column,
                    op: leaf.op,
                    value: ValueSpec::Scalar {
                        value: Literal::new("1"),
                    },
                },
                Resolution::Absent => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        variable = %leaf.variable,
                        "banner variable has no column or checkbox column"
                    );
                    diagnostics.push(Diagnostic::new(
                        IssueKind::UnresolvedVariable,
                        leaf.variable.clone(),
                        format!("no column for leaf {leaf}; treated as never matching"),
                    ));
                    Node::Never
                }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Or(Vec<Node>),
    And(Vec<Node>),
    Leaf {
        column: String,
        op: CompareOp,
        value: ValueSpec,
    },
    Never,
}

impl Node {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Or(children) => children.iter().any(|child| child.matches(record)),
            Self::And(children) => children.iter().all(|child| child.matches(record)),
            Self::Leaf { column, op, value } => record
                .get(column)
                .is_some_and(|cell| value.matches(*op, cell)),
            Self::Never => false,
        }
    }
}

/// A predicate with every variable already bound to a concrete column.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    root: Node,
    diagnostics: Vec<Diagnostic>,
}

impl CompiledPredicate {
    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.root.matches(record)
    }

    /// Malformed leaves and unresolved variables found while compiling.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

// ── Evaluation and filtering ────────────────────────────────────────────

/// Evaluate a predicate against one record, resolving against that
/// record's own fields.
#[must_use]
pub fn evaluate(predicate: &Predicate, record: &Record) -> bool {
    ColumnResolver::new(record).compile(predicate).matches(record)
}

/// Parse and evaluate in one step. `TOTAL` and empty match everything.
#[must_use]
pub fn evaluate_str(equation: &str, record: &Record) -> bool {
    is_total_equation(equation) || evaluate(&parse(equation), record)
}

pub fn filter_positions_with_ledger(
    table: &RespondentTable,
    equation: &str,
    ledger: &mut DiagnosticLedger,
) -> Vec<usize> {
    if is_total_equation(equation) {
        return (0..table.len()).collect();
    }
    let compiled = ColumnResolver::new(table).compile(&parse(equation));
    for diagnostic in compiled.diagnostics() {
        ledger.push(diagnostic.clone());
    }
    table
        .records()
        .iter()
        .enumerate()
        .filter_map(|(position, record)| compiled.matches(record).then_some(position))
        .collect()
}

/// Row positions matching `equation`, in table order.
#[must_use]
pub fn filter_positions(table: &RespondentTable, equation: &str) -> Vec<usize> {
    filter_positions_with_ledger(table, equation, &mut DiagnosticLedger::new())
}

pub fn filter_table_with_ledger(
    table: &RespondentTable,
    equation: &str,
    ledger: &mut DiagnosticLedger,
) -> RespondentTable {
    if is_total_equation(equation) {
        return table.clone();
    }
    let compiled = ColumnResolver::new(table).compile(&parse(equation));
    for diagnostic in compiled.diagnostics() {
        ledger.push(diagnostic.clone());
    }
    table.filter_records(|record| compiled.matches(record))
}

/// The base for a banner column: every record `equation` accepts, in
/// order, under the parent table's schema.
#[must_use]
pub fn filter_table(table: &RespondentTable, equation: &str) -> RespondentTable {
    filter_table_with_ledger(table, equation, &mut DiagnosticLedger::new())
}

/// Diagnostics an equation would produce against the given columns,
/// without touching any records.
pub fn validate_equation<C: ColumnLookup + ?Sized>(equation: &str, columns: &C) -> Vec<Diagnostic> {
    if is_total_equation(equation) {
        return Vec::new();
    }
    ColumnResolver::new(columns)
        .compile(&parse(equation))
        .diagnostics
}
