//! Sheet function registry.
//!
//! Builtins are registered once; a [`FunctionRegistry`] is a view over them
//! pinned to one [`PublicInterfaceVersion`], plus the session's user functions.

mod boolean;
mod datetime;
mod financial;
mod misc;
mod number;
mod string;

use super::args::FormulaArg;
use crate::error::Result;
use crate::extensions::{Extensions, UserFunction};
use crate::types::PublicInterfaceVersion;
use chrono::NaiveDateTime;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;

/// Context a builtin receives besides its arguments.
#[derive(Clone, Copy, Debug)]
pub struct FunctionContext {
    /// Pinned value of `NOW()`.
    pub now: NaiveDateTime,
    /// Number of rows being evaluated.
    pub rows: usize,
}

pub type FunctionImpl = fn(&[FormulaArg], &FunctionContext) -> Result<FormulaArg>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Number,
    String,
    Boolean,
    Datetime,
    Misc,
    Financial,
}

#[derive(Clone, Copy)]
pub enum FunctionKind {
    Builtin(FunctionImpl),
    /// Evaluated by the evaluator itself so only the selected branch runs.
    Conditional,
}

#[derive(Clone, Copy)]
pub struct FunctionSpec {
    pub name: &'static str,
    pub category: Category,
    pub min_args: usize,
    pub max_args: Option<usize>,
    /// Whether rolling and whole-column ranges may be passed.
    pub accepts_ranges: bool,
    /// First interface version that ships the function.
    pub since: PublicInterfaceVersion,
    pub kind: FunctionKind,
}

impl std::fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .finish()
    }
}

const V1: PublicInterfaceVersion = PublicInterfaceVersion::V1;
const V3: PublicInterfaceVersion = PublicInterfaceVersion::V3;

fn spec(
    name: &'static str,
    category: Category,
    min_args: usize,
    max_args: Option<usize>,
    accepts_ranges: bool,
    since: PublicInterfaceVersion,
    f: FunctionImpl,
) -> FunctionSpec {
    FunctionSpec {
        name,
        category,
        min_args,
        max_args,
        accepts_ranges,
        since,
        kind: FunctionKind::Builtin(f),
    }
}

static BUILTINS: Lazy<HashMap<&'static str, FunctionSpec>> = Lazy::new(|| {
    use Category::*;
    let list = vec![
        // Number
        spec("SUM", Number, 1, None, true, V1, number::sum),
        spec("AVG", Number, 1, None, true, V1, number::avg),
        spec("MAX", Number, 1, None, true, V1, number::max),
        spec("MIN", Number, 1, None, true, V1, number::min),
        spec("MULTIPLY", Number, 1, None, true, V1, number::multiply),
        spec("COUNT", Number, 1, None, true, V1, number::count),
        spec("STDEV", Number, 1, None, true, V1, number::stdev),
        spec("VAR", Number, 1, None, true, V1, number::var),
        spec("ROUND", Number, 1, Some(2), false, V1, number::round),
        spec("ROUNDUP", Number, 1, Some(2), false, V3, number::roundup),
        spec("ROUNDDOWN", Number, 1, Some(2), false, V3, number::rounddown),
        spec("POWER", Number, 2, Some(2), false, V1, number::power),
        spec("ABS", Number, 1, Some(1), false, V1, number::abs),
        spec("EXP", Number, 1, Some(1), false, V1, number::exp),
        spec("INT", Number, 1, Some(1), false, V1, number::int),
        spec("LN", Number, 1, Some(1), false, V1, number::ln),
        spec("LOG", Number, 1, Some(2), false, V1, number::log),
        spec("SQRT", Number, 1, Some(1), false, V1, number::sqrt),
        spec("VALUE", Number, 1, Some(1), false, V1, number::value),
        // String
        spec("LEFT", String, 1, Some(2), false, V1, string::left),
        spec("RIGHT", String, 1, Some(2), false, V1, string::right),
        spec("MID", String, 3, Some(3), false, V1, string::mid),
        spec("LEN", String, 1, Some(1), false, V1, string::len),
        spec("LOWER", String, 1, Some(1), false, V1, string::lower),
        spec("UPPER", String, 1, Some(1), false, V1, string::upper),
        spec("PROPER", String, 1, Some(1), false, V1, string::proper),
        spec("TRIM", String, 1, Some(1), false, V1, string::trim),
        spec("CLEAN", String, 1, Some(1), false, V1, string::clean),
        spec("CONCAT", String, 1, None, true, V1, string::concat),
        spec("FIND", String, 2, Some(2), false, V1, string::find),
        spec("SUBSTITUTE", String, 3, Some(4), false, V1, string::substitute),
        spec("TEXT", String, 1, Some(1), false, V1, string::text),
        // Boolean
        spec("AND", Boolean, 1, None, true, V1, boolean::and),
        spec("OR", Boolean, 1, None, true, V1, boolean::or),
        spec("NOT", Boolean, 1, Some(1), false, V1, boolean::not),
        spec("BOOL", Boolean, 1, Some(1), false, V1, boolean::to_bool),
        // Datetime
        spec("YEAR", Datetime, 1, Some(1), false, V1, datetime::year),
        spec("MONTH", Datetime, 1, Some(1), false, V1, datetime::month),
        spec("DAY", Datetime, 1, Some(1), false, V1, datetime::day),
        spec("HOUR", Datetime, 1, Some(1), false, V1, datetime::hour),
        spec("MINUTE", Datetime, 1, Some(1), false, V1, datetime::minute),
        spec("SECOND", Datetime, 1, Some(1), false, V1, datetime::second),
        spec("WEEKDAY", Datetime, 1, Some(1), false, V1, datetime::weekday),
        spec("QUARTER", Datetime, 1, Some(1), false, V1, datetime::quarter),
        spec("NOW", Datetime, 0, Some(0), false, V1, datetime::now),
        spec("DATEVALUE", Datetime, 1, Some(1), false, V1, datetime::datevalue),
        spec("STRTODATE", Datetime, 1, Some(1), false, V1, datetime::strtodate),
        spec("ENDOFMONTH", Datetime, 1, Some(1), false, V3, datetime::endofmonth),
        // Misc
        spec("FILLNAN", Misc, 2, Some(2), false, V1, misc::fillnan),
        spec("TYPE", Misc, 1, Some(1), false, V1, misc::type_of),
        spec("ISNA", Misc, 1, Some(1), false, V3, misc::isna),
        // Financial
        spec("NPV", Financial, 2, None, true, V3, financial::npv),
    ];
    let mut map: HashMap<&'static str, FunctionSpec> =
        list.into_iter().map(|spec| (spec.name, spec)).collect();
    for (name, min, max) in [("IF", 2, Some(3)), ("IFS", 2, None)] {
        map.insert(
            name,
            FunctionSpec {
                name,
                category: Category::Boolean,
                min_args: min,
                max_args: max,
                accepts_ranges: false,
                since: V1,
                kind: FunctionKind::Conditional,
            },
        );
    }
    map
});

/// A function the registry resolved.
pub enum Resolved<'a> {
    Builtin(&'static FunctionSpec),
    User(&'a Arc<dyn UserFunction>),
}

/// Functions available to formulas of one engine.
pub struct FunctionRegistry<'a> {
    version: PublicInterfaceVersion,
    user_functions: HashMap<String, &'a Arc<dyn UserFunction>>,
}

impl<'a> FunctionRegistry<'a> {
    pub fn new(version: PublicInterfaceVersion, extensions: &'a Extensions) -> Self {
        let user_functions = extensions
            .user_functions
            .iter()
            .map(|f| (f.name().to_ascii_uppercase(), f))
            .collect();
        Self {
            version,
            user_functions,
        }
    }

    pub fn version(&self) -> PublicInterfaceVersion {
        self.version
    }

    /// Whether rolling ranges may appear in formulas.
    pub fn supports_rolling_ranges(&self) -> bool {
        self.version >= PublicInterfaceVersion::V3
    }

    /// Look a function up by (case-insensitive) name.
    pub fn get(&self, name: &str) -> Option<Resolved<'a>> {
        let upper = name.to_ascii_uppercase();
        if let Some(spec) = BUILTINS.get(upper.as_str()) {
            if spec.since <= self.version {
                return Some(Resolved::Builtin(spec));
            }
        }
        self.user_functions.get(&upper).map(|f| Resolved::User(*f))
    }

    /// Names of the builtins available at this version, sorted.
    pub fn builtin_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = BUILTINS
            .values()
            .filter(|spec| spec.since <= self.version)
            .map(|spec| spec.name)
            .collect();
        names.sort_unstable();
        names
    }
}
