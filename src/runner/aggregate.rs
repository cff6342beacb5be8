//! Folding per-task results into a single table.

use super::QueryResult;
use crate::db::{ColumnInfo, TabularData, Value};
use crate::params::Combination;

/// Prefix for the columns that carry a row's parameter values.
pub const PARAM_COLUMN_PREFIX: &str = "_param_";

/// Name of the column that carries parameter `name`.
pub fn param_column_name(name: &str) -> String {
    format!("{PARAM_COLUMN_PREFIX}{name}")
}

/// Appends one `_param_<name>` column per entry of `combination`, repeating
/// the bound value on every row.
pub fn tag_with_params(data: &TabularData, combination: &Combination) -> TabularData {
    let mut tagged = data.clone();
    for (name, value) in combination.iter() {
        tagged
            .columns
            .push(ColumnInfo::new(param_column_name(name), value.type_name()));
        for row in &mut tagged.rows {
            row.push(value.clone());
        }
    }
    tagged
}

/// Concatenates the rows of every successful result that carries data.
///
/// Each result's rows are tagged with its combination first. Columns are the
/// union by name in first-seen order; cells a result did not produce are NULL.
/// Failed, cancelled and empty results contribute nothing.
pub fn combine_results(results: &[QueryResult]) -> TabularData {
    combine_results_with(results, true)
}

/// Like [`combine_results`], with parameter tagging optional.
pub fn combine_results_with(results: &[QueryResult], tag: bool) -> TabularData {
    let mut combined = TabularData::new();

    for result in results {
        if !result.is_success() {
            continue;
        }
        let Some(data) = result.data.as_ref().filter(|d| !d.is_empty()) else {
            continue;
        };

        let tagged = if tag {
            tag_with_params(data, &result.combination)
        } else {
            data.clone()
        };
        let mapping = map_columns(&mut combined, &tagged.columns);
        let width = combined.columns.len();

        for row in tagged.rows {
            let mut out = vec![Value::Null; width];
            for (value, &index) in row.into_iter().zip(&mapping) {
                out[index] = value;
            }
            combined.rows.push(out);
        }
    }

    combined
}

/// Resolves each incoming column to a position in `combined`, adding columns
/// that are new and NULL-filling existing rows for them.
///
/// Repeated names are matched by occurrence, so the second `id` of a result
/// maps to the second `id` of the combined table.
fn map_columns(combined: &mut TabularData, incoming: &[ColumnInfo]) -> Vec<usize> {
    let mut mapping = Vec::with_capacity(incoming.len());

    for (pos, column) in incoming.iter().enumerate() {
        let nth = incoming[..pos]
            .iter()
            .filter(|c| c.name == column.name)
            .count();
        let existing = combined
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.name == column.name)
            .nth(nth)
            .map(|(index, _)| index);

        let index = match existing {
            Some(index) => index,
            None => {
                combined.columns.push(column.clone());
                for row in &mut combined.rows {
                    row.push(Value::Null);
                }
                combined.columns.len() - 1
            }
        };
        mapping.push(index);
    }

    mapping
}

/// Results that ran without error.
pub fn success_count(results: &[QueryResult]) -> usize {
    results.iter().filter(|r| r.is_success()).count()
}

/// Results that failed.
pub fn error_count(results: &[QueryResult]) -> usize {
    results.iter().filter(|r| r.error.is_some()).count()
}
