//! Display formatting of tables. Formats never change values; they only
//! appear in generated code as a pandas `Styler`.

use super::filters::Filter;
use crate::types::{python_string, ColumnId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    #[default]
    Plain,
    Percentage,
    Accounting,
    Currency,
    Scientific,
    Thousands,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnFormat {
    #[serde(rename = "type", default)]
    pub number_format: NumberFormat,
    #[serde(default)]
    pub precision: Option<u32>,
}

impl ColumnFormat {
    /// Python format string for the column.
    fn format_string(&self) -> String {
        let precision = self.precision.unwrap_or(2);
        match self.number_format {
            NumberFormat::Plain => format!("{{:.{}f}}", precision),
            NumberFormat::Percentage => format!("{{:.{}%}}", precision),
            NumberFormat::Accounting => format!("{{:,.{}f}}", precision),
            NumberFormat::Currency => format!("${{:,.{}f}}", precision),
            NumberFormat::Scientific => format!("{{:.{}e}}", precision),
            NumberFormat::Thousands => format!("{{:,.{}f}}", precision),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorStyle {
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub background_color: Option<String>,
}

impl ColorStyle {
    fn css(&self) -> Vec<(&'static str, &str)> {
        let mut props = Vec::new();
        if let Some(color) = &self.color {
            props.push(("color", color.as_str()));
        }
        if let Some(background) = &self.background_color {
            props.push(("background-color", background.as_str()));
        }
        props
    }

    fn is_empty(&self) -> bool {
        self.color.is_none() && self.background_color.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowStyle {
    #[serde(default)]
    pub even: ColorStyle,
    #[serde(default)]
    pub odd: ColorStyle,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BorderStyle {
    #[serde(default)]
    pub border_style: Option<String>,
    #[serde(default)]
    pub border_color: Option<String>,
}

/// Colors applied to cells whose values pass the filters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalFormat {
    pub format_uuid: String,
    pub column_ids: Vec<ColumnId>,
    pub filters: Vec<Filter>,
    #[serde(flatten)]
    pub style: ColorStyle,
}

/// Formatting of one table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableFormat {
    #[serde(default)]
    pub columns: BTreeMap<ColumnId, ColumnFormat>,
    #[serde(default)]
    pub headers: ColorStyle,
    #[serde(default)]
    pub rows: RowStyle,
    #[serde(default)]
    pub border: BorderStyle,
    #[serde(default)]
    pub conditional_formats: Vec<ConditionalFormat>,
}

impl TableFormat {
    pub fn is_empty(&self) -> bool {
        *self == TableFormat::default()
    }

    /// Drop formats of columns that no longer exist.
    pub fn retain_columns(&mut self, keep: impl Fn(&ColumnId) -> bool) {
        self.columns.retain(|id, _| keep(id));
        for conditional in &mut self.conditional_formats {
            conditional.column_ids.retain(|id| keep(id));
        }
        self.conditional_formats.retain(|c| !c.column_ids.is_empty());
    }

    /// Lines building `{table}_styler`, or nothing when the table is unformatted.
    pub fn to_code(&self, table: &str, headers: &HashMap<ColumnId, String>) -> Vec<String> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut calls = Vec::new();
        let formats: Vec<String> = self
            .columns
            .iter()
            .filter_map(|(id, format)| {
                headers
                    .get(id)
                    .map(|h| format!("{}: {}", python_string(h), python_string(&format.format_string())))
            })
            .collect();
        if !formats.is_empty() {
            calls.push(format!(".format({{{}}})", formats.join(", ")));
        }

        let mut styles = Vec::new();
        if !self.headers.is_empty() {
            styles.push(table_style("thead", &self.headers.css()));
        }
        if !self.rows.even.is_empty() {
            styles.push(table_style("tbody tr:nth-child(even)", &self.rows.even.css()));
        }
        if !self.rows.odd.is_empty() {
            styles.push(table_style("tbody tr:nth-child(odd)", &self.rows.odd.css()));
        }
        if self.border.border_style.is_some() || self.border.border_color.is_some() {
            let border = format!(
                "{} {}",
                self.border.border_style.as_deref().unwrap_or("solid"),
                self.border.border_color.as_deref().unwrap_or("#000000")
            );
            styles.push(table_style("", &[("border", border.as_str())]));
        }
        if !styles.is_empty() {
            calls.push(format!(".set_table_styles([\n    {}\n])", styles.join(",\n    ")));
        }

        for conditional in &self.conditional_formats {
            let subset: Vec<String> = conditional
                .column_ids
                .iter()
                .filter_map(|id| headers.get(id).map(|h| python_string(h)))
                .collect();
            if subset.is_empty() || conditional.style.is_empty() {
                continue;
            }
            let css: Vec<String> = conditional
                .style
                .css()
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .collect();
            let mut tests = Vec::new();
            for filter in &conditional.filters {
                let wrapped = super::filters::ColumnFilters {
                    operator: super::filters::FilterOperator::And,
                    filters: vec![super::filters::FilterItem::Filter(filter.clone())],
                };
                if let Ok(Some(code)) = wrapped.to_code("series", "__x__") {
                    tests.push(code.replace("series['__x__']", "series"));
                }
            }
            if tests.is_empty() {
                continue;
            }
            calls.push(format!(
                ".apply(lambda series: np.where({}, {}, None), subset=[{}])",
                tests
                    .iter()
                    .map(|t| format!("({})", t))
                    .collect::<Vec<_>>()
                    .join(" & "),
                python_string(&css.join("; ")),
                subset.join(", ")
            ));
        }

        vec![format!("{}_styler = {}.style{}", table, table, calls.join(""))]
    }
}

fn table_style(selector: &str, props: &[(&str, &str)]) -> String {
    let props: Vec<String> = props
        .iter()
        .map(|(k, v)| format!("({}, {})", python_string(k), python_string(v)))
        .collect();
    format!(
        "{{'selector': {}, 'props': [{}]}}",
        python_string(selector),
        props.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unformatted_table_emits_nothing() {
        assert!(TableFormat::default().to_code("df", &HashMap::new()).is_empty());
    }

    #[test]
    fn test_column_format_code() {
        let mut format = TableFormat::default();
        format.columns.insert(
            ColumnId::new("A"),
            ColumnFormat {
                number_format: NumberFormat::Percentage,
                precision: Some(1),
            },
        );
        let mut headers = HashMap::new();
        headers.insert(ColumnId::new("A"), "A".to_string());
        let code = format.to_code("df", &headers);
        assert_eq!(code, vec!["df_styler = df.style.format({'A': '{:.1%}'})".to_string()]);
    }

    #[test]
    fn test_retain_columns_drops_empty_conditionals() {
        let mut format = TableFormat::default();
        format.conditional_formats.push(ConditionalFormat {
            format_uuid: "x".into(),
            column_ids: vec![ColumnId::new("A")],
            filters: Vec::new(),
            style: ColorStyle::default(),
        });
        format.retain_columns(|id| id.as_str() != "A");
        assert!(format.is_empty());
    }
}
