//! Turns chunks into a script.

use super::chunk::CodeChunk;
use crate::config::CodeOptions;
use crate::error::Result;
use crate::types::python_string;
use std::fmt;

/// A rendered script: hoisted imports, then the body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GeneratedCode {
    pub imports: Vec<String>,
    pub body: Vec<String>,
}

impl GeneratedCode {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = self.imports.clone();
        if !self.imports.is_empty() && !self.body.is_empty() {
            lines.push(String::new());
        }
        lines.extend(self.body.iter().cloned());
        lines
    }

    pub fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.body.is_empty()
    }
}

impl fmt::Display for GeneratedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}

/// Render chunks in order. `table_names` are the tables the script ends with,
/// returned when the script is wrapped as a function.
pub fn render(chunks: &[Box<dyn CodeChunk>], options: &CodeOptions, table_names: &[String]) -> Result<GeneratedCode> {
    let mut imports: Vec<String> = Vec::new();
    let mut body: Vec<String> = Vec::new();
    for chunk in chunks {
        let (lines, chunk_imports) = chunk.code()?;
        if lines.is_empty() {
            continue;
        }
        for import in chunk_imports {
            if !imports.contains(&import) {
                imports.push(import);
            }
        }
        if !body.is_empty() {
            body.push(String::new());
        }
        body.push(format!("# {}", chunk.description_comment()));
        body.extend(lines);
    }

    if options.as_function {
        body = wrap_in_function(body, options, table_names);
    }
    Ok(GeneratedCode { imports, body })
}

fn wrap_in_function(body: Vec<String>, options: &CodeOptions, table_names: &[String]) -> Vec<String> {
    let params: Vec<&str> = options.function_params.iter().map(|(name, _)| name.as_str()).collect();
    let mut lines = vec![format!("def {}({}):", options.function_name(), params.join(", "))];
    for line in body {
        if line.is_empty() {
            lines.push(line);
            continue;
        }
        let mut line = line;
        for (name, literal) in &options.function_params {
            line = line.replace(&python_string(literal), name);
        }
        lines.push(format!("    {}", line));
    }
    if !table_names.is_empty() {
        if lines.len() > 1 {
            lines.push(String::new());
        }
        lines.push(format!("    return {}", table_names.join(", ")));
    } else if lines.len() == 1 {
        lines.push("    pass".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::chunks::StatementChunk;

    fn chunks() -> Vec<Box<dyn CodeChunk>> {
        vec![
            Box::new(StatementChunk::creating(
                "Imported",
                "Imported data.csv",
                0,
                vec!["df = pd.read_csv('data.csv')".into()],
            )),
            Box::new(StatementChunk::editing(
                "Sorted",
                "Sorted A in df",
                0,
                vec!["df = df.sort_values(by='A', ascending=True, na_position='first')".into()],
            )),
            Box::new(StatementChunk::editing("Noop", "Nothing", 0, Vec::new())),
        ]
    }

    #[test]
    fn test_render_hoists_imports_and_separates_chunks() {
        let code = render(&chunks(), &CodeOptions::default(), &[]).unwrap();
        assert_eq!(
            code.lines(),
            vec![
                "import pandas as pd",
                "",
                "# Imported data.csv",
                "df = pd.read_csv('data.csv')",
                "",
                "# Sorted A in df",
                "df = df.sort_values(by='A', ascending=True, na_position='first')",
            ]
        );
    }

    #[test]
    fn test_render_as_function_with_params() {
        let options = CodeOptions {
            as_function: true,
            function_name: "load".into(),
            function_params: vec![("path".into(), "data.csv".into())],
        };
        let code = render(&chunks(), &options, &["df".to_string()]).unwrap();
        let lines = code.lines();
        assert_eq!(lines[2], "def load(path):");
        assert_eq!(lines[4], "    df = pd.read_csv(path)");
        assert_eq!(lines.last().unwrap(), "    return df");
    }

    #[test]
    fn test_empty_function_body_passes() {
        let options = CodeOptions {
            as_function: true,
            ..CodeOptions::default()
        };
        let code = render(&[], &options, &[]).unwrap();
        assert_eq!(code.lines(), vec!["def function():", "    pass"]);
    }
}
