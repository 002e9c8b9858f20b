use std::fmt;

use super::{DataflowNode, Sdfg};

impl fmt::Display for Sdfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_sdfg(self, 0, f)
    }
}

fn fmt_sdfg(sdfg: &Sdfg, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write_line(f, indent, &format!("sdfg @{} {{", sdfg.name))?;
    if !sdfg.arg_names.is_empty() {
        write_line(f, indent + 1, &format!("args: ({})", sdfg.arg_names.join(", ")))?;
    }
    if !sdfg.arrays.is_empty() {
        write_line(f, indent + 1, "arrays:")?;
        for (name, desc) in &sdfg.arrays {
            let marker = if sdfg.constants.contains_key(name) {
                " const"
            } else {
                ""
            };
            write_line(f, indent + 2, &format!("{name} : {desc}{marker}"))?;
        }
    }
    if !sdfg.symbols.is_empty() {
        let symbols = sdfg
            .symbols
            .iter()
            .map(|(name, dtype)| format!("{name}: {dtype}"))
            .collect::<Vec<_>>()
            .join(", ");
        write_line(f, indent + 1, &format!("symbols: {symbols}"))?;
    }
    for (id, state) in sdfg.states() {
        let start = if id == sdfg.start_state { " (start)" } else { "" };
        write_line(f, indent + 1, &format!("state {id} \"{}\"{start}:", state.label))?;
        for node in &state.nodes {
            fmt_node(node, indent + 2, f)?;
        }
    }
    if !sdfg.edges.is_empty() {
        write_line(f, indent + 1, "edges:")?;
        for edge in &sdfg.edges {
            let mut line = format!("{} -> {}", edge.src, edge.dst);
            if let Some(cond) = &edge.condition {
                line.push_str(&format!(" if {cond}"));
            }
            if !edge.assignments.is_empty() {
                let assigns = edge
                    .assignments
                    .iter()
                    .map(|(sym, value)| format!("{sym} = {value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                line.push_str(&format!(" [{assigns}]"));
            }
            write_line(f, indent + 2, &line)?;
        }
    }
    write_line(f, indent, "}")
}

fn fmt_node(node: &DataflowNode, indent: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match node {
        DataflowNode::Copy(copy) => write_line(f, indent, &format!("copy {} -> {}", copy.src, copy.dst)),
        DataflowNode::MappedTasklet(tasklet) => {
            let ranges = tasklet
                .ranges
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            write_line(f, indent, &format!("map {} [{ranges}] {{", tasklet.label))?;
            for (symbol, memlet) in &tasklet.dynamic_inputs {
                write_line(f, indent + 1, &format!("{symbol} := {memlet}"))?;
            }
            for (conn, memlet) in &tasklet.inputs {
                write_line(f, indent + 1, &format!("{conn} <- {memlet}"))?;
            }
            write_line(f, indent + 1, &tasklet.code)?;
            for (conn, memlet) in &tasklet.outputs {
                write_line(f, indent + 1, &format!("{conn} -> {memlet}"))?;
            }
            write_line(f, indent, "}")
        }
        DataflowNode::Nested(nested) => {
            let bind = |pairs: &std::collections::BTreeMap<String, String>| {
                pairs
                    .iter()
                    .map(|(inner, outer)| format!("{inner}={outer}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            write_line(
                f,
                indent,
                &format!(
                    "nested {} in({}) out({}) {{",
                    nested.label,
                    bind(&nested.inputs),
                    bind(&nested.outputs)
                ),
            )?;
            fmt_sdfg(&nested.sdfg, indent + 1, f)?;
            write_line(f, indent, "}")
        }
    }
}

fn write_line(f: &mut fmt::Formatter<'_>, indent: usize, line: &str) -> fmt::Result {
    for _ in 0..indent {
        f.write_str("  ")?;
    }
    writeln!(f, "{line}")
}

impl Sdfg {
    /// Standalone HTML page showing the textual dump.
    pub fn to_html(&self) -> String {
        let body = escape_html(&self.to_string());
        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
             <body>\n<pre>\n{body}</pre>\n</body>\n</html>\n",
            escape_html(&self.name)
        )
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
