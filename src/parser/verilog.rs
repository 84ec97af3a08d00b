//! Skeleton scanner for Verilog and SystemVerilog.
//!
//! Recognizes `module … endmodule` blocks, ANSI and non-ANSI port declarations,
//! `parameter`/`localparam` declarations, module instantiations (with or without a
//! `#( … )` override list) and `` `define`` macros. It is deliberately shallow: no
//! preprocessing, no generate-block expansion, one instance per statement.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{
    source::{
        blank_out, is_identifier, list_end, skip_balanced, split_top_level, statement_end,
        LineIndex, SourceScan,
    },
    FastParse, FullParse, LanguageId, LanguageParser, MacroTable, PortDirection, RawInstance,
    RawModule, RawParam, RawPort,
};
use crate::error::SyncError;

static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"//[^\n]*").expect("line comment pattern"));
static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment pattern"));
static DEFINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*`define[ \t]+([A-Za-z_]\w*)(?:\([^)\n]*\))?[ \t]*([^\n]*)$")
        .expect("define pattern")
});
static MODULE_DELIM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:macro)?module\s+([A-Za-z_]\w*)|endmodule\b)").expect("module pattern")
});
static DIRECTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(input|output|inout)\b").expect("direction pattern"));
static PARAMETER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:parameter|localparam)\b").expect("parameter pattern"));
static PLAIN_INSTANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\s+([A-Za-z_]\w*)\s*\(").expect("instance pattern")
});
static PARAM_INSTANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*#\s*\(").expect("instance pattern"));
static INSTANCE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s*\(").expect("instance name pattern"));
static RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("range pattern"));

const KEYWORDS: &[&str] = &[
    "always", "always_comb", "always_ff", "always_latch", "and", "assert", "assign", "assume",
    "automatic", "begin", "bit", "buf", "bufif0", "bufif1", "byte", "case", "casex", "casez",
    "class", "const", "cover", "default", "disable", "else", "end", "endcase", "endfunction",
    "endgenerate", "endmodule", "endtask", "enum", "export", "final", "for", "forever", "fork",
    "function", "generate", "genvar", "if", "import", "initial", "inout", "input", "int",
    "integer", "join", "localparam", "logic", "longint", "module", "nand", "negedge", "nor",
    "not", "notif0", "notif1", "or", "output", "package", "packed", "parameter", "posedge",
    "priority", "property", "real", "reg", "repeat", "return", "sequence", "shortint", "signed",
    "static", "string", "struct", "supply0", "supply1", "task", "time", "tri", "typedef",
    "union", "unique", "unsigned", "var", "virtual", "void", "wait", "while", "wire", "xnor",
    "xor",
];

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

/// Verilog-family parser; one instance per language id so results are stamped correctly.
#[derive(Debug, Clone)]
pub struct VerilogParser {
    language: LanguageId,
}

impl VerilogParser {
    pub fn new(language: LanguageId) -> Self {
        VerilogParser { language }
    }
}

impl LanguageParser for VerilogParser {
    fn fast(&self, path: &Path) -> Result<FastParse, SyncError> {
        let text = std::fs::read_to_string(path)?;
        let scan = scan(&text);
        if !scan.errors.is_empty() {
            return Err(SyncError::ParseFailure(format!(
                "{}: {}",
                path.display(),
                scan.errors.join("; ")
            )));
        }
        Ok(FastParse {
            content: scan.modules,
            macros: scan.macros,
            language: self.language,
        })
    }

    fn full(&self, path: &Path) -> Result<FullParse, SyncError> {
        let text = std::fs::read_to_string(path)?;
        let scan = scan(&text);
        Ok(FullParse::from_modules(
            &scan.modules,
            scan.errors,
            scan.macros,
            self.language,
        ))
    }
}

/// Scan Verilog/SystemVerilog source text.
pub fn scan(text: &str) -> SourceScan {
    let text = blank_out(&blank_out(text, &BLOCK_COMMENT), &LINE_COMMENT);
    let lines = LineIndex::new(&text);
    let mut result = SourceScan {
        macros: scan_macros(&text),
        ..Default::default()
    };

    let mut open: Option<(String, usize, usize)> = None;
    for caps in MODULE_DELIM.captures_iter(&text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        match caps.get(1) {
            Some(name) => {
                if let Some((prev, _, _)) = open.take() {
                    result.errors.push(format!(
                        "module `{prev}` is missing endmodule before `{}`",
                        name.as_str()
                    ));
                }
                open = Some((name.as_str().to_string(), whole.start(), name.end()));
            }
            None => match open.take() {
                Some((name, start, name_end)) => {
                    let module = scan_module(&text, &lines, name, start, name_end, whole.end());
                    result.modules.push(module);
                }
                None => result.errors.push(format!(
                    "unexpected endmodule on line {}",
                    lines.line(whole.start())
                )),
            },
        }
    }
    if let Some((name, _, _)) = open {
        result
            .errors
            .push(format!("module `{name}` is missing endmodule"));
    }
    result
}

fn scan_macros(text: &str) -> MacroTable {
    DEFINE
        .captures_iter(text)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_string();
            let value = caps
                .get(2)
                .map(|v| v.as_str().trim().to_string())
                .unwrap_or_default();
            Some((name, value))
        })
        .collect()
}

fn scan_module(
    text: &str,
    lines: &LineIndex,
    name: String,
    start: usize,
    name_end: usize,
    end: usize,
) -> RawModule {
    let block = &text[..end];
    let header_end = statement_end(block, name_end).unwrap_or(end);

    let mut module = RawModule::new(name);
    module.range = lines.range(start, end);
    module.ports = scan_ports(block, name_end, end);
    module.params = scan_params(block, name_end, end);
    module.instances = scan_instances(block, lines, header_end, end);
    module
}

/// Last identifier of a declaration piece such as `wire signed [7:0] data = 0`.
fn declared_name(piece: &str) -> Option<String> {
    let lhs = piece.split('=').next().unwrap_or("");
    let lhs = RANGE.replace_all(lhs, " ");
    lhs.split_whitespace()
        .filter(|word| is_identifier(word) && !is_keyword(word))
        .last()
        .map(str::to_string)
}

fn scan_ports(block: &str, from: usize, end: usize) -> Vec<RawPort> {
    let matches = DIRECTION
        .find_iter(&block[from..end])
        .map(|m| (from + m.start(), from + m.end(), m.as_str()))
        .collect::<Vec<_>>();
    let mut ports: Vec<RawPort> = Vec::new();
    for (i, (_, kw_end, dir)) in matches.iter().enumerate() {
        let limit = matches.get(i + 1).map(|(s, _, _)| *s).unwrap_or(end);
        let list = &block[*kw_end..list_end(block, *kw_end, limit)];
        for piece in split_top_level(list, ',') {
            if let Some(name) = declared_name(piece) {
                if let Some(existing) = ports.iter_mut().find(|p| p.name == name) {
                    // non-ANSI style repeats the name in the header list
                    existing.direction = PortDirection::parse(dir);
                } else {
                    ports.push(RawPort {
                        name,
                        direction: PortDirection::parse(dir),
                    });
                }
            }
        }
    }
    ports
}

fn scan_params(block: &str, from: usize, end: usize) -> Vec<RawParam> {
    let matches = PARAMETER
        .find_iter(&block[from..end])
        .map(|m| (from + m.start(), from + m.end()))
        .collect::<Vec<_>>();
    let mut params: Vec<RawParam> = Vec::new();
    for (i, (_, kw_end)) in matches.iter().enumerate() {
        let limit = matches.get(i + 1).map(|(s, _)| *s).unwrap_or(end);
        let list = &block[*kw_end..list_end(block, *kw_end, limit)];
        for piece in split_top_level(list, ',') {
            let Some(name) = declared_name(piece) else {
                continue;
            };
            if params.iter().any(|p| p.name == name) {
                continue;
            }
            let default = piece
                .split_once('=')
                .map(|(_, value)| value.trim().to_string())
                .filter(|value| !value.is_empty());
            params.push(RawParam { name, default });
        }
    }
    params
}

fn scan_instances(block: &str, lines: &LineIndex, from: usize, end: usize) -> Vec<RawInstance> {
    let body = &block[from..end];
    // (position, instance name, type name, span end)
    let mut found: Vec<(usize, String, String, usize)> = Vec::new();

    for caps in PARAM_INSTANCE.captures_iter(body) {
        let (Some(whole), Some(type_name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if is_keyword(type_name.as_str()) {
            continue;
        }
        let open = from + whole.end() - 1;
        let Some(after) = skip_balanced(block, open) else {
            continue;
        };
        if after >= end {
            continue;
        }
        if let Some(inst) = INSTANCE_NAME.captures(&block[after..end]).and_then(|c| c.get(1)) {
            if !is_keyword(inst.as_str()) {
                found.push((
                    from + whole.start(),
                    inst.as_str().to_string(),
                    type_name.as_str().to_string(),
                    after + inst.end(),
                ));
            }
        }
    }

    let spans = found.iter().map(|(s, _, _, e)| (*s, *e)).collect::<Vec<_>>();
    for caps in PLAIN_INSTANCE.captures_iter(body) {
        let (Some(whole), Some(type_name), Some(inst)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let start = from + whole.start();
        if spans.iter().any(|(s, e)| start >= *s && start < *e) {
            continue;
        }
        if is_keyword(type_name.as_str()) || is_keyword(inst.as_str()) {
            continue;
        }
        found.push((
            start,
            inst.as_str().to_string(),
            type_name.as_str().to_string(),
            from + whole.end(),
        ));
    }

    found.sort_by_key(|(start, _, _, _)| *start);
    let mut instances: Vec<RawInstance> = Vec::new();
    for (start, name, type_name, _) in found {
        if instances.iter().any(|i| i.name == name) {
            continue;
        }
        let stop = statement_end(block, start).unwrap_or(end).min(end);
        instances.push(RawInstance {
            name,
            type_name,
            range: lines.range(start, stop),
        });
    }
    instances
}
