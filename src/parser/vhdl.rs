//! Skeleton scanner for VHDL.
//!
//! Entities become modules (ports from the `port` clause, parameters from the `generic`
//! clause); component and direct entity instantiations inside an `architecture … of X`
//! body are attached to entity `X`. VHDL is case-insensitive, so every identifier is
//! lower-cased.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use super::{
    source::{blank_out, skip_balanced, split_top_level, LineIndex, SourceScan},
    FastParse, FullParse, LanguageId, LanguageParser, PortDirection, RawInstance, RawModule,
    RawParam, RawPort,
};
use crate::error::SyncError;

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").expect("comment pattern"));
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bentity\s+([A-Za-z]\w*)\s+is\b").expect("entity pattern")
});
static END: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bend\b[^;]*;").expect("end pattern"));
static GENERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bgeneric\s*\(").expect("generic pattern"));
static PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bport\s*\(").expect("port pattern"));
static ARCHITECTURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\barchitecture\s+([A-Za-z]\w*)\s+of\s+([A-Za-z]\w*)\s+is\b")
        .expect("architecture pattern")
});
static INSTANCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b([A-Za-z]\w*)\s*:\s*(?:entity\s+(?:\w+\.)?(\w+)|component\s+(\w+)|(\w+))\s*(?:\(\s*\w+\s*\)\s*)?(?:generic|port)\s+map\b",
    )
    .expect("instance pattern")
});

#[derive(Debug, Clone, Default)]
pub struct VhdlParser;

impl LanguageParser for VhdlParser {
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
            language: LanguageId::Vhdl,
        })
    }

    fn full(&self, path: &Path) -> Result<FullParse, SyncError> {
        let text = std::fs::read_to_string(path)?;
        let scan = scan(&text);
        Ok(FullParse::from_modules(
            &scan.modules,
            scan.errors,
            scan.macros,
            LanguageId::Vhdl,
        ))
    }
}

/// Scan VHDL source text.
pub fn scan(text: &str) -> SourceScan {
    let text = blank_out(text, &COMMENT);
    let lines = LineIndex::new(&text);
    let mut result = SourceScan::default();

    for caps in ENTITY.captures_iter(&text) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let Some(end) = END.find_at(&text, whole.end()) else {
            result
                .errors
                .push(format!("entity `{name}` is never closed"));
            continue;
        };
        let block = &text[whole.end()..end.start()];
        let mut module = RawModule::new(name);
        module.range = lines.range(whole.start(), end.end());
        module.params = clause(block, &GENERIC)
            .map(scan_generics)
            .unwrap_or_default();
        module.ports = clause(block, &PORT).map(scan_ports).unwrap_or_default();
        result.modules.push(module);
    }

    let architectures = ARCHITECTURE
        .captures_iter(&text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let entity = caps.get(2)?.as_str().to_ascii_lowercase();
            Some((whole.start(), whole.end(), entity))
        })
        .collect::<Vec<_>>();
    for (i, (start, body_start, entity)) in architectures.iter().enumerate() {
        let body_end = architectures
            .get(i + 1)
            .map(|(next, _, _)| *next)
            .unwrap_or(text.len());
        let instances = scan_instances(&text, &lines, *body_start, body_end);
        let module = match result.modules.iter().position(|m| &m.name == entity) {
            Some(idx) => &mut result.modules[idx],
            None => {
                let mut module = RawModule::new(entity.clone());
                module.range = lines.range(*start, body_end);
                result.modules.push(module);
                let last = result.modules.len() - 1;
                &mut result.modules[last]
            }
        };
        module.range.end = module.range.end.max(lines.line(body_end.saturating_sub(1)));
        for instance in instances {
            if !module.instances.iter().any(|i| i.name == instance.name) {
                module.instances.push(instance);
            }
        }
    }
    result
}

/// Contents of the first `keyword ( … )` clause in `block`.
fn clause<'a>(block: &'a str, pattern: &Regex) -> Option<&'a str> {
    let open = pattern.find(block)?.end() - 1;
    let close = skip_balanced(block, open)?;
    Some(&block[open + 1..close - 1])
}

fn names(lhs: &str) -> impl Iterator<Item = String> + '_ {
    lhs.split(',')
        .map(|n| n.trim().to_ascii_lowercase())
        .filter(|n| !n.is_empty())
}

fn scan_generics(clause: &str) -> Vec<RawParam> {
    let mut params = Vec::new();
    for piece in split_top_level(clause, ';') {
        let Some((lhs, rhs)) = piece.split_once(':') else {
            continue;
        };
        let default = rhs
            .split_once(":=")
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());
        for name in names(lhs) {
            params.push(RawParam {
                name,
                default: default.clone(),
            });
        }
    }
    params
}

fn scan_ports(clause: &str) -> Vec<RawPort> {
    let mut ports = Vec::new();
    for piece in split_top_level(clause, ';') {
        let Some((lhs, rhs)) = piece.split_once(':') else {
            continue;
        };
        let direction = rhs
            .split_whitespace()
            .next()
            .map(PortDirection::parse)
            .unwrap_or(PortDirection::Unknown);
        for name in names(lhs) {
            ports.push(RawPort { name, direction });
        }
    }
    ports
}

fn scan_instances(text: &str, lines: &LineIndex, from: usize, to: usize) -> Vec<RawInstance> {
    INSTANCE
        .captures_iter(&text[from..to])
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let type_name = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))?
                .as_str()
                .to_ascii_lowercase();
            Some(RawInstance {
                name,
                type_name,
                range: lines.range(from + whole.start(), from + whole.end()),
            })
        })
        .collect()
}
