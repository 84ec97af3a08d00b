//! Parse adapter: per-language parsers behind a common record shape.
//!
//! A [`LanguageParser`] turns one file into either a fast skeleton ([`FastParse`]: modules
//! with their ports, parameters and instances) or a full symbol listing ([`FullParse`]:
//! symbols plus error strings). The [`ParseAdapter`] picks the parser by file extension,
//! runs it off the async executor, and collapses every kind of failure into `None`:
//!
//! ```rust
//! use hdl_sync::parser::{ParseAdapter, ParserRegistry};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let adapter = ParseAdapter::new(ParserRegistry::create());
//! // Missing file: the parser fails, the adapter reports "no result".
//! assert!(adapter.parse_fast("/no/such/file.v".as_ref()).await.is_none());
//! # }
//! ```
//!
//! Built-in parsers are lightweight skeleton scanners ([`verilog`], [`vhdl`]); register a
//! real front end with [`ParserRegistry::insert`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    path::Path,
    sync::Arc,
};

use crate::error::SyncError;

mod source;
pub mod verilog;
pub mod vhdl;

pub use source::SourceScan;
pub use verilog::VerilogParser;
pub use vhdl::VhdlParser;

/// Macro name to replacement text.
pub type MacroTable = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LanguageId {
    Verilog,
    SystemVerilog,
    Vhdl,
}

impl LanguageId {
    pub fn from_extension(ext: &str) -> Option<LanguageId> {
        match ext.to_ascii_lowercase().as_str() {
            "v" | "vh" | "vl" => Some(LanguageId::Verilog),
            "sv" | "svh" => Some(LanguageId::SystemVerilog),
            "vhd" | "vhdl" | "vho" | "vht" => Some(LanguageId::Vhdl),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<LanguageId> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(LanguageId::from_extension)
    }
}

impl Display for LanguageId {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            LanguageId::Verilog => write!(f, "verilog"),
            LanguageId::SystemVerilog => write!(f, "systemverilog"),
            LanguageId::Vhdl => write!(f, "vhdl"),
        }
    }
}

/// 1-based, inclusive line span.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
    Inout,
    Unknown,
}

impl PortDirection {
    pub fn parse(s: &str) -> PortDirection {
        match s.to_ascii_lowercase().as_str() {
            "input" | "in" => PortDirection::Input,
            "output" | "out" | "buffer" => PortDirection::Output,
            "inout" => PortDirection::Inout,
            _ => PortDirection::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortDirection::Input => "input",
            PortDirection::Output => "output",
            PortDirection::Inout => "inout",
            PortDirection::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPort {
    pub name: String,
    pub direction: PortDirection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParam {
    pub name: String,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstance {
    pub name: String,
    /// Name of the instantiated module
    pub type_name: String,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawModule {
    pub name: String,
    pub ports: Vec<RawPort>,
    pub params: Vec<RawParam>,
    pub instances: Vec<RawInstance>,
    pub range: SourceRange,
}

impl RawModule {
    pub fn new(name: impl Into<String>) -> Self {
        RawModule {
            name: name.into(),
            ports: Vec::new(),
            params: Vec::new(),
            instances: Vec::new(),
            range: SourceRange::default(),
        }
    }

    pub fn with_instance(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.instances.push(RawInstance {
            name: name.into(),
            type_name: type_name.into(),
            range: SourceRange::default(),
        });
        self
    }

    pub fn with_port(mut self, name: impl Into<String>, direction: PortDirection) -> Self {
        self.ports.push(RawPort {
            name: name.into(),
            direction,
        });
        self
    }
}

/// Module skeletons of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastParse {
    pub content: Vec<RawModule>,
    pub macros: MacroTable,
    pub language: LanguageId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    Module,
    Port,
    Parameter,
    Instance,
    Macro,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSymbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Enclosing module for ports, parameters and instances
    pub parent: Option<String>,
    /// Port direction, parameter default, instance type or macro value
    pub detail: Option<String>,
    pub range: SourceRange,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullContent {
    pub errors: Vec<String>,
    pub symbols: Vec<RawSymbol>,
}

/// Complete symbol listing of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullParse {
    pub content: FullContent,
    pub macros: MacroTable,
    pub language: LanguageId,
}

impl FullParse {
    /// Flatten module skeletons into a symbol list.
    pub fn from_modules(
        modules: &[RawModule],
        errors: Vec<String>,
        macros: MacroTable,
        language: LanguageId,
    ) -> FullParse {
        let mut symbols = Vec::new();
        for module in modules {
            symbols.push(RawSymbol {
                name: module.name.clone(),
                kind: SymbolKind::Module,
                parent: None,
                detail: None,
                range: module.range,
            });
            let parent = Some(module.name.clone());
            for port in module.ports.iter() {
                symbols.push(RawSymbol {
                    name: port.name.clone(),
                    kind: SymbolKind::Port,
                    parent: parent.clone(),
                    detail: Some(port.direction.as_str().to_string()),
                    range: module.range,
                });
            }
            for param in module.params.iter() {
                symbols.push(RawSymbol {
                    name: param.name.clone(),
                    kind: SymbolKind::Parameter,
                    parent: parent.clone(),
                    detail: param.default.clone(),
                    range: module.range,
                });
            }
            for inst in module.instances.iter() {
                symbols.push(RawSymbol {
                    name: inst.name.clone(),
                    kind: SymbolKind::Instance,
                    parent: parent.clone(),
                    detail: Some(inst.type_name.clone()),
                    range: inst.range,
                });
            }
        }
        for (name, value) in macros.iter() {
            symbols.push(RawSymbol {
                name: name.clone(),
                kind: SymbolKind::Macro,
                parent: None,
                detail: Some(value.clone()),
                range: SourceRange::default(),
            });
        }
        FullParse {
            content: FullContent { errors, symbols },
            macros,
            language,
        }
    }

    /// Project the symbol listing onto the fast-parse shape. Child symbols whose parent
    /// module is not in the listing are dropped.
    pub fn skeleton(&self) -> FastParse {
        let mut modules: Vec<RawModule> = Vec::new();
        for symbol in self.content.symbols.iter() {
            if symbol.kind == SymbolKind::Module {
                let mut module = RawModule::new(symbol.name.clone());
                module.range = symbol.range;
                modules.push(module);
                continue;
            }
            let Some(parent) = symbol.parent.as_ref() else {
                continue;
            };
            let Some(module) = modules.iter_mut().find(|m| &m.name == parent) else {
                continue;
            };
            match symbol.kind {
                SymbolKind::Port => module.ports.push(RawPort {
                    name: symbol.name.clone(),
                    direction: PortDirection::parse(symbol.detail.as_deref().unwrap_or("")),
                }),
                SymbolKind::Parameter => module.params.push(RawParam {
                    name: symbol.name.clone(),
                    default: symbol.detail.clone(),
                }),
                SymbolKind::Instance => {
                    if let Some(type_name) = symbol.detail.clone() {
                        module.instances.push(RawInstance {
                            name: symbol.name.clone(),
                            type_name,
                            range: symbol.range,
                        });
                    }
                }
                SymbolKind::Module | SymbolKind::Macro => {}
            }
        }
        FastParse {
            content: modules,
            macros: self.macros.clone(),
            language: self.language,
        }
    }
}

/// A front end for one HDL. Implementations are called from the blocking pool and may
/// do synchronous file I/O.
pub trait LanguageParser: Send + Sync {
    /// Module skeletons only. Must fail on input it cannot make sense of.
    fn fast(&self, path: &Path) -> Result<FastParse, SyncError>;

    /// Full symbol listing with error strings.
    fn full(&self, path: &Path) -> Result<FullParse, SyncError>;
}

/// Registry of parsers keyed by language.
#[derive(Clone, Default)]
pub struct ParserRegistry(Arc<RwLock<BTreeMap<LanguageId, Arc<dyn LanguageParser>>>>);

impl ParserRegistry {
    /// Registry with the built-in skeleton scanners.
    pub fn create() -> Self {
        let registry = ParserRegistry::default();
        registry.insert(
            LanguageId::Verilog,
            Arc::new(VerilogParser::new(LanguageId::Verilog)),
        );
        registry.insert(
            LanguageId::SystemVerilog,
            Arc::new(VerilogParser::new(LanguageId::SystemVerilog)),
        );
        registry.insert(LanguageId::Vhdl, Arc::new(VhdlParser));
        registry
    }

    /// Install `parser` for `language`, replacing any previous one.
    pub fn insert(&self, language: LanguageId, parser: Arc<dyn LanguageParser>) {
        self.0.write().insert(language, parser);
    }

    pub fn get(&self, language: LanguageId) -> Option<Arc<dyn LanguageParser>> {
        self.0.read().get(&language).cloned()
    }

    pub fn languages(&self) -> Vec<LanguageId> {
        self.0.read().keys().copied().collect()
    }
}

#[derive(Clone, Copy)]
enum Mode {
    Fast,
    Full,
}

/// Runs the registered parser for a path and normalizes failures to `None`.
#[derive(Clone, Default)]
pub struct ParseAdapter {
    parsers: ParserRegistry,
}

impl ParseAdapter {
    pub fn new(parsers: ParserRegistry) -> Self {
        ParseAdapter { parsers }
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.parsers
    }

    pub async fn parse_fast(&self, path: &Path) -> Option<FastParse> {
        match self.run(path, Mode::Fast).await? {
            Parsed::Fast(fast) => Some(fast),
            Parsed::Full(_) => None,
        }
    }

    pub async fn parse_full(&self, path: &Path) -> Option<FullParse> {
        match self.run(path, Mode::Full).await? {
            Parsed::Full(full) => Some(full),
            Parsed::Fast(_) => None,
        }
    }

    async fn run(&self, path: &Path, mode: Mode) -> Option<Parsed> {
        let Some(language) = LanguageId::from_path(path) else {
            tracing::debug!("[ParseAdapter] no language for {:?}", path);
            return None;
        };
        let Some(parser) = self.parsers.get(language) else {
            tracing::debug!("[ParseAdapter] no parser registered for {language}");
            return None;
        };
        let owned = path.to_path_buf();
        let joined = tokio::task::spawn_blocking(move || match mode {
            Mode::Fast => parser.fast(&owned).map(Parsed::Fast),
            Mode::Full => parser.full(&owned).map(Parsed::Full),
        })
        .await;
        match joined {
            Ok(Ok(mut parsed)) => {
                parsed.set_language(language);
                Some(parsed)
            }
            Ok(Err(e)) => {
                tracing::debug!("[ParseAdapter] {language} parser failed on {:?}: {e}", path);
                None
            }
            Err(e) => {
                tracing::warn!("[ParseAdapter] {language} parser aborted on {:?}: {e}", path);
                None
            }
        }
    }
}

enum Parsed {
    Fast(FastParse),
    Full(FullParse),
}

impl Parsed {
    fn set_language(&mut self, language: LanguageId) {
        match self {
            Parsed::Fast(fast) => fast.language = language,
            Parsed::Full(full) => full.language = language,
        }
    }
}
