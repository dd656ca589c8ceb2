//! ilforge-tools — bibliothèque commune du binaire `ilforge`.
//!
//! Le binaire ne fait que parser ses arguments et initialiser les traces ;
//! tout le reste est ici, testable sans processus :
//! - I/O      : [`Input`], [`read_source`]
//! - Listing  : [`assemble_listing`] (texte → corps scellé), [`render`] selon [`AsmFormat`]
//! - Exécution: [`RunTask`], [`run_listing`] (listing → `Program::Main` statique → valeur)
//! - Traces   : [`default_filter`] (verbosité `-v` / `-q` → directive `EnvFilter`)
//!
//! Toutes les fonctions retournent `anyhow::Result` avec du contexte.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unused_must_use)]

use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::debug;

use ilforge_core::disasm::{disassemble_compact, disassemble_full};
use ilforge_core::{asm, Decoded, LocalSlot, MetaEntry, SealedBody, TypeRef};
use ilforge_host::{AssemblyAccess, AssemblyBuilder, AssemblyName, HostOptions, MethodAttributes, Value};

/// Version lisible du crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nom du type hôte construit par [`run_listing`].
pub const PROGRAM_TYPE: &str = "Program";
/// Nom de la méthode statique construite par [`run_listing`].
pub const ENTRY_POINT: &str = "Main";

/* ------------------------------------------------------------------------- */
/* Entrées                                                                   */
/* ------------------------------------------------------------------------- */

/// Listing source : fichier ou `-` (stdin).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Input {
    /// Chemin de fichier.
    Path(PathBuf),
    /// Entrée standard.
    #[default]
    Stdin,
}

impl Input {
    /// `-` devient [`Input::Stdin`].
    pub fn from_arg(arg: &str) -> Self {
        if arg == "-" { Self::Stdin } else { Self::Path(PathBuf::from(arg)) }
    }

    /// Nom affiché dans les en-têtes de listing.
    pub fn display_name(&self) -> String {
        match self {
            Self::Path(p) => p.display().to_string(),
            Self::Stdin => "<stdin>".to_string(),
        }
    }
}

/// Lit tout le listing.
pub fn read_source(input: &Input) -> Result<String> {
    match input {
        Input::Path(p) => fs::read_to_string(p).with_context(|| format!("lecture {}", p.display())),
        Input::Stdin => {
            let mut s = String::new();
            io::stdin().read_to_string(&mut s).context("lecture stdin")?;
            Ok(s)
        }
    }
}

/* ------------------------------------------------------------------------- */
/* Assemblage / rendu                                                        */
/* ------------------------------------------------------------------------- */

/// Assemble puis scelle un listing texte.
pub fn assemble_listing(source: &str) -> Result<SealedBody> {
    let body = asm::assemble(source).context("assemblage du listing")?;
    let sealed = body.seal().context("scellement du corps")?;
    debug!(size = sealed.len(), crc = sealed.checksum(), "listing assembled");
    Ok(sealed)
}

/// Format de sortie de `ilforge asm`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AsmFormat {
    /// Une ligne : taille, instructions, crc.
    #[default]
    Summary,
    /// Désassemblage complet avec en-tête.
    Disasm,
    /// Désassemblage sans en-tête ni octets.
    Compact,
    /// Instructions décodées et métadonnées en JSON.
    Json,
    /// Octets de code, 16 par ligne.
    Hex,
}

/// Vue sérialisable d'un corps scellé.
#[derive(Debug, Serialize)]
struct Listing<'a> {
    title: &'a str,
    size: usize,
    crc: u32,
    locals: &'a [LocalSlot],
    tokens: &'a [MetaEntry],
    instructions: Vec<Decoded>,
}

/// Rend `body` selon `format`.
pub fn render(body: &SealedBody, title: &str, format: AsmFormat) -> Result<String> {
    let text = match format {
        AsmFormat::Summary => {
            let instrs = body.decode().context("décodage")?.len();
            format!("{title}: {} bytes, {instrs} instructions, crc=0x{:08x}\n", body.len(), body.checksum())
        }
        AsmFormat::Disasm => disassemble_full(body, title).context("désassemblage")?,
        AsmFormat::Compact => disassemble_compact(body).context("désassemblage")?,
        AsmFormat::Json => {
            let listing = Listing {
                title,
                size: body.len(),
                crc: body.checksum(),
                locals: body.locals(),
                tokens: body.tokens(),
                instructions: body.decode().context("décodage")?,
            };
            let mut json = serde_json::to_string_pretty(&listing)?;
            json.push('\n');
            json
        }
        AsmFormat::Hex => hex_dump(body.code()),
    };
    Ok(text)
}

/// `0000: 00 01 …`, 16 octets par ligne.
pub fn hex_dump(code: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in code.chunks(16).enumerate() {
        let bytes: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
        let _ = writeln!(out, "{:04x}: {}", row * 16, bytes.join(" "));
    }
    out
}

/* ------------------------------------------------------------------------- */
/* Exécution                                                                 */
/* ------------------------------------------------------------------------- */

/// Paramètres de `ilforge run`.
#[derive(Clone, Debug, PartialEq)]
pub struct RunTask {
    /// Arguments `int32`, un paramètre par valeur.
    pub args: Vec<i32>,
    /// Type de retour de `Main`.
    pub ret: TypeRef,
    /// Limites de l'interpréteur.
    pub options: HostOptions,
}

impl Default for RunTask {
    fn default() -> Self {
        Self { args: Vec::new(), ret: TypeRef::I32, options: HostOptions::default() }
    }
}

/// Parse un nom de type de retour (`int32`, `void`, `string[]`, …).
pub fn parse_ret(text: &str) -> Result<TypeRef> {
    TypeRef::parse(text).ok_or_else(|| anyhow!("type de retour invalide: `{text}`"))
}

/// Construit `Program::Main(int32 × n) -> ret` depuis le listing, l'exécute et
/// retourne sa valeur.
pub fn run_listing(source: &str, task: &RunTask) -> Result<Value> {
    let body = asm::assemble(source).context("assemblage du listing")?;

    let mut assembly = AssemblyBuilder::define_dynamic_assembly(AssemblyName::new(PROGRAM_TYPE), AssemblyAccess::Run);
    let module = assembly.define_dynamic_module_with(PROGRAM_TYPE, task.options)?;
    let mut tb = module.define_public_class(PROGRAM_TYPE, None, &[])?;
    let params = vec![TypeRef::I32; task.args.len()];
    let id = tb.define_method(ENTRY_POINT, MethodAttributes::PUBLIC | MethodAttributes::STATIC, task.ret.clone(), params)?;
    tb.set_method_body(id, body)?;
    let ty = tb.create_type().context("matérialisation de `Program`")?;

    let args: Vec<Value> = task.args.iter().copied().map(Value::I32).collect();
    debug!(args = args.len(), max_steps = task.options.max_steps, "running Program::Main");
    ty.invoke_static(ENTRY_POINT, &args).with_context(|| format!("exécution de `{PROGRAM_TYPE}::{ENTRY_POINT}`"))
}

/* ------------------------------------------------------------------------- */
/* Traces                                                                    */
/* ------------------------------------------------------------------------- */

/// Directive de filtre par défaut (quand `RUST_LOG` est absent).
pub const fn default_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/* ------------------------------------------------------------------------- */
/* Tests                                                                     */
/* ------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOUBLE: &str = "
        ldarg.0
        ldc.i4.2
        mul
        ret
    ";

    #[test]
    fn input_from_dash_is_stdin() {
        assert_eq!(Input::from_arg("-"), Input::Stdin);
        assert_eq!(Input::from_arg("a.il"), Input::Path(PathBuf::from("a.il")));
        assert_eq!(Input::Stdin.display_name(), "<stdin>");
    }

    #[test]
    fn summary_and_hex() {
        let body = assemble_listing(DOUBLE).expect("assemble");
        let summary = render(&body, "double", AsmFormat::Summary).expect("summary");
        assert!(summary.starts_with("double: 4 bytes, 4 instructions, crc=0x"), "{summary}");
        assert_eq!(hex_dump(body.code()), "0000: 02 18 5a 2a\n");
    }

    #[test]
    fn hex_rows_wrap_at_sixteen() {
        let dump = hex_dump(&[0u8; 17]);
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.lines().nth(1).is_some_and(|l| l.starts_with("0010: 00")));
    }

    #[test]
    fn json_lists_every_instruction() {
        let body = assemble_listing(DOUBLE).expect("assemble");
        let json = render(&body, "double", AsmFormat::Json).expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value["size"], 4);
        assert_eq!(value["instructions"].as_array().map(Vec::len), Some(4));
    }

    #[test]
    fn run_passes_int_arguments() {
        let task = RunTask { args: vec![21], ..RunTask::default() };
        assert_eq!(run_listing(DOUBLE, &task).expect("run"), Value::I32(42));
    }

    #[test]
    fn bad_return_type_and_missing_argument_are_errors() {
        assert!(parse_ret("int 32").is_err());
        assert_eq!(parse_ret("int64").expect("int64"), TypeRef::I64);
        let task = RunTask { args: vec![1], ..RunTask::default() };
        let err = run_listing("ldarg.1\nret", &task).unwrap_err();
        assert!(format!("{err:#}").contains("Program"), "{err:#}");
    }

    #[test]
    fn verbosity_maps_to_filters() {
        assert_eq!(default_filter(0, false), "warn");
        assert_eq!(default_filter(2, false), "debug");
        assert_eq!(default_filter(7, false), "trace");
        assert_eq!(default_filter(3, true), "error");
    }
}
