//! `ilforge` — assembler, inspecter et exécuter des listings IL.
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation des traces,
//! et délégation à `ilforge_tools` (lib).
//!
//! Usage :
//!   ilforge asm square.il --disasm
//!   cat square.il | ilforge asm - --json
//!   ilforge run square.il --arg 9 --ret int32 --max-steps 10000
//!   RUST_LOG=ilforge_host=trace ilforge run loop.il --arg 10

#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ilforge_host::HostOptions;
use ilforge_tools as tools;

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "ilforge", version, about = "ilforge — assembler et exécuter des corps de méthode IL", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux (erreurs seulement)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, global = true)]
    quiet: bool,

    /// Sous-commandes
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Assembler un listing et afficher le corps scellé
    Asm {
        /// Listing (ou - pour stdin)
        #[arg(default_value = "-")]
        input: String,
        /// Désassemblage complet
        #[arg(long, conflicts_with_all = ["json", "hex"])]
        disasm: bool,
        /// Instructions décodées en JSON
        #[arg(long, conflicts_with = "hex")]
        json: bool,
        /// Octets de code en hexadécimal
        #[arg(long)]
        hex: bool,
    },

    /// Exécuter un listing comme `Program::Main(int32, ...)`
    Run {
        /// Listing (ou - pour stdin)
        #[arg(default_value = "-")]
        input: String,
        /// Argument int32 (répétable, dans l'ordre des paramètres)
        #[arg(long = "arg", allow_negative_numbers = true)]
        args: Vec<i32>,
        /// Type de retour de `Main`
        #[arg(long, default_value = "int32")]
        ret: String,
        /// Instructions exécutées au plus
        #[arg(long)]
        max_steps: Option<u64>,
    },
}

// ──────────────────────────── Logger / Verbosité ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tools::default_filter(verbose, quiet)));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).try_init();
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("error: {e:#}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn real_main() -> Result<()> {
    let opt = Opt::parse();
    init_telemetry(opt.verbose, opt.quiet);

    let text = match opt.cmd {
        Command::Asm { input, disasm, json, hex } => {
            let input = tools::Input::from_arg(&input);
            let source = tools::read_source(&input)?;
            let body = tools::assemble_listing(&source)?;
            let format = if disasm {
                tools::AsmFormat::Disasm
            } else if json {
                tools::AsmFormat::Json
            } else if hex {
                tools::AsmFormat::Hex
            } else {
                tools::AsmFormat::Summary
            };
            tools::render(&body, &input.display_name(), format)?
        }
        Command::Run { input, args, ret, max_steps } => {
            let source = tools::read_source(&tools::Input::from_arg(&input))?;
            let mut options = HostOptions::default();
            if let Some(n) = max_steps {
                options = options.with_max_steps(n);
            }
            let task = tools::RunTask { args, ret: tools::parse_ret(&ret)?, options };
            let value = tools::run_listing(&source, &task)?;
            format!("{value}\n")
        }
    };

    io::stdout().lock().write_all(text.as_bytes()).context("écriture stdout")?;
    Ok(())
}
