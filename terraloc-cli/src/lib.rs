//! CLI library for testing purposes

use std::path::{Path, PathBuf};

use indoc::indoc;
use terraloc::{Codec, FormatType};
use thiserror::Error;
use tracing::warn;

pub const USAGE: &str = indoc! {r#"
    Usage:
        terraloc <input...> -- <output...>

    <input>
        One of the following:
        asm <filePath> <bool:dumpAll> (languages..)
        json <srcLang> <dstLang>
        po <path>
    <output>
        One of the following:
        asm <filePath> <dstLang> [bool:useMainReplacement=true]
        json <dstLang> [bool:useMainReplacement=true]
        po <path>

    Examples:
        terraloc asm Terraria.exe true en-US zh-Hans -- json zh-Hans
            Dump every language of Terraria.exe into per-language folders,
            read en-US as source and zh-Hans as target, and write the target
            as Terraria.Localization.Content.zh-Hans.*.json.
        terraloc json en-US zh-Hans -- po zh-Hans.po
            Read en-US/* as source and zh-Hans/* as target into zh-Hans.po.
        terraloc po zh-Hans.po -- asm Terraria.exe zh-Hans
            Embed the translations of zh-Hans.po into Terraria_locpatched.exe.
"#};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Conversion(#[from] terraloc::Error),
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => 2,
            CliError::Conversion(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Asm {
        path: PathBuf,
        dump_all: bool,
        languages: Vec<String>,
    },
    Json {
        src_lang: String,
        dst_lang: String,
    },
    Po {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputCommand {
    Asm {
        path: PathBuf,
        dst_lang: String,
        use_main_replacement: bool,
    },
    Json {
        dst_lang: String,
        use_main_replacement: bool,
    },
    Po {
        path: PathBuf,
    },
}

/// Parses `true`/`false`, case-insensitively.
pub fn parse_bool(value: &str) -> Result<bool, CliError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(CliError::Usage(format!("expected true or false, got `{}`", value)))
    }
}

fn parse_verb(args: &[String], side: &str) -> Result<FormatType, CliError> {
    let verb = args
        .first()
        .ok_or_else(|| CliError::Usage(format!("missing {}", side)))?;
    verb.parse::<FormatType>()
        .map_err(|e| CliError::Usage(format!("{}: {}", side, e)))
}

fn arity(side: &str, format: FormatType) -> CliError {
    CliError::Usage(format!("wrong number of arguments for {} {}", side, format))
}

pub fn parse_input(args: &[String]) -> Result<InputCommand, CliError> {
    let format = parse_verb(args, "input")?;
    match format {
        FormatType::Asm if args.len() >= 3 => Ok(InputCommand::Asm {
            path: PathBuf::from(&args[1]),
            dump_all: parse_bool(&args[2])?,
            languages: args[3..].to_vec(),
        }),
        FormatType::Json if args.len() >= 3 => Ok(InputCommand::Json {
            src_lang: args[1].clone(),
            dst_lang: args[2].clone(),
        }),
        FormatType::Po if args.len() == 2 => Ok(InputCommand::Po {
            path: PathBuf::from(&args[1]),
        }),
        _ => Err(arity("input", format)),
    }
}

pub fn parse_output(args: &[String]) -> Result<OutputCommand, CliError> {
    let format = parse_verb(args, "output")?;
    let flag = |index: usize| match args.get(index) {
        Some(value) => parse_bool(value),
        None => Ok(true),
    };
    match format {
        FormatType::Asm if args.len() >= 3 => Ok(OutputCommand::Asm {
            path: PathBuf::from(&args[1]),
            dst_lang: args[2].clone(),
            use_main_replacement: flag(3)?,
        }),
        FormatType::Json if args.len() >= 2 => Ok(OutputCommand::Json {
            dst_lang: args[1].clone(),
            use_main_replacement: flag(2)?,
        }),
        FormatType::Po if args.len() == 2 => Ok(OutputCommand::Po {
            path: PathBuf::from(&args[1]),
        }),
        _ => Err(arity("output", format)),
    }
}

/// Runs one conversion. JSON output and assembly dumps go below `work_dir`.
pub fn run(input: &InputCommand, output: &OutputCommand, work_dir: &Path) -> Result<(), CliError> {
    let mut codec = Codec::new();
    match input {
        InputCommand::Asm {
            path,
            dump_all,
            languages,
        } => {
            let dumped = codec.load_asm(path, *dump_all, languages, work_dir)?;
            println!("✅ Dumped {} resource(s) from {}", dumped.len(), path.display());
        }
        InputCommand::Json { src_lang, dst_lang } => {
            codec.load_json(work_dir.join(src_lang), target_dir(work_dir, dst_lang))?;
        }
        InputCommand::Po { path } => codec.load_po(path)?,
    }
    println!("✅ Loaded {} entries", codec.reconciler.len());

    match output {
        // The main group always maps to the bare resource in an assembly.
        OutputCommand::Asm { path, dst_lang, .. } => {
            let (patched, report) = codec.to_asm(path, dst_lang)?;
            for name in &report.replaced {
                println!("✅ Replaced {}", name);
            }
            for name in &report.inserted {
                println!("✅ Added {}", name);
            }
            for (name, reason) in &report.failed {
                warn!(resource = %name, reason = %reason, "resource left unchanged");
                println!("❌ Failed to write {}: {}", name, reason);
            }
            println!("✅ Saved {}", patched.display());
        }
        OutputCommand::Json {
            dst_lang,
            use_main_replacement,
        } => {
            let files = codec.to_json(work_dir, dst_lang, *use_main_replacement)?;
            println!("✅ Wrote {} JSON file(s)", files.len());
        }
        OutputCommand::Po { path } => {
            let count = codec.to_po(path)?;
            println!("✅ Wrote {} message(s) to {}", count, path.display());
        }
    }
    Ok(())
}

// A blank target language leaves the target side empty.
fn target_dir(work_dir: &Path, language: &str) -> PathBuf {
    if language.trim().is_empty() {
        PathBuf::new()
    } else {
        work_dir.join(language)
    }
}
