//! CLI: infer → check | generate
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use json_shapes::inference::Inference;
use json_shapes::{DecodeOptions, GenerateOptions, Schema, ValidationError};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// infer a schema from JSON/NDJSON samples, then check documents against it or generate examples
#[derive(Parser, Debug)]
#[command(name = "json-shapes", version)]
pub struct CommandLineInterface {
    /// more log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// infer and print the schema's name and structural signature
    Infer(InferOut),
    /// infer from --samples and decode every --input document against the result
    Check(CheckOut),
    /// infer and print example values, one JSON document per line
    Generate(GenerateOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns or '-' for stdin
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Parser, Debug)]
struct InferOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// sample documents the schema is inferred from; same settings as --input
    #[arg(long, num_args = 1.., required = true)]
    samples: Vec<String>,

    /// report keys no struct declares
    #[arg(long)]
    exact: bool,

    #[arg(long, value_enum, default_value_t)]
    format: OutputFormat,
}

#[derive(clap::Parser, Debug)]
struct GenerateOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// how many examples to print
    #[arg(long, default_value_t = 5)]
    count: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// recursive boundaries crossed before generation bottoms out
    #[arg(long, default_value_t = 4)]
    max_depth: usize,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

/// One loaded JSON document and where it came from.
#[derive(Debug, Clone)]
struct Document {
    source: String,
    value: Json,
}

#[derive(Serialize)]
struct CheckReport<'a> {
    document: &'a str,
    ok: bool,
    errors: Vec<ValidationError>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> Result<Vec<Document>> {
        self.load_patterns(&self.input)
    }

    fn load_patterns(&self, patterns: &[String]) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        for source_path in resolve_file_path_patterns(patterns)? {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = read_source(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            let parsed = if self.ndjson {
                source
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| !line.trim().is_empty())
                    .map(|(ix, line)| {
                        let label = format!("{source_path_str}:{}", ix + 1);
                        let value = serde_json::from_str::<Json>(line)
                            .with_context(|| format!("failed to parse NDJSON line ({label})"))?;
                        Ok(Document { source: label, value })
                    })
                    .collect::<Result<Vec<_>>>()?
            } else {
                let value = serde_json::from_str::<Json>(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                vec![Document { source: source_path_str.clone(), value }]
            };
            for doc in parsed {
                self.process(doc, &mut out)?;
            }
        }
        debug!(documents = out.len(), "loaded inputs");
        Ok(out)
    }

    fn process(&self, doc: Document, out: &mut Vec<Document>) -> Result<()> {
        let value = match self.json_pointer.as_deref() {
            None => doc.value,
            Some(pointer) => match doc.value.pointer(pointer) {
                Some(v) => v.clone(),
                None => {
                    warn!(source = %doc.source, pointer, "json pointer matched nothing; skipping");
                    return Ok(());
                }
            },
        };
        match self.jq_expr.as_ref() {
            None => out.push(Document { source: doc.source, value }),
            Some(jq_expr) => {
                let results = crate::jq_exec::apply_filter(jq_expr, &value)
                    .with_context(|| format!("failed to apply jq expression to {}", doc.source))?;
                for (ix, value) in results.into_iter().enumerate() {
                    out.push(Document { source: format!("{}[{ix}]", doc.source), value });
                }
            }
        }
        Ok(())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbose
    }

    pub fn run(&self) -> Result<ExitCode> {
        match &self.cmd {
            Command::Infer(target) => {
                let docs = target.input_settings.load()?;
                let schema = infer(&docs);
                let m = schema.materialize();
                let rendered = match target.format {
                    OutputFormat::Text => format!("{}\n{}", schema.name(), m.hash()),
                    OutputFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
                        "name": schema.name(),
                        "signature": m.hash(),
                        "samples": docs.len(),
                    }))?,
                };
                write_output(target.out.as_deref(), &rendered)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Check(target) => {
                let samples = target.input_settings.load_patterns(&target.samples)?;
                if samples.is_empty() {
                    bail!("no sample documents loaded");
                }
                let schema = infer(&samples);
                info!(schema = schema.name(), "inferred schema");
                let docs = target.input_settings.load()?;
                let options = DecodeOptions { exact: target.exact };
                let m = schema.materialize();
                let results: Vec<(&Document, Vec<ValidationError>)> = docs
                    .par_iter()
                    .map(|doc| {
                        let errors = match m.decode_with(&doc.value, options) {
                            Ok(_) => Vec::new(),
                            Err(err) => err.into_inner(),
                        };
                        (doc, errors)
                    })
                    .collect();
                let failed = results.iter().filter(|(_, errors)| !errors.is_empty()).count();
                match target.format {
                    OutputFormat::Text => print_check_text(&results, failed),
                    OutputFormat::Json => {
                        let reports: Vec<CheckReport<'_>> = results
                            .into_iter()
                            .map(|(doc, errors)| CheckReport { document: &doc.source, ok: errors.is_empty(), errors })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&reports)?);
                    }
                }
                Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
            }
            Command::Generate(target) => {
                let docs = target.input_settings.load()?;
                let schema = infer(&docs);
                let m = schema.materialize();
                let options = GenerateOptions { seed: target.seed, max_depth: target.max_depth, ..GenerateOptions::default() };
                let lines = m
                    .generate_with(options)
                    .take(target.count)
                    .map(|v| serde_json::to_string(&m.encode(&v)))
                    .collect::<Result<Vec<_>, _>>()?;
                write_output(target.out.as_deref(), &lines.join("\n"))?;
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn infer(docs: &[Document]) -> Schema {
    let mut inf = Inference::new();
    for doc in docs {
        inf.observe_value(&doc.value);
    }
    inf.schema()
}

fn print_check_text(results: &[(&Document, Vec<ValidationError>)], failed: usize) {
    for (doc, errors) in results {
        if errors.is_empty() {
            println!("{} {}", "✔".green(), doc.source);
            continue;
        }
        println!("{} {}", "✘".red().bold(), doc.source.bold());
        for error in errors {
            let path = if error.path.is_empty() { "(root)" } else { error.path.as_str() };
            println!("    {} {}", format!("{path}:").yellow(), error.message);
        }
    }
    let summary = format!("{} checked, {} failed", results.len(), failed);
    if failed == 0 {
        println!("{}", summary.green());
    } else {
        println!("{}", summary.red());
    }
}

fn write_output(out: Option<&Path>, contents: &str) -> Result<()> {
    let Some(out) = out else {
        println!("{contents}");
        return Ok(());
    };
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))
}

fn read_source(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path)
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern).with_context(|| format!("invalid glob pattern: {pattern}"))? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // an explicit glob that matches nothing is almost always a typo
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
