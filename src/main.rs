use anyhow::{bail, Context, Result};
use clap::{Parser as CliParser, Subcommand, ValueEnum};
use log::info;
use onlv_rs::core::document::{OnlvDocument, SkeletonInfo};
use onlv_rs::core::filter::{filter_document, validate_full_nr};
use onlv_rs::core::flatten::{flatten, search_rows, FlattenMode};
use onlv_rs::core::insert::add_position_to_path;
use onlv_rs::core::merge::{merge_into_document, MergeTarget};
use onlv_rs::core::numbering::generate_next_nr;
use onlv_rs::core::parser::UniversalParser;
use onlv_rs::core::position_info::extract_position_info;
use onlv_rs::core::registry::{check_nr_existence, init_nr_list};
use onlv_rs::core::writer::{export_document, OnlvXmlWriter, Writer};
use onlv_rs::utils::document_processor::DocumentProcessor;
use onlv_rs::Config;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

#[derive(CliParser)]
#[command(name = "onlv", version, about = "ONLV tender specification tools")]
struct Cli {
    /// JSON configuration file, overrides ONLV_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Standard number list, overrides ONLV_NRLIST
    #[arg(long, global = true)]
    nrlist: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    Compact,
    Full,
}

impl From<Mode> for FlattenMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Compact => FlattenMode::Compact,
            Mode::Full => FlattenMode::Full,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Lgs,
    Ulgs,
    Grundtexte,
    Folgepositionen,
    Ungeteilte,
}

#[derive(Subcommand)]
enum Command {
    /// Print the flattened rows as JSON
    Flatten {
        input: PathBuf,
        #[arg(long, value_enum, default_value = "compact")]
        mode: Mode,
        /// Keep only rows matching this text, plus their ancestors
        #[arg(long)]
        search: Option<String>,
    },
    /// Print the form context of one row
    Info {
        input: PathBuf,
        /// Row id as printed by `flatten`
        #[arg(long)]
        id: String,
        #[arg(long, value_enum, default_value = "compact")]
        mode: Mode,
    },
    /// Print the number following NR
    NextNr { nr: String },
    /// Merge items from a JSON file into the document
    Merge {
        input: PathBuf,
        /// JSON file with one item or an array of items
        #[arg(long)]
        items: PathBuf,
        #[arg(long, value_enum)]
        target: Target,
        #[arg(long)]
        lg: Option<String>,
        #[arg(long)]
        ulg: Option<String>,
        #[arg(long)]
        grundtext: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Add a Folgeposition under LG.ULG.GT
    Insert {
        input: PathBuf,
        #[arg(long)]
        path: String,
        /// JSON file with the new position, empty position when omitted
        #[arg(long)]
        leaf: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write the document as .onlv into a directory
    Export {
        input: PathBuf,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Keep only the given full numbers (LLGGTT or LLGGTTA)
    Filter {
        input: PathBuf,
        #[arg(long = "nr", required = true)]
        nrs: Vec<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check whether a full number exists in the document and the standard list
    Check { input: PathBuf, nr: String },
    /// Create an empty document
    Skeleton {
        #[arg(long)]
        dateiname: Option<String>,
        #[arg(long)]
        lvcode: Option<String>,
        #[arg(long)]
        vorhaben: Option<String>,
        #[arg(long)]
        lvbezeichnung: Option<String>,
        #[arg(long)]
        auftraggeber: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Flatten and re-export every document below a directory
    Batch { input_dir: PathBuf, output_dir: PathBuf },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load(path: &Path) -> Result<OnlvDocument> {
    UniversalParser::new()
        .parse(path)
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// `.json` outputs keep the JSON form, everything else is written as XML.
fn save(doc: &OnlvDocument, path: &Path, config: &Config) -> Result<()> {
    let is_json = path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        std::fs::write(path, serde_json::to_string_pretty(doc)?)?;
    } else {
        OnlvXmlWriter::new(config.export.clone()).write(doc, path)?;
    }
    info!("Wrote {}", path.display());
    Ok(())
}

fn merge_target(target: Target, lg: Option<String>, ulg: Option<String>, grundtext: Option<String>) -> Result<MergeTarget> {
    let need = |value: Option<String>, flag: &str| value.with_context(|| format!("--{flag} is required for this target"));
    Ok(match target {
        Target::Lgs => MergeTarget::Lgs,
        Target::Ulgs => MergeTarget::Ulgs { lg: need(lg, "lg")? },
        Target::Grundtexte => MergeTarget::Grundtexte {
            lg: need(lg, "lg")?,
            ulg: need(ulg, "ulg")?,
        },
        Target::Folgepositionen => MergeTarget::Folgepositionen {
            lg: need(lg, "lg")?,
            ulg: need(ulg, "ulg")?,
            grundtext: need(grundtext, "grundtext")?,
        },
        Target::Ungeteilte => MergeTarget::Ungeteilte {
            lg: need(lg, "lg")?,
            ulg: need(ulg, "ulg")?,
            grundtext: need(grundtext, "grundtext")?,
        },
    })
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if cli.nrlist.is_some() {
        config.nrlist_path = cli.nrlist.clone();
    }

    match cli.command {
        Command::Flatten { input, mode, search } => {
            let doc = load(&input)?;
            let rows = flatten(Some(&doc), mode.into());
            match search {
                Some(query) => print_json(&search_rows(&rows, &query))?,
                None => print_json(&rows)?,
            }
        }
        Command::Info { input, id, mode } => {
            let doc = load(&input)?;
            let rows = flatten(Some(&doc), mode.into());
            let row = rows
                .iter()
                .find(|r| r.id == id)
                .with_context(|| format!("No row with id {id}"))?;
            print_json(&extract_position_info(row, &rows))?;
        }
        Command::NextNr { nr } => println!("{}", generate_next_nr(&nr)),
        Command::Merge { input, items, target, lg, ulg, grundtext, output } => {
            let doc = load(&input)?;
            let content = std::fs::read_to_string(&items).with_context(|| format!("Failed to read {}", items.display()))?;
            let items: Vec<Value> = match serde_json::from_str(&content)? {
                Value::Array(list) => list,
                single => vec![single],
            };
            let target = merge_target(target, lg, ulg, grundtext)?;
            let merged = merge_into_document(&doc, &target, &items)?;
            save(&merged, &output, &config)?;
        }
        Command::Insert { input, path, leaf, output } => {
            let doc = load(&input)?;
            let leaf: Value = match leaf {
                Some(file) => serde_json::from_str(&std::fs::read_to_string(&file)?)?,
                None => serde_json::json!({}),
            };
            let updated = add_position_to_path(&doc, &path, leaf)?;
            save(&updated, &output, &config)?;
        }
        Command::Export { input, out_dir } => {
            let doc = load(&input)?;
            let path = export_document(&doc, &out_dir, &config.export)?;
            println!("{}", path.display());
        }
        Command::Filter { input, nrs, output } => {
            if let Some(bad) = nrs.iter().find(|nr| !validate_full_nr(nr)) {
                bail!("Invalid full number {bad}, expected LLGGTT or LLGGTTA");
            }
            let doc = load(&input)?;
            save(&filter_document(&doc, &nrs), &output, &config)?;
        }
        Command::Check { input, nr } => {
            init_nr_list(config.nrlist_path.as_deref())?;
            let doc = load(&input)?;
            print_json(&check_nr_existence(&doc, &nr))?;
        }
        Command::Skeleton { dateiname, lvcode, vorhaben, lvbezeichnung, auftraggeber, output } => {
            let doc = OnlvDocument::skeleton(SkeletonInfo {
                dateiname,
                lvcode,
                vorhaben,
                lvbezeichnung,
                auftraggeber,
            });
            save(&doc, &output, &config)?;
        }
        Command::Batch { input_dir, output_dir } => {
            let processor = DocumentProcessor::new(&config, FlattenMode::default());
            let report = processor.process_documents(&input_dir, &output_dir)?;
            print_json(&report)?;
            if !report.failed.is_empty() {
                bail!("{} file(s) failed", report.failed.len());
            }
        }
    }

    Ok(())
}
