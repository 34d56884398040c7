use std::ffi::OsString;
use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use printqc_types::Zone;

pub const DEFAULT_TOLERANCE: u32 = 50;
pub const DEFAULT_ACCURACY: u32 = 50;
pub const DEFAULT_STRICTNESS: u32 = 50;
pub const DEFAULT_MIN_AREA_RATIO: f32 = 0.002;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OcrBackend {
    /// Tesseract when it can be launched, otherwise no OCR
    Auto,
    Tesseract,
    Noop,
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub ocr_backend_from_cli: bool,
    pub pretty_from_cli: bool,
    pub tolerance_from_cli: bool,
    pub accuracy_from_cli: bool,
    pub spelling_strictness_from_cli: bool,
    pub min_area_ratio_from_cli: bool,
    pub merge_gap_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        let mut sources = Self {
            ocr_backend_from_cli: value_from_cli(matches, "ocr_backend"),
            pretty_from_cli: value_from_cli(matches, "pretty"),
            ..Self::default()
        };
        match matches.subcommand() {
            Some(("compare", sub)) => {
                sources.ocr_backend_from_cli |= value_from_cli(sub, "ocr_backend");
                sources.pretty_from_cli |= value_from_cli(sub, "pretty");
                sources.tolerance_from_cli = value_from_cli(sub, "tolerance");
                sources.accuracy_from_cli = value_from_cli(sub, "accuracy");
                sources.spelling_strictness_from_cli = value_from_cli(sub, "spelling_strictness");
            }
            Some(("elements", sub)) => {
                sources.ocr_backend_from_cli |= value_from_cli(sub, "ocr_backend");
                sources.pretty_from_cli |= value_from_cli(sub, "pretty");
                sources.min_area_ratio_from_cli = value_from_cli(sub, "min_area_ratio");
                sources.merge_gap_from_cli = value_from_cli(sub, "merge_gap");
            }
            Some((_, sub)) => {
                sources.ocr_backend_from_cli |= value_from_cli(sub, "ocr_backend");
                sources.pretty_from_cli |= value_from_cli(sub, "pretty");
            }
            None => {}
        }
        sources
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    match try_parse_cli_from(std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(err) => err.exit(),
    }
}

pub fn try_parse_cli_from<I, T>(args: I) -> Result<(CliArgs, CliSources), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = CliArgs::command().try_get_matches_from(args)?;
    let args = CliArgs::from_arg_matches(&matches)?;
    let sources = CliSources::from_matches(&matches);
    Ok((args, sources))
}

/// Parses `x,y,w,h` given as fractions of the image size.
fn parse_zone(value: &str) -> Result<Zone, String> {
    let parts: Vec<f32> = value
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|err| format!("zone '{value}': {err}"))?;
    let [x, y, w, h] = parts[..] else {
        return Err(format!("zone '{value}' must have four values x,y,w,h"));
    };
    if [x, y, w, h].iter().any(|v| !(0.0..=1.0).contains(v)) {
        return Err(format!("zone '{value}' values must be fractions within 0..=1"));
    }
    Ok(Zone::new(x, y, w, h))
}

#[derive(Debug, Parser)]
#[command(
    name = "printqc",
    about = "Compare printed samples against master artwork",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Override the configuration file path
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// OCR engine used for typography and spelling checks
    #[arg(
        long = "ocr-backend",
        id = "ocr_backend",
        value_enum,
        default_value_t = OcrBackend::Auto,
        global = true
    )]
    pub ocr_backend: OcrBackend,

    /// Path of the tesseract executable
    #[arg(long = "tesseract", id = "tesseract_binary", value_name = "PATH", global = true)]
    pub tesseract_binary: Option<PathBuf>,

    /// Directory holding <code>.txt word lists for spelling
    #[arg(long = "dictionary-dir", id = "dictionary_dir", value_name = "DIR", global = true)]
    pub dictionary_dir: Option<PathBuf>,

    /// Write reports into this directory instead of printing JSON
    #[arg(short = 'o', long = "output-dir", id = "output_dir", value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long = "pretty", id = "pretty", global = true)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare a sample against its master and report differences
    Compare(CompareArgs),
    /// Detect design elements, optionally diffing master and sample
    Elements(ElementsArgs),
    /// Report which optional engines are available
    Capabilities,
}

#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Master (reference) image
    pub master: PathBuf,

    /// Sample (printed) image
    pub sample: PathBuf,

    /// Difference tolerance, higher ignores weaker changes (0-100)
    #[arg(
        long = "tolerance",
        id = "tolerance",
        default_value_t = DEFAULT_TOLERANCE,
        value_parser = clap::value_parser!(u32).range(0..=100)
    )]
    pub tolerance: u32,

    /// Detection accuracy, higher finds finer changes (0-100)
    #[arg(
        long = "accuracy",
        id = "accuracy",
        default_value_t = DEFAULT_ACCURACY,
        value_parser = clap::value_parser!(u32).range(0..=100)
    )]
    pub accuracy: u32,

    /// Restrict the search to x,y,w,h fractions (repeatable)
    #[arg(long = "zone", value_name = "X,Y,W,H", value_parser = parse_zone)]
    pub zones: Vec<Zone>,

    /// Language codes such as es,en (at most three)
    #[arg(long = "languages", id = "languages", value_name = "CODES")]
    pub languages: Option<String>,

    /// Compare spelling between master and sample
    #[arg(long = "spelling")]
    pub spelling: bool,

    /// Spelling strictness; higher ignores less confident words (0-100)
    #[arg(
        long = "spelling-strictness",
        id = "spelling_strictness",
        default_value_t = DEFAULT_STRICTNESS,
        value_parser = clap::value_parser!(u32).range(0..=100)
    )]
    pub spelling_strictness: u32,

    /// Page number echoed in the report
    #[arg(long = "page", default_value_t = 1)]
    pub page: u32,

    /// Skip writing heatmap and annotated images
    #[arg(long = "no-images")]
    pub no_images: bool,
}

#[derive(Debug, Args)]
pub struct ElementsArgs {
    /// Image to inspect (the master when comparing)
    pub master: PathBuf,

    /// Second image; when given, element counts are compared
    pub sample: Option<PathBuf>,

    /// Minimum share of the image a region must cover
    #[arg(long = "min-area-ratio", id = "min_area_ratio", default_value_t = DEFAULT_MIN_AREA_RATIO)]
    pub min_area_ratio: f32,

    /// Pixel gap under which element regions merge
    #[arg(long = "merge-gap", id = "merge_gap", default_value_t = printqc_comparator::ELEMENT_MERGE_GAP)]
    pub merge_gap: usize,
}
