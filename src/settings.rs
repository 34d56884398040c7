use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use printqc_comparator::ExtractionSettings;
use printqc_elements::DetectorSettings;
use printqc_ocr::LanguageSelection;
use printqc_spelling::SpellingSettings;
use serde::Deserialize;

use crate::cli::{
    CliArgs, CliSources, Command, DEFAULT_ACCURACY, DEFAULT_MIN_AREA_RATIO, DEFAULT_STRICTNESS,
    DEFAULT_TOLERANCE, OcrBackend,
};

const PROJECT_CONFIG_FILE: &str = "printqc.toml";
const DEFAULT_LANGUAGES: &str = "es";
const DEFAULT_TESSERACT: &str = "tesseract";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    tolerance: Option<u32>,
    accuracy: Option<u32>,
    languages: Option<String>,
    ocr_backend: Option<String>,
    tesseract: Option<String>,
    output_dir: Option<String>,
    pretty: Option<bool>,
    spelling: Option<SpellingFileConfig>,
    elements: Option<ElementsFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct SpellingFileConfig {
    strictness: Option<u32>,
    dictionary_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct ElementsFileConfig {
    min_area_ratio: Option<f32>,
    merge_gap: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EffectiveSettings {
    pub extraction: ExtractionSettings,
    pub languages: LanguageSelection,
    pub spelling: SpellingSettings,
    pub detector: DetectorSettings,
    pub ocr_backend: OcrBackend,
    pub tesseract_binary: PathBuf,
    pub dictionary_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub pretty: bool,
    pub config_path: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "cannot parse config {}: {source}", path.display())
            }
            ConfigError::InvalidValue {
                path: Some(path),
                field,
                value,
            } => write!(f, "invalid {field} '{value}' in {}", path.display()),
            ConfigError::InvalidValue {
                path: None,
                field,
                value,
            } => write!(f, "invalid {field} '{value}'"),
            ConfigError::NotFound { path } => {
                write!(f, "config file {} not found", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn read_config(path: PathBuf) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    Ok((config, Some(path)))
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        let path = path.to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound { path });
        }
        return read_config(path);
    }

    if let Some(project_path) = project_config_path() {
        if project_path.exists() {
            return read_config(project_path);
        }
    }

    match default_config_path() {
        Some(default_path) if default_path.exists() => read_config(default_path),
        _ => Ok((FileConfig::default(), None)),
    }
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        tolerance: file_tolerance,
        accuracy: file_accuracy,
        languages: file_languages,
        ocr_backend: file_ocr_backend,
        tesseract: file_tesseract,
        output_dir: file_output_dir,
        pretty: file_pretty,
        spelling: file_spelling,
        elements: file_elements,
    } = file;
    let file_spelling = file_spelling.unwrap_or_default();
    let file_elements = file_elements.unwrap_or_default();

    let compare = match &cli.command {
        Command::Compare(args) => Some(args),
        _ => None,
    };
    let elements = match &cli.command {
        Command::Elements(args) => Some(args),
        _ => None,
    };

    let mut tolerance = compare.map_or(DEFAULT_TOLERANCE, |args| args.tolerance);
    if !sources.tolerance_from_cli {
        if let Some(value) = file_tolerance {
            tolerance = check_percent(value, "tolerance", config_path.as_ref())?;
        }
    }

    let mut accuracy = compare.map_or(DEFAULT_ACCURACY, |args| args.accuracy);
    if !sources.accuracy_from_cli {
        if let Some(value) = file_accuracy {
            accuracy = check_percent(value, "accuracy", config_path.as_ref())?;
        }
    }

    let extraction =
        ExtractionSettings::new(tolerance, accuracy).map_err(|_| ConfigError::InvalidValue {
            path: None,
            field: "tolerance",
            value: format!("{tolerance}/{accuracy}"),
        })?;

    let mut strictness = compare.map_or(DEFAULT_STRICTNESS, |args| args.spelling_strictness);
    if !sources.spelling_strictness_from_cli {
        if let Some(value) = file_spelling.strictness {
            strictness = check_percent(value, "spelling.strictness", config_path.as_ref())?;
        }
    }
    let spelling = SpellingSettings::new(strictness).map_err(|_| ConfigError::InvalidValue {
        path: None,
        field: "spelling.strictness",
        value: strictness.to_string(),
    })?;

    let (languages_value, languages_path) =
        match normalize_string(compare.and_then(|args| args.languages.clone())) {
            Some(value) => (value, None),
            None => match normalize_string(file_languages) {
                Some(value) => (value, config_path.clone()),
                None => (DEFAULT_LANGUAGES.to_string(), None),
            },
        };
    let languages = LanguageSelection::parse(&languages_value);
    if languages.is_empty() {
        return Err(ConfigError::InvalidValue {
            path: languages_path,
            field: "languages",
            value: languages_value,
        });
    }

    let mut ocr_backend = cli.ocr_backend;
    if !sources.ocr_backend_from_cli {
        if let Some(value) = normalize_string(file_ocr_backend) {
            ocr_backend = parse_ocr_backend(&value, config_path.as_ref())?;
        }
    }

    let tesseract_binary = match cli.tesseract_binary.clone() {
        Some(path) => expand_pathbuf(path),
        None => normalize_string(file_tesseract)
            .map(|value| {
                // Bare program names are looked up on PATH, not next to the config.
                if value.contains(['/', '\\']) || value.starts_with('~') {
                    resolve_path_from_config(value.clone(), config_dir.as_deref())
                        .unwrap_or_else(|| PathBuf::from(value))
                } else {
                    PathBuf::from(value)
                }
            })
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TESSERACT)),
    };

    let dictionary_dir = match cli.dictionary_dir.clone() {
        Some(path) => Some(expand_pathbuf(path)),
        None => normalize_string(file_spelling.dictionary_dir)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref())),
    };

    let output_dir = match cli.output_dir.clone() {
        Some(path) => Some(expand_pathbuf(path)),
        None => normalize_string(file_output_dir)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref())),
    };

    let mut pretty = cli.pretty;
    if !sources.pretty_from_cli {
        if let Some(value) = file_pretty {
            pretty = value;
        }
    }

    let mut min_area_ratio = elements.map_or(DEFAULT_MIN_AREA_RATIO, |args| args.min_area_ratio);
    let mut min_area_path = None;
    if !sources.min_area_ratio_from_cli {
        if let Some(value) = file_elements.min_area_ratio {
            min_area_ratio = value;
            min_area_path = config_path.clone();
        }
    }
    if !min_area_ratio.is_finite() || !(0.0..1.0).contains(&min_area_ratio) {
        return Err(ConfigError::InvalidValue {
            path: min_area_path,
            field: "elements.min_area_ratio",
            value: min_area_ratio.to_string(),
        });
    }

    let mut merge_gap = elements.map_or(DetectorSettings::default().merge_gap, |args| args.merge_gap);
    if !sources.merge_gap_from_cli {
        if let Some(value) = file_elements.merge_gap {
            merge_gap = value;
        }
    }

    Ok(EffectiveSettings {
        extraction,
        languages,
        spelling,
        detector: DetectorSettings {
            min_area_ratio,
            merge_gap,
        },
        ocr_backend,
        tesseract_binary,
        dictionary_dir,
        output_dir,
        pretty,
        config_path,
    })
}

fn check_percent(
    value: u32,
    field: &'static str,
    path: Option<&PathBuf>,
) -> Result<u32, ConfigError> {
    if value > 100 {
        return Err(ConfigError::InvalidValue {
            path: path.cloned(),
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "printqc", "printqc").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir()
        .ok()
        .map(|dir| dir.join(PROJECT_CONFIG_FILE))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

fn parse_ocr_backend(value: &str, path: Option<&PathBuf>) -> Result<OcrBackend, ConfigError> {
    OcrBackend::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field: "ocr_backend",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::try_parse_cli_from;

    fn settings_with(args: &[&str], config: &str) -> Result<EffectiveSettings, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("printqc.toml");
        fs::write(&path, config).unwrap();
        let mut argv = vec!["printqc", "--config", path.to_str().unwrap()];
        argv.extend_from_slice(args);
        let (cli, sources) = try_parse_cli_from(argv).unwrap();
        resolve_settings(&cli, &sources)
    }

    #[test]
    fn file_values_apply_when_cli_is_silent() {
        let settings = settings_with(
            &["compare", "m.png", "s.png"],
            r#"
tolerance = 80
languages = "en,fr"
ocr_backend = "noop"
pretty = true

[spelling]
strictness = 90
dictionary_dir = "dicts"
"#,
        )
        .unwrap();
        assert_eq!(settings.extraction.tolerance, 80);
        assert_eq!(settings.extraction.accuracy, DEFAULT_ACCURACY as u8);
        assert_eq!(settings.languages.codes(), ["en", "fr"]);
        assert_eq!(settings.ocr_backend, OcrBackend::Noop);
        assert_eq!(settings.spelling.strictness, 90);
        assert!(settings.pretty);
        let config_dir = settings.config_path.as_ref().unwrap().parent().unwrap();
        assert_eq!(settings.dictionary_dir, Some(config_dir.join("dicts")));
        assert_eq!(settings.tesseract_binary, PathBuf::from(DEFAULT_TESSERACT));
    }

    #[test]
    fn explicit_cli_values_win() {
        let settings = settings_with(
            &["compare", "m.png", "s.png", "--tolerance", "10", "--ocr-backend", "auto"],
            "tolerance = 80\nocr_backend = \"noop\"\n",
        )
        .unwrap();
        assert_eq!(settings.extraction.tolerance, 10);
        assert_eq!(settings.ocr_backend, OcrBackend::Auto);
    }

    #[test]
    fn invalid_file_values_name_the_field() {
        let err = settings_with(&["compare", "m.png", "s.png"], "accuracy = 150\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { path, field, value } => {
                assert_eq!(field, "accuracy");
                assert_eq!(value, "150");
                assert!(path.is_some());
            }
            other => panic!("unexpected error {other}"),
        }

        let err = settings_with(&["capabilities"], "ocr_backend = \"vision\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "ocr_backend", .. }));

        let err = settings_with(&["elements", "m.png"], "[elements]\nmin_area_ratio = 1.5\n")
            .unwrap_err();
        assert!(err.to_string().contains("elements.min_area_ratio"));
    }

    #[test]
    fn unsupported_languages_are_rejected() {
        let err = settings_with(&["compare", "m.png", "s.png", "--languages", "xx"], "").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "languages", path: None, .. }));
    }

    #[test]
    fn element_settings_merge() {
        let settings = settings_with(
            &["elements", "m.png", "--merge-gap", "5"],
            "[elements]\nmin_area_ratio = 0.01\nmerge_gap = 40\n",
        )
        .unwrap();
        assert_eq!(settings.detector.min_area_ratio, 0.01);
        assert_eq!(settings.detector.merge_gap, 5);
    }

    #[test]
    fn missing_override_is_not_found() {
        let (cli, sources) =
            try_parse_cli_from(["printqc", "--config", "/nonexistent/printqc.toml", "capabilities"])
                .unwrap();
        let err = resolve_settings(&cli, &sources).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = settings_with(&["capabilities"], "tolerance = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
