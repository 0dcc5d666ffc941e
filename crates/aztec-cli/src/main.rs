use anyhow::{Context, Result, bail};
use aztec_config::Config;
use aztec_engine::{Editor, EditorConfig, HeadingLevel, HistoryConfig, NoopResolver, Span, StyleKind, parse, serialize};
use std::{
    env,
    path::{Path, PathBuf},
    process,
};

const USAGE: &str = "Usage:
  aztec-cli canonical <file>                     print normalized HTML
  aztec-cli format <file>                        print HTML with source formatting
  aztec-cli plain <file>                         print the visible text
  aztec-cli check <file>...                      verify parse/serialize round-trips
  aztec-cli styles <offset> <file>               list styles active at an offset
  aztec-cli toggle <style> <start> <end> <file>  toggle a style and print the result
  aztec-cli media <file>                         list images with their attributes
  aztec-cli init-config                          write the default config file";

#[derive(Debug, PartialEq)]
enum Command {
    Canonical(PathBuf),
    Format(PathBuf),
    Plain(PathBuf),
    Check(Vec<PathBuf>),
    Styles { offset: usize, file: PathBuf },
    Toggle { style: StyleKind, selection: Span, file: PathBuf },
    Media(PathBuf),
    InitConfig,
}

fn parse_args(args: &[String]) -> Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        bail!("no command given");
    };
    let command = match (name.as_str(), rest) {
        ("canonical", [file]) => Command::Canonical(file.into()),
        ("format", [file]) => Command::Format(file.into()),
        ("plain", [file]) => Command::Plain(file.into()),
        ("check", files) if !files.is_empty() => Command::Check(files.iter().map(PathBuf::from).collect()),
        ("styles", [offset, file]) => Command::Styles {
            offset: parse_offset(offset)?,
            file: file.into(),
        },
        ("toggle", [style, start, end, file]) => Command::Toggle {
            style: parse_style(style)?,
            selection: Span::new(parse_offset(start)?, parse_offset(end)?),
            file: file.into(),
        },
        ("media", [file]) => Command::Media(file.into()),
        ("init-config", []) => Command::InitConfig,
        _ => bail!("unrecognized arguments: {}", args.join(" ")),
    };
    Ok(command)
}

fn parse_offset(value: &str) -> Result<usize> {
    value
        .parse()
        .with_context(|| format!("invalid offset '{value}'"))
}

fn parse_style(name: &str) -> Result<StyleKind> {
    let style = match name {
        "paragraph" => StyleKind::Paragraph,
        "bold" => StyleKind::Bold,
        "italic" => StyleKind::Italic,
        "underline" => StyleKind::Underline,
        "strike" | "strikethrough" => StyleKind::Strikethrough,
        "code" => StyleKind::Code,
        "ul" => StyleKind::UnorderedList,
        "ol" => StyleKind::OrderedList,
        "quote" => StyleKind::Quote,
        "more" => StyleKind::More,
        "page" => StyleKind::Page,
        other => {
            let level = other
                .strip_prefix('h')
                .and_then(|digit| digit.parse().ok())
                .and_then(HeadingLevel::new);
            match level {
                Some(level) => StyleKind::Heading(level),
                None => bail!("unknown style '{other}'"),
            }
        }
    };
    Ok(style)
}

fn style_name(style: StyleKind) -> String {
    match style {
        StyleKind::Paragraph => "paragraph".to_string(),
        StyleKind::Heading(level) => format!("h{}", level.get()),
        StyleKind::Bold => "bold".to_string(),
        StyleKind::Italic => "italic".to_string(),
        StyleKind::Underline => "underline".to_string(),
        StyleKind::Strikethrough => "strike".to_string(),
        StyleKind::Code => "code".to_string(),
        StyleKind::Link => "link".to_string(),
        StyleKind::UnorderedList => "ul".to_string(),
        StyleKind::OrderedList => "ol".to_string(),
        StyleKind::Quote => "quote".to_string(),
        StyleKind::More => "more".to_string(),
        StyleKind::Page => "page".to_string(),
    }
}

fn editor_config(config: &Config) -> EditorConfig {
    EditorConfig {
        history: HistoryConfig {
            enabled: config.history.enabled,
            max_depth: config.history.size,
        },
        max_media_width: config.media.max_width,
    }
}

fn open(path: &Path, config: &Config) -> Result<Editor> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let mut editor = Editor::new(editor_config(config))?;
    editor.load_html(&source, &NoopResolver);
    log::debug!(
        "loaded {} ({} annotations)",
        path.display(),
        editor.document().annotations().len()
    );
    Ok(editor)
}

/// Returns true when the source survives parse -> serialize -> parse unchanged.
fn round_trips(source: &str) -> bool {
    let doc = parse(source).document;
    parse(&serialize(&doc, None)).document == doc
}

fn run(command: Command, config: &Config) -> Result<String> {
    let output = match command {
        Command::Canonical(file) => open(&file, config)?.to_html(false),
        Command::Format(file) => open(&file, config)?.to_formatted_html(),
        Command::Plain(file) => open(&file, config)?.to_plain_text(),
        Command::Check(files) => {
            let mut report = Vec::new();
            let mut failures = 0;
            for file in &files {
                let source = std::fs::read_to_string(file)
                    .with_context(|| format!("failed to read '{}'", file.display()))?;
                if round_trips(&source) {
                    report.push(format!("ok    {}", file.display()));
                } else {
                    failures += 1;
                    report.push(format!("FAIL  {}", file.display()));
                }
            }
            if failures > 0 {
                bail!("{}\n{failures} of {} files failed to round-trip", report.join("\n"), files.len());
            }
            report.join("\n")
        }
        Command::Styles { offset, file } => {
            let mut editor = open(&file, config)?;
            editor.set_selection(Span::new(offset, offset));
            editor
                .active_styles()
                .into_iter()
                .map(style_name)
                .collect::<Vec<_>>()
                .join(" ")
        }
        Command::Toggle { style, selection, file } => {
            let mut editor = open(&file, config)?;
            editor.set_selection(selection);
            if !editor.toggle_style(style) {
                log::warn!("toggling {} changed nothing", style_name(style));
            }
            editor.to_html(false)
        }
        Command::Media(file) => open(&file, config)?
            .find_media(|_| true)
            .iter()
            .map(|attributes| {
                attributes
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Command::InitConfig => {
            let path = Config::config_path();
            if path.exists() {
                bail!("config file already exists at {}", path.display());
            }
            config.save()?;
            format!("wrote {}", path.display())
        }
    };
    Ok(output)
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    let config = match Config::load_or_default() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            eprintln!("Fix or remove {}", Config::config_path().display());
            process::exit(1);
        }
    };

    let output = run(command, &config)?;
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
