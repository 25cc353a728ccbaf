mod drawing;
mod fill;
mod package;
mod xml;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser};
use docx_json_replacer::ReplaceOptions;
use log::{info, LevelFilter};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::fill::{fill_package, Options};
use crate::package::DocxPackage;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Template .docx containing {{placeholders}} and [dx-img:key] markers.
    template: PathBuf,

    /// JSON file with the replacement values (root must be an object).
    data: PathBuf,

    /// Output .docx path (defaults to <template>_replaced.docx).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Insert string values verbatim instead of interpreting HTML.
    #[arg(long)]
    no_html: bool,

    /// Fail on invalid image values instead of dropping them.
    #[arg(long)]
    strict_images: bool,

    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn default_output(template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    template.with_file_name(format!("{stem}_replaced.docx"))
}

fn read_data(path: &Path) -> Result<Value> {
    let mut json = String::new();
    File::open(path)
        .with_context(|| format!("open {}", path.display()))?
        .read_to_string(&mut json)
        .context("read json data")?;
    let data: Value =
        serde_json::from_str(&json).with_context(|| format!("parse {}", path.display()))?;
    if !data.is_object() {
        return Err(anyhow!("{}: root must be a JSON object", path.display()));
    }
    Ok(data)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let data = read_data(&args.data)?;
    let mut package = DocxPackage::open(&args.template)?;
    let options = Options {
        replace: ReplaceOptions {
            html: !args.no_html,
        },
        strict_images: args.strict_images,
    };
    let stats = fill_package(&mut package, &data, &options).context("fill template")?;

    let out = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.template));
    package.save(&out)?;

    info!(
        "wrote {}: {} placeholders replaced, {} unresolved, {} images",
        out.display(),
        stats.replaced,
        stats.unresolved,
        stats.images
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parses_flags_and_positionals() {
        Args::command().debug_assert();
        let args = Args::try_parse_from(["x", "t.docx", "d.json", "-vv", "--no-html"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(args.no_html);
        assert!(!args.strict_images);
        assert!(args.output.is_none());
    }

    #[test]
    fn default_output_sits_next_to_template() {
        assert_eq!(
            default_output(Path::new("dir/report.docx")),
            PathBuf::from("dir/report_replaced.docx")
        );
    }
}
