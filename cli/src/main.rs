use std::path::{Path, PathBuf};
use std::process;

use anyhow::{ensure, Context, Result};
use structopt::clap::ErrorKind;
use structopt::StructOpt;
use tfl2onnx_core::ConvertOptions;

const EXIT_CONVERSION: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    let cli_args = match CliArgs::from_iter_safe(std::env::args_os()) {
        Ok(args) => args,
        Err(e) if matches!(e.kind, ErrorKind::HelpDisplayed | ErrorKind::VersionDisplayed) => {
            e.exit()
        }
        Err(e) => {
            eprintln!("{}", e.message);
            process::exit(EXIT_USAGE)
        }
    };

    if std::env::var("RUST_LOG").is_err() {
        let level = match cli_args.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }
    env_logger::Builder::from_env(env_logger::Env::default()).init();

    if let Err(e) = cli_args.validate() {
        log::error!("{e:?}");
        process::exit(EXIT_USAGE)
    }

    println!(
        "tfl2onnx {}: converting {:?} to {:?}{}",
        env!("CARGO_PKG_VERSION"),
        cli_args.input,
        cli_args.output,
        if cli_args.release_mode { " (release mode)" } else { "" }
    );
    match cli_args.run() {
        Ok(()) => println!("Conversion succeeded, wrote {:?}", cli_args.output),
        Err(e) => {
            log::error!("{e:?}");
            eprintln!("Conversion failed");
            process::exit(EXIT_CONVERSION)
        }
    }
}

/// Convert a TFLite model to ONNX.
#[derive(Debug, StructOpt)]
#[structopt(name = "tfl2onnx", about = "Convert a TFLite model into an ONNX model")]
pub struct CliArgs {
    #[structopt(short = "v", parse(from_occurrences))]
    pub verbosity: usize,

    /// Source model, a .tflite file
    #[structopt(parse(from_os_str))]
    pub input: PathBuf,

    /// Destination, a .onnx file
    #[structopt(parse(from_os_str))]
    pub output: PathBuf,

    /// Do not wrap graph inputs and outputs in layout transposes
    #[structopt(long = "release-mode")]
    pub release_mode: bool,

    /// Split fused ReLU and ReLU6 activations into standalone nodes
    #[structopt(long = "defuse")]
    pub defuse: bool,
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().map(|e| e == ext).unwrap_or(false)
}

impl CliArgs {
    pub fn options(&self) -> ConvertOptions {
        ConvertOptions { boundary_transpose: !self.release_mode, defuse: self.defuse }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(has_extension(&self.input, "tflite"), "Input {:?} is not a .tflite file", self.input);
        ensure!(self.input.is_file(), "Input {:?} does not exist", self.input);
        ensure!(has_extension(&self.output, "onnx"), "Output {:?} is not a .onnx file", self.output);
        Ok(())
    }

    pub fn run(&self) -> Result<()> {
        let source = tfl2onnx_tflite::for_path(&self.input)?;
        let model = tfl2onnx_core::convert(&source, &self.options())
            .with_context(|| format!("Converting {:?}", self.input))?;
        tfl2onnx_onnx::save(&model, &self.output)
    }
}
