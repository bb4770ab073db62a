//! Command-line driver for the Galluz compiler.

use anyhow::Result;
use clap::Parser;

use galluzc::CompileOptions;

#[derive(Parser)]
#[command(
    name = "galluzc",
    about = "AOT compiler front-end for the Galluz language",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    /// Source file to compile (`.glz`)
    input: String,

    /// Output base name; the compiler writes `<base>.ll`
    #[arg(short, long)]
    output: Option<String>,

    /// Print the textual IR to stdout instead of writing a file
    #[arg(long)]
    emit_ir: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut options = CompileOptions::new(cli.input);
    options.out_base = cli.output;
    options.emit_ir = cli.emit_ir;

    galluzc::compile(options)?;
    Ok(())
}
