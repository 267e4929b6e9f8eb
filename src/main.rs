use std::fs;
use std::io::{self, Read};

use anyhow::{Context as _, Result, bail};
use minipy::{Closure, Lexer, StringContext, parse_program};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let source = match args.next() {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            buffer
        }
    };
    if args.next().is_some() {
        bail!("Only one input file is supported");
    }

    let lexer = Lexer::new(&source)?;
    let program = parse_program(lexer)?;

    let mut globals = Closure::new();
    let mut context = StringContext::new();
    program.execute(&mut globals, &mut context)?;

    let output = context.into_output();
    if !output.is_empty() {
        print!("{output}");
    }
    Ok(())
}
